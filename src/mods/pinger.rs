use crate::context::ModContext;
use crate::loader::{GameMod, ModManifest};
use crate::receiver::ReceiverBuilder;
use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Pinger mod - 加载完成后向 echo 发送 ping 并记录回复
pub struct PingerMod {
    manifest: ModManifest,
    pongs: Arc<Mutex<Vec<Value>>>,
}

impl PingerMod {
    pub fn new() -> Self {
        Self {
            manifest: ModManifest::new("Pinger", "Pinger", "1.0.0")
                .description("向 echo 发送 ping")
                .depends_on("Echo"),
            pongs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for PingerMod {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMod for PingerMod {
    fn manifest(&self) -> &ModManifest {
        &self.manifest
    }

    fn register_receivers(&self, receivers: &mut ReceiverBuilder<'_>) -> Result<()> {
        let pongs = Arc::clone(&self.pongs);
        receivers.receive_from("echo", "on_pong", move |caller, message, payload| {
            let mut pongs = pongs.lock();
            pongs.extend(payload.iter().cloned());
            info!("[pinger] 收到 {} 的 {}: {:?} (累计 {} 项)", caller.id, message, payload, pongs.len());
            Ok(())
        })?;
        Ok(())
    }

    fn on_loaded(&mut self, ctx: &ModContext) -> Result<()> {
        let report = ctx.send("echo", "ping", vec![json!(1)]);
        report.into_result()?;
        Ok(())
    }
}
