use crate::context::ModContext;
use crate::loader::{GameMod, ModManifest};
use crate::receiver::ReceiverBuilder;
use anyhow::Result;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// 心跳 mod - 监听所有广播并在加载完成时宣布上线
pub struct HeartbeatMod {
    manifest: ModManifest,
    seen: Arc<AtomicUsize>,
}

impl HeartbeatMod {
    pub fn new() -> Self {
        Self {
            manifest: ModManifest::new("Heartbeat", "Heartbeat", "1.0.0")
                .description("记录所有广播消息")
                .author("modlink"),
            seen: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for HeartbeatMod {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMod for HeartbeatMod {
    fn manifest(&self) -> &ModManifest {
        &self.manifest
    }

    fn register_receivers(&self, receivers: &mut ReceiverBuilder<'_>) -> Result<()> {
        let seen = Arc::clone(&self.seen);
        receivers.receive_global("on_broadcast", move |caller, message, payload| {
            let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
            info!("[heartbeat] #{} {} 来自 {} ({} 项)", count, message, caller.id, payload.len());
            Ok(())
        })?;
        Ok(())
    }

    fn on_loaded(&mut self, ctx: &ModContext) -> Result<()> {
        let report = ctx.broadcast("heartbeat.online", vec![json!(self.manifest.version)]);
        info!("[heartbeat] 上线广播送达 {} 个入口", report.delivered);
        Ok(())
    }
}
