use crate::context::{ModContext, WeakModContext};
use crate::loader::{GameMod, ModManifest};
use crate::receiver::ReceiverBuilder;
use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

/// 回声 mod - 把 pinger 发来的 ping 原样回复为 pong
pub struct EchoMod {
    manifest: ModManifest,
    ctx: Arc<OnceCell<WeakModContext>>,
}

impl EchoMod {
    pub fn new() -> Self {
        Self {
            manifest: ModManifest::new("Echo", "Echo", "1.0.0").description("回复 ping 消息"),
            ctx: Arc::new(OnceCell::new()),
        }
    }
}

impl Default for EchoMod {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMod for EchoMod {
    fn manifest(&self) -> &ModManifest {
        &self.manifest
    }

    fn register_receivers(&self, receivers: &mut ReceiverBuilder<'_>) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        receivers.receive_from("pinger", "on_ping", move |caller, message, payload| {
            if message != "ping" {
                return Ok(());
            }
            let ctx = ctx
                .get()
                .and_then(WeakModContext::upgrade)
                .ok_or_else(|| anyhow::anyhow!("echo is not loaded"))?;
            info!("[echo] 回复 {} 的 ping", caller.id);
            ctx.send(caller, "pong", payload.to_vec()).into_result()?;
            Ok(())
        })?;
        Ok(())
    }

    fn on_loaded(&mut self, ctx: &ModContext) -> Result<()> {
        self.ctx
            .set(ctx.downgrade())
            .map_err(|_| anyhow::anyhow!("echo context already set"))
    }
}
