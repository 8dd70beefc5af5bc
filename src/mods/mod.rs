pub mod echo;
pub mod heartbeat;
pub mod pinger;

use crate::loader::GameMod;
use echo::EchoMod;
use heartbeat::HeartbeatMod;
use pinger::PingerMod;

/// 获取所有内置 mod 实例
///
/// 顺序即发现顺序；加载顺序由依赖关系决定
pub fn builtin_mods() -> Vec<Box<dyn GameMod>> {
    vec![
        Box::new(PingerMod::new()),
        Box::new(EchoMod::new()),
        Box::new(HeartbeatMod::new()),
    ]
}
