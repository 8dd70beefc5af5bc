// modlink - mod 间消息通信层

pub mod api;
pub mod app;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod mod_id;
pub mod mods;
pub mod receiver;
pub mod record;
pub mod registry;

// 重新导出常用类型
pub use app::App;
pub use config::ModdingConfig;
pub use context::{ModContext, WeakModContext};
pub use dispatch::{DispatchReport, HandlerFailure, MessageDispatcher, Payload};
pub use error::{DeclarationError, LifecycleError};
pub use loader::{GameMod, LoadSummary, ModLoader, ModManifest};
pub use mod_id::{IdNormalizer, ModId};
pub use receiver::{ReceiverBuilder, ReceiverDirectory, SenderKey};
pub use record::{LifecycleState, ModHandle, ModRecord, ModuleRef};
pub use registry::{ModQuery, ModRegistry};
