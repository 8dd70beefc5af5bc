use thiserror::Error;

/// 注册表生命周期操作错误（由加载器触发）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("mod id is empty after normalization: {0:?}")]
    EmptyId(String),

    #[error("duplicate mod id: {0}")]
    DuplicateId(String),

    #[error("unknown mod: {0}")]
    UnknownMod(String),

    #[error("mod {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("mod {0} is errored and cannot advance")]
    Errored(String),
}

/// 接收器声明错误
///
/// 任何一个声明错误都会使整个接收器目录的构建失败，
/// 加载器随后应把该 mod 标记为 Errored。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("sender id for entry point `{entry_point}` is empty")]
    EmptySenderId { entry_point: String },

    #[error("entry point `{entry_point}` accepts unknown sender {sender}")]
    UnresolvedSender { entry_point: String, sender: String },

    #[error("entry point `{0}` is declared more than once")]
    DuplicateEntryPoint(String),

    #[error("entry point name is empty")]
    EmptyEntryPoint,
}
