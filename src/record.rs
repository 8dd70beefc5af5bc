use crate::mod_id::ModId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 已加载模块的身份
///
/// 用于在不依赖字符串 ID 的情况下区分不同的 mod。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRef(Uuid);

impl ModuleRef {
    /// 为新加载的模块分配身份
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ModuleRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module:{}", self.0)
    }
}

/// 调用方凭证
///
/// mod 进入 Loaded 时由注册表签发，之后所有发送、广播、
/// 查询自身等操作都以它作为调用方身份。凭证不会出现在 [`ModRecord`] 中。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModHandle(Uuid);

impl ModHandle {
    pub(crate) fn issue() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Debug for ModHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModHandle(..)")
    }
}

/// mod 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// 已发现
    Found,
    /// 已完成依赖排序
    Sorted,
    /// 模块已加载，接收器已安装
    Loaded,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Found => "Found",
            Self::Sorted => "Sorted",
            Self::Loaded => "Loaded",
        };
        f.write_str(name)
    }
}

/// mod 记录快照
///
/// 注册表查询返回的都是快照，持有它不会阻塞注册表的后续变更。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: ModId,
    pub display_name: String,
    pub version: String,
    /// 仅在 Loaded 之后存在
    pub module: Option<ModuleRef>,
    pub state: LifecycleState,
    pub errored: bool,
    /// 在发现顺序中的位置
    pub discovery_index: usize,
}

impl ModRecord {
    pub fn is_loaded(&self) -> bool {
        self.state == LifecycleState::Loaded
    }
}

impl fmt::Display for ModRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} [{}", self.id, self.version, self.state)?;
        if self.errored {
            f.write_str(", errored")?;
        }
        f.write_str("]")
    }
}
