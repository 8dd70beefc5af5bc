//! 接收器目录
//!
//! 每个 mod 在进入 Loaded 时通过 [`ReceiverBuilder`] 显式声明自己的消息入口：
//! 指定只接收某个 mod 的消息（定向入口），或接收任意 mod 的广播（全局入口）。
//! 构建完成后目录只读，由分发器按发送方查找。

use crate::error::DeclarationError;
use crate::mod_id::ModId;
use crate::record::ModRecord;
use crate::registry::{ModQuery, ModRegistry};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// 消息处理函数：`(调用方记录, 消息名, 负载)`
pub type Handler = Arc<dyn Fn(&ModRecord, &str, &[Value]) -> anyhow::Result<()> + Send + Sync>;

/// 接收器按发送方分组的键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SenderKey {
    /// 只接收指定 mod 的定向消息
    Mod(ModId),
    /// 接收任意发送方的广播
    AnySender,
}

impl fmt::Display for SenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mod(id) => write!(f, "{}", id),
            Self::AnySender => f.write_str("*"),
        }
    }
}

/// 一个已注册的消息入口
#[derive(Clone)]
pub struct Receiver {
    entry_point: String,
    handler: Handler,
}

impl Receiver {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub(crate) fn invoke(&self, caller: &ModRecord, message: &str, payload: &[Value]) -> anyhow::Result<()> {
        (self.handler)(caller, message, payload)
    }
}

impl fmt::Debug for Receiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

/// 某个 mod 的接收器目录（只读）
#[derive(Debug, Default, Clone)]
pub struct ReceiverDirectory {
    entries: HashMap<SenderKey, Vec<Receiver>>,
}

impl ReceiverDirectory {
    /// 获取某个发送方键下的接收器，按注册顺序排列
    pub fn receivers_for(&self, key: &SenderKey) -> &[Receiver] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 全局入口
    pub fn global_receivers(&self) -> &[Receiver] {
        self.receivers_for(&SenderKey::AnySender)
    }

    /// 所有出现过的发送方键
    pub fn sender_keys(&self) -> impl Iterator<Item = &SenderKey> {
        self.entries.keys()
    }

    /// 入口总数
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 接收器目录构建器
///
/// 交给正在加载的 mod，用于声明消息入口。每个入口名只能声明一次。
pub struct ReceiverBuilder<'a> {
    registry: &'a ModRegistry,
    owner: ModId,
    seen: HashSet<String>,
    directory: ReceiverDirectory,
}

impl<'a> ReceiverBuilder<'a> {
    pub fn new(registry: &'a ModRegistry, owner: ModId) -> Self {
        Self {
            registry,
            owner,
            seen: HashSet::new(),
            directory: ReceiverDirectory::default(),
        }
    }

    /// 正在声明入口的 mod
    pub fn owner(&self) -> &ModId {
        &self.owner
    }

    /// 声明只接收 `sender` 消息的入口
    ///
    /// `sender` 可以是 mod 记录、模块身份或字符串 ID。后两者通过注册表解析
    /// （包括未加载和出错的 mod），解析失败时立即返回错误。
    pub fn receive_from<'q, F>(
        &mut self,
        sender: impl Into<ModQuery<'q>>,
        entry_point: &str,
        handler: F,
    ) -> Result<&mut Self, DeclarationError>
    where
        F: Fn(&ModRecord, &str, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.check_entry_point(entry_point)?;
        let sender_id = self.resolve_sender(sender.into(), entry_point)?;
        self.push(SenderKey::Mod(sender_id), entry_point, Arc::new(handler));
        Ok(self)
    }

    /// 声明接收任意发送方广播的入口
    pub fn receive_global<F>(&mut self, entry_point: &str, handler: F) -> Result<&mut Self, DeclarationError>
    where
        F: Fn(&ModRecord, &str, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.check_entry_point(entry_point)?;
        self.push(SenderKey::AnySender, entry_point, Arc::new(handler));
        Ok(self)
    }

    /// 完成构建
    pub fn build(self) -> ReceiverDirectory {
        self.directory
    }

    fn check_entry_point(&self, entry_point: &str) -> Result<(), DeclarationError> {
        if entry_point.is_empty() {
            return Err(DeclarationError::EmptyEntryPoint);
        }
        if self.seen.contains(entry_point) {
            return Err(DeclarationError::DuplicateEntryPoint(entry_point.to_string()));
        }
        Ok(())
    }

    fn resolve_sender(&self, sender: ModQuery<'_>, entry_point: &str) -> Result<ModId, DeclarationError> {
        if let ModQuery::Record(record) = sender {
            return Ok(record.id.clone());
        }
        if let ModQuery::Id(raw) = sender {
            if raw.is_empty() {
                return Err(DeclarationError::EmptySenderId {
                    entry_point: entry_point.to_string(),
                });
            }
        }

        let described = sender.to_string();
        self.registry
            .get_mod(sender, true, true)
            .map(|record| record.id)
            .ok_or(DeclarationError::UnresolvedSender {
                entry_point: entry_point.to_string(),
                sender: described,
            })
    }

    fn push(&mut self, key: SenderKey, entry_point: &str, handler: Handler) {
        tracing::debug!("[{}] 声明消息入口 {} (发送方: {})", self.owner, entry_point, key);
        self.seen.insert(entry_point.to_string());
        self.directory
            .entries
            .entry(key)
            .or_default()
            .push(Receiver {
                entry_point: entry_point.to_string(),
                handler,
            });
    }
}
