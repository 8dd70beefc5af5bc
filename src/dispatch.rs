//! 消息分发器
//!
//! 在调用线程中同步投递消息：定向发送只调用目标 mod 为调用方声明的入口，
//! 广播调用所有已加载 mod 的全局入口。每个入口单独隔离，
//! 某个入口返回错误或 panic 不会影响同一次分发中的其他入口。

use crate::config::ModdingConfig;
use crate::mod_id::ModId;
use crate::receiver::{Receiver, SenderKey};
use crate::record::{ModHandle, ModRecord};
use crate::registry::{ModQuery, ModRegistry};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// 消息负载
///
/// 内容对分发器不透明，由接收方自行解释。缺省负载统一为空列表。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Vec<Value>);

impl Payload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for Payload {
    fn from(items: Vec<Value>) -> Self {
        Self(items)
    }
}

impl From<Option<Vec<Value>>> for Payload {
    fn from(items: Option<Vec<Value>>) -> Self {
        Self(items.unwrap_or_default())
    }
}

impl<const N: usize> From<[Value; N]> for Payload {
    fn from(items: [Value; N]) -> Self {
        Self(items.into())
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Self::empty()
    }
}

/// 单个入口的处理失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// 入口所属的 mod
    pub receiver: ModId,
    pub entry_point: String,
    pub reason: String,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{} failed: {}", self.receiver, self.entry_point, self.reason)
    }
}

/// 一次分发的结果
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// 被调用的入口数量（包括失败的）
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchReport {
    /// 没有任何入口失败
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// 把收集到的失败合并为一个错误
    pub fn into_result(self) -> anyhow::Result<usize> {
        if self.failures.is_empty() {
            return Ok(self.delivered);
        }
        let details: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        anyhow::bail!(
            "{} of {} receivers failed: {}",
            self.failures.len(),
            self.delivered,
            details.join("; ")
        )
    }
}

#[derive(Clone)]
pub(crate) struct WeakDispatcher {
    registry: Weak<ModRegistry>,
    trace_deliveries: bool,
}

impl WeakDispatcher {
    pub(crate) fn upgrade(&self) -> Option<MessageDispatcher> {
        Some(MessageDispatcher {
            registry: self.registry.upgrade()?,
            trace_deliveries: self.trace_deliveries,
        })
    }
}

/// 消息分发器
#[derive(Clone)]
pub struct MessageDispatcher {
    registry: Arc<ModRegistry>,
    trace_deliveries: bool,
}

impl MessageDispatcher {
    pub fn new(registry: Arc<ModRegistry>) -> Self {
        Self {
            registry,
            trace_deliveries: false,
        }
    }

    pub fn from_config(registry: Arc<ModRegistry>, config: &ModdingConfig) -> Self {
        Self {
            registry,
            trace_deliveries: config.log_dispatch,
        }
    }

    /// 分发器使用的注册表
    pub fn registry(&self) -> &Arc<ModRegistry> {
        &self.registry
    }

    /// 不持有注册表的弱引用版本
    pub(crate) fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            registry: Arc::downgrade(&self.registry),
            trace_deliveries: self.trace_deliveries,
        }
    }

    /// 定向发送
    ///
    /// 目标可以是记录、模块身份或字符串 ID（包括未加载和出错的 mod）。
    /// 目标或调用方无法解析、或目标没有为调用方声明入口时静默返回空结果。
    pub fn send<'q>(
        &self,
        caller: &ModHandle,
        target: impl Into<ModQuery<'q>>,
        message: &str,
        payload: impl Into<Payload>,
    ) -> DispatchReport {
        let target = target.into();
        let Some((target_record, directory)) = self.registry.resolve_target(target) else {
            debug!("[分发器] 目标 {} 不存在，丢弃消息 {}", target, message);
            return DispatchReport::default();
        };
        let Some(caller_record) = self.registry.get_my_mod(caller) else {
            debug!("[分发器] 未知调用方，丢弃发往 {} 的消息 {}", target_record.id, message);
            return DispatchReport::default();
        };

        let receivers = directory.receivers_for(&SenderKey::Mod(caller_record.id.clone()));
        if receivers.is_empty() {
            debug!(
                "[分发器] {} 没有接收 {} 的入口，丢弃消息 {}",
                target_record.id, caller_record.id, message
            );
            return DispatchReport::default();
        }

        let payload = payload.into();
        let mut report = DispatchReport::default();
        for receiver in receivers {
            self.deliver(&caller_record, &target_record.id, receiver, message, &payload, &mut report);
        }
        report
    }

    /// 广播
    ///
    /// 依次调用默认视图中每个 mod 的全局入口：mod 之间按加载顺序，
    /// mod 内部按注册顺序。调用方自己的全局入口同样会收到消息。
    pub fn broadcast(&self, caller: &ModHandle, message: &str, payload: impl Into<Payload>) -> DispatchReport {
        let Some(caller_record) = self.registry.get_my_mod(caller) else {
            debug!("[分发器] 未知调用方，丢弃广播 {}", message);
            return DispatchReport::default();
        };

        let targets = self.registry.loaded_receivers();
        if targets.iter().all(|(_, directory)| directory.global_receivers().is_empty()) {
            debug!("[分发器] 没有全局入口，丢弃广播 {}", message);
            return DispatchReport::default();
        }

        let payload = payload.into();
        let mut report = DispatchReport::default();
        for (record, directory) in &targets {
            for receiver in directory.global_receivers() {
                self.deliver(&caller_record, &record.id, receiver, message, &payload, &mut report);
            }
        }
        report
    }

    fn deliver(
        &self,
        caller: &ModRecord,
        owner: &ModId,
        receiver: &Receiver,
        message: &str,
        payload: &Payload,
        report: &mut DispatchReport,
    ) {
        if self.trace_deliveries {
            trace!(
                "[分发器] {} -> {}::{} ({}, {} 项负载)",
                caller.id,
                owner,
                receiver.entry_point(),
                message,
                payload.len()
            );
        }

        report.delivered += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            receiver.invoke(caller, message, payload.as_slice())
        }));

        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{:#}", e),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        warn!(
            "[分发器] {}::{} 处理 {} (来自 {}) 失败: {}",
            owner,
            receiver.entry_point(),
            message,
            caller.id,
            reason
        );
        report.failures.push(HandlerFailure {
            receiver: owner.clone(),
            entry_point: receiver.entry_point().to_string(),
            reason,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
