//! 进程级消息接口
//!
//! 加载器启动时调用一次 [`install`]，之后任何 mod 都可以通过这里的函数
//! 发送消息或查询注册表。安装之前所有函数都退化为空操作并输出警告。

use crate::dispatch::{DispatchReport, MessageDispatcher, Payload};
use crate::record::{ModHandle, ModRecord, ModuleRef};
use crate::registry::{ModQuery, ModRegistry};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::warn;

static DISPATCHER: OnceCell<MessageDispatcher> = OnceCell::new();

/// 安装进程级分发器，只能调用一次
pub fn install(dispatcher: MessageDispatcher) -> anyhow::Result<()> {
    DISPATCHER
        .set(dispatcher)
        .map_err(|_| anyhow::anyhow!("mod messaging is already installed"))
}

/// 已安装的分发器
pub fn dispatcher() -> Option<&'static MessageDispatcher> {
    let dispatcher = DISPATCHER.get();
    if dispatcher.is_none() {
        warn!("[api] mod messaging is not installed");
    }
    dispatcher
}

/// 已安装的注册表
pub fn registry() -> Option<&'static Arc<ModRegistry>> {
    dispatcher().map(MessageDispatcher::registry)
}

/// 向目标 mod（记录、模块或 ID）发送消息
pub fn send_message<'q>(
    caller: &ModHandle,
    target: impl Into<ModQuery<'q>>,
    message: &str,
    payload: impl Into<Payload>,
) -> DispatchReport {
    dispatcher()
        .map(|d| d.send(caller, target, message, payload))
        .unwrap_or_default()
}

/// 广播消息
pub fn broadcast_message(caller: &ModHandle, message: &str, payload: impl Into<Payload>) -> DispatchReport {
    dispatcher()
        .map(|d| d.broadcast(caller, message, payload))
        .unwrap_or_default()
}

/// 将调用方自己的 mod 标记为出错
pub fn mark_as_errored(caller: &ModHandle) -> bool {
    registry().is_some_and(|r| r.mark_errored(caller))
}

/// 将指定模块对应的 mod 标记为出错
pub fn mark_module_as_errored(module: &ModuleRef) -> bool {
    registry().is_some_and(|r| r.mark_module_errored(module))
}

pub fn get_all_mods(include_unloaded: bool, include_errored: bool) -> Vec<ModRecord> {
    registry()
        .map(|r| r.get_all_mods(include_unloaded, include_errored))
        .unwrap_or_default()
}

pub fn get_my_mod(caller: &ModHandle) -> Option<ModRecord> {
    registry()?.get_my_mod(caller)
}

pub fn get_mod<'q>(
    query: impl Into<ModQuery<'q>>,
    include_unloaded: bool,
    include_errored: bool,
) -> Option<ModRecord> {
    registry()?.get_mod(query, include_unloaded, include_errored)
}

pub fn mod_present<'q>(query: impl Into<ModQuery<'q>>, include_unloaded: bool, include_errored: bool) -> bool {
    registry().is_some_and(|r| r.mod_present(query, include_unloaded, include_errored))
}
