use crate::dispatch::{DispatchReport, MessageDispatcher, Payload, WeakDispatcher};
use crate::record::{ModHandle, ModRecord};
use crate::registry::{ModQuery, ModRegistry};
use std::sync::Arc;

/// mod 上下文
///
/// 在 mod 加载完成时交给它，封装了分发器和该 mod 的调用方凭证，
/// 之后的发送、广播、自身查询都以这个 mod 的身份进行。
#[derive(Clone)]
pub struct ModContext {
    dispatcher: MessageDispatcher,
    handle: ModHandle,
}

impl ModContext {
    pub fn new(dispatcher: MessageDispatcher, handle: ModHandle) -> Self {
        Self { dispatcher, handle }
    }

    /// 向指定 mod 发送消息
    ///
    /// 目标不存在时静默丢弃。
    pub fn send<'q>(
        &self,
        target: impl Into<ModQuery<'q>>,
        message: &str,
        payload: impl Into<Payload>,
    ) -> DispatchReport {
        self.dispatcher.send(&self.handle, target, message, payload)
    }

    /// 广播消息给所有已加载 mod 的全局入口（包括自己）
    pub fn broadcast(&self, message: &str, payload: impl Into<Payload>) -> DispatchReport {
        self.dispatcher.broadcast(&self.handle, message, payload)
    }

    /// 当前 mod 的记录
    pub fn my_mod(&self) -> Option<ModRecord> {
        self.registry().get_my_mod(&self.handle)
    }

    /// 报告当前 mod 出错
    pub fn mark_errored(&self) -> bool {
        self.registry().mark_errored(&self.handle)
    }

    pub fn get_mod<'q>(&self, query: impl Into<ModQuery<'q>>) -> Option<ModRecord> {
        self.registry().get_mod(query, false, false)
    }

    pub fn mod_present<'q>(&self, query: impl Into<ModQuery<'q>>) -> bool {
        self.registry().mod_present(query, false, false)
    }

    pub fn all_mods(&self) -> Vec<ModRecord> {
        self.registry().get_all_mods(false, false)
    }

    /// 获取注册表的引用
    pub fn registry(&self) -> &Arc<ModRegistry> {
        self.dispatcher.registry()
    }

    /// 当前 mod 的调用方凭证
    pub fn handle(&self) -> &ModHandle {
        &self.handle
    }

    /// 不持有注册表的上下文，供注册到注册表中的处理函数保存
    pub fn downgrade(&self) -> WeakModContext {
        WeakModContext {
            dispatcher: self.dispatcher.downgrade(),
            handle: self.handle.clone(),
        }
    }
}

/// [`ModContext`] 的弱引用版本，注册表释放后无法再升级
#[derive(Clone)]
pub struct WeakModContext {
    dispatcher: WeakDispatcher,
    handle: ModHandle,
}

impl WeakModContext {
    pub fn upgrade(&self) -> Option<ModContext> {
        Some(ModContext::new(self.dispatcher.upgrade()?, self.handle.clone()))
    }
}
