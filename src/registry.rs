//! mod 注册表
//!
//! 保存本次运行中发现的全部 mod 及其生命周期状态。注册表只增不减：
//! 记录在发现时创建，随后只会前进（Found → Sorted → Loaded）或被标记为出错。
//! 所有状态都在同一把读写锁之后，读者不会看到变更到一半的记录。

use crate::config::ModdingConfig;
use crate::error::LifecycleError;
use crate::loader::ModManifest;
use crate::mod_id::{IdNormalizer, ModId};
use crate::receiver::ReceiverDirectory;
use crate::record::{LifecycleState, ModHandle, ModRecord, ModuleRef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 查询 mod 的方式
#[derive(Debug, Clone, Copy)]
pub enum ModQuery<'a> {
    /// 已持有的记录（按其 ID 重新查找）
    Record(&'a ModRecord),
    /// 模块身份
    Module(&'a ModuleRef),
    /// 已规范化的 ID
    Normalized(&'a ModId),
    /// 原始字符串 ID，查找前会先规范化
    Id(&'a str),
}

impl<'a> From<&'a ModRecord> for ModQuery<'a> {
    fn from(record: &'a ModRecord) -> Self {
        Self::Record(record)
    }
}

impl<'a> From<&'a ModuleRef> for ModQuery<'a> {
    fn from(module: &'a ModuleRef) -> Self {
        Self::Module(module)
    }
}

impl<'a> From<&'a str> for ModQuery<'a> {
    fn from(id: &'a str) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a String> for ModQuery<'a> {
    fn from(id: &'a String) -> Self {
        Self::Id(id.as_str())
    }
}

impl<'a> From<&'a ModId> for ModQuery<'a> {
    fn from(id: &'a ModId) -> Self {
        Self::Normalized(id)
    }
}

impl fmt::Display for ModQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(record) => write!(f, "{}", record.id),
            Self::Module(module) => write!(f, "{}", module),
            Self::Normalized(id) => write!(f, "{}", id),
            Self::Id(id) => write!(f, "{:?}", id),
        }
    }
}

struct Entry {
    record: ModRecord,
    receivers: Arc<ReceiverDirectory>,
}

#[derive(Default)]
struct RegistryState {
    /// 发现顺序
    entries: Vec<Entry>,
    by_id: HashMap<ModId, usize>,
    /// 依赖排序顺序
    sort_order: Vec<usize>,
    /// 加载顺序
    load_order: Vec<usize>,
    handles: HashMap<ModHandle, usize>,
}

impl RegistryState {
    fn find(&self, query: ModQuery<'_>, normalizer: &IdNormalizer) -> Option<usize> {
        match query {
            ModQuery::Record(record) => self.by_id.get(&record.id).copied(),
            ModQuery::Normalized(id) => self.by_id.get(id).copied(),
            ModQuery::Module(module) => self
                .entries
                .iter()
                .position(|entry| entry.record.module.as_ref() == Some(module)),
            ModQuery::Id(raw) => {
                let id = normalizer.normalize(raw)?;
                self.by_id.get(&id).copied()
            }
        }
    }

    fn index_of(&self, id: &ModId) -> Result<usize, LifecycleError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| LifecycleError::UnknownMod(id.to_string()))
    }

    fn set_errored(&mut self, idx: usize) -> bool {
        let record = &mut self.entries[idx].record;
        if record.errored {
            return false;
        }
        record.errored = true;
        warn!("[注册表] mod {} 已标记为出错", record.id);
        true
    }
}

/// 记录在给定过滤条件下是否可见
fn visible(record: &ModRecord, include_unloaded: bool, include_errored: bool) -> bool {
    if record.errored {
        return include_errored;
    }
    match record.state {
        LifecycleState::Loaded => true,
        LifecycleState::Sorted => include_unloaded,
        LifecycleState::Found => false,
    }
}

/// mod 注册表
pub struct ModRegistry {
    normalizer: IdNormalizer,
    state: RwLock<RegistryState>,
}

impl ModRegistry {
    /// 使用默认 ID 规则创建空注册表
    pub fn new() -> Self {
        Self::with_normalizer(IdNormalizer::default())
    }

    pub fn with_normalizer(normalizer: IdNormalizer) -> Self {
        Self {
            normalizer,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// 根据配置创建注册表
    pub fn from_config(config: &ModdingConfig) -> anyhow::Result<Self> {
        Ok(Self::with_normalizer(IdNormalizer::new(&config.id_exclusion_pattern)?))
    }

    /// 注册表使用的 ID 规范化器
    pub fn normalizer(&self) -> &IdNormalizer {
        &self.normalizer
    }

    /// 按注册表规则规范化原始 ID
    pub fn normalize(&self, raw: &str) -> Option<ModId> {
        self.normalizer.normalize(raw)
    }

    // ---- 加载器接口 ----

    /// 记录新发现的 mod（Found）
    pub fn register_found(&self, manifest: &ModManifest) -> Result<ModId, LifecycleError> {
        let id = self
            .normalize(&manifest.id)
            .ok_or_else(|| LifecycleError::EmptyId(manifest.id.clone()))?;

        let mut state = self.state.write();
        if state.by_id.contains_key(&id) {
            return Err(LifecycleError::DuplicateId(id.to_string()));
        }

        let discovery_index = state.entries.len();
        state.entries.push(Entry {
            record: ModRecord {
                id: id.clone(),
                display_name: manifest.display_name.clone(),
                version: manifest.version.clone(),
                module: None,
                state: LifecycleState::Found,
                errored: false,
                discovery_index,
            },
            receivers: Arc::new(ReceiverDirectory::default()),
        });
        state.by_id.insert(id.clone(), discovery_index);
        debug!("[注册表] 发现 mod {} (#{})", id, discovery_index);
        Ok(id)
    }

    /// Found → Sorted；调用顺序即依赖排序顺序
    pub fn mark_sorted(&self, id: &ModId) -> Result<(), LifecycleError> {
        let mut state = self.state.write();
        let idx = state.index_of(id)?;
        Self::check_transition(&state.entries[idx].record, LifecycleState::Sorted)?;

        state.entries[idx].record.state = LifecycleState::Sorted;
        state.sort_order.push(idx);
        debug!("[注册表] mod {} 排序完成", id);
        Ok(())
    }

    /// Sorted → Loaded：安装接收器目录，绑定模块身份并签发调用方凭证
    pub fn mark_loaded(
        &self,
        id: &ModId,
        module: ModuleRef,
        receivers: ReceiverDirectory,
    ) -> Result<ModHandle, LifecycleError> {
        let mut state = self.state.write();
        let idx = state.index_of(id)?;
        Self::check_transition(&state.entries[idx].record, LifecycleState::Loaded)?;

        let handle = ModHandle::issue();
        let entry = &mut state.entries[idx];
        entry.record.state = LifecycleState::Loaded;
        entry.record.module = Some(module);
        entry.receivers = Arc::new(receivers);
        let receiver_count = entry.receivers.len();

        state.load_order.push(idx);
        state.handles.insert(handle.clone(), idx);
        info!("[注册表] mod {} 已加载 ({}, {} 个消息入口)", id, module, receiver_count);
        Ok(handle)
    }

    fn check_transition(record: &ModRecord, to: LifecycleState) -> Result<(), LifecycleError> {
        if record.errored {
            return Err(LifecycleError::Errored(record.id.to_string()));
        }
        let expected = match to {
            LifecycleState::Sorted => Some(LifecycleState::Found),
            LifecycleState::Loaded => Some(LifecycleState::Sorted),
            LifecycleState::Found => None,
        };
        if expected != Some(record.state) {
            return Err(LifecycleError::InvalidTransition {
                id: record.id.to_string(),
                from: record.state.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    // ---- 出错标记 ----

    /// 将调用方自己的 mod 标记为出错
    ///
    /// 幂等；凭证无效时什么也不做。返回是否发生了变更。
    pub fn mark_errored(&self, caller: &ModHandle) -> bool {
        let mut state = self.state.write();
        match state.handles.get(caller).copied() {
            Some(idx) => state.set_errored(idx),
            None => {
                debug!("[注册表] 未知调用方凭证，忽略出错标记");
                false
            }
        }
    }

    /// 将指定模块对应的 mod 标记为出错
    pub fn mark_module_errored(&self, module: &ModuleRef) -> bool {
        let mut state = self.state.write();
        match state.find(ModQuery::Module(module), &self.normalizer) {
            Some(idx) => state.set_errored(idx),
            None => false,
        }
    }

    /// 按记录、已规范化 ID 或原始 ID 标记出错（加载器在发现、排序或加载失败时使用）
    pub fn mark_id_errored<'q>(&self, query: impl Into<ModQuery<'q>>) -> bool {
        let mut state = self.state.write();
        match state.find(query.into(), &self.normalizer) {
            Some(idx) => state.set_errored(idx),
            None => false,
        }
    }

    // ---- 查询 ----

    /// 按生命周期过滤的全部 mod 快照
    ///
    /// - 默认：已加载且未出错的 mod，按加载顺序
    /// - `include_unloaded`：额外包括已排序但未加载的 mod，按依赖排序顺序
    /// - `include_errored`：额外包括所有出错的 mod，按发现顺序
    pub fn get_all_mods(&self, include_unloaded: bool, include_errored: bool) -> Vec<ModRecord> {
        let state = self.state.read();
        let order: Box<dyn Iterator<Item = usize> + '_> = if include_errored {
            Box::new(0..state.entries.len())
        } else if include_unloaded {
            Box::new(state.sort_order.iter().copied())
        } else {
            Box::new(state.load_order.iter().copied())
        };

        order
            .map(|idx| &state.entries[idx].record)
            .filter(|record| visible(record, include_unloaded, include_errored))
            .cloned()
            .collect()
    }

    /// 在给定过滤视图中查找 mod；找不到时返回 `None`
    pub fn get_mod<'q>(
        &self,
        query: impl Into<ModQuery<'q>>,
        include_unloaded: bool,
        include_errored: bool,
    ) -> Option<ModRecord> {
        let state = self.state.read();
        let idx = state.find(query.into(), &self.normalizer)?;
        let record = &state.entries[idx].record;
        visible(record, include_unloaded, include_errored).then(|| record.clone())
    }

    /// 调用方自己的记录（包括未加载和出错的视图）
    pub fn get_my_mod(&self, caller: &ModHandle) -> Option<ModRecord> {
        let state = self.state.read();
        let idx = state.handles.get(caller).copied()?;
        Some(state.entries[idx].record.clone())
    }

    /// mod 是否存在于给定过滤视图中
    pub fn mod_present<'q>(
        &self,
        query: impl Into<ModQuery<'q>>,
        include_unloaded: bool,
        include_errored: bool,
    ) -> bool {
        self.get_mod(query, include_unloaded, include_errored).is_some()
    }

    /// 已知 mod 总数（包括所有状态）
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---- 分发器使用 ----

    /// 解析目标 mod 及其接收器（包括未加载和出错的 mod）
    pub(crate) fn resolve_target(&self, query: ModQuery<'_>) -> Option<(ModRecord, Arc<ReceiverDirectory>)> {
        let state = self.state.read();
        let idx = state.find(query, &self.normalizer)?;
        let entry = &state.entries[idx];
        Some((entry.record.clone(), Arc::clone(&entry.receivers)))
    }

    /// 默认视图中每个 mod 的接收器，按加载顺序
    pub(crate) fn loaded_receivers(&self) -> Vec<(ModRecord, Arc<ReceiverDirectory>)> {
        let state = self.state.read();
        state
            .load_order
            .iter()
            .map(|&idx| &state.entries[idx])
            .filter(|entry| visible(&entry.record, false, false))
            .map(|entry| (entry.record.clone(), Arc::clone(&entry.receivers)))
            .collect()
    }
}

impl Default for ModRegistry {
    fn default() -> Self {
        Self::new()
    }
}
