use crate::context::ModContext;
use crate::dispatch::MessageDispatcher;
use crate::mod_id::ModId;
use crate::receiver::ReceiverBuilder;
use crate::record::ModuleRef;
use crate::registry::ModRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// mod 清单 - 可以被序列化到 JSON 配置文件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModManifest {
    /// 原始 ID，注册时会被规范化
    pub id: String,
    /// 显示名称
    pub display_name: String,
    /// 版本
    pub version: String,
    /// 描述
    #[serde(default)]
    pub description: String,
    /// 是否默认启用
    #[serde(default = "default_enabled")]
    pub enabled_by_default: bool,
    /// 作者
    pub author: Option<String>,
    /// 依赖的 mod ID，必须在本 mod 之前加载
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// 其他自定义属性
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl ModManifest {
    /// 创建一个新的清单
    pub fn new(id: &str, display_name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            version: version.to_string(),
            description: String::new(),
            enabled_by_default: true,
            author: None,
            dependencies: Vec::new(),
            properties: HashMap::new(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// 设置是否默认启用
    pub fn enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    /// 设置作者
    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    /// 添加依赖
    pub fn depends_on(mut self, id: &str) -> Self {
        self.dependencies.push(id.to_string());
        self
    }

    /// 添加自定义属性
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }
}

/// 从 JSON 文件读取清单列表
pub fn load_manifests(path: impl AsRef<Path>) -> anyhow::Result<Vec<ModManifest>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// 保存清单列表到 JSON 文件
pub fn save_manifests(path: impl AsRef<Path>, manifests: &[ModManifest]) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(manifests)?)?;
    Ok(())
}

/// mod 入口 trait
/// 所有 mod 必须实现此 trait
pub trait GameMod: Send {
    /// 获取 mod 清单
    fn manifest(&self) -> &ModManifest;

    /// 声明消息入口 - 在 mod 进入 Loaded 之前调用一次
    ///
    /// 返回错误时该 mod 被标记为出错，不会被加载。
    fn register_receivers(&self, _receivers: &mut ReceiverBuilder<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// 加载完成 - 获得自己的上下文
    fn on_loaded(&mut self, _ctx: &ModContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// 是否启用
    fn is_enabled(&self) -> bool {
        self.manifest().enabled_by_default
    }
}

struct ModSlot {
    id: Option<ModId>,
    module: Box<dyn GameMod>,
    context: Option<ModContext>,
}

/// 一次加载的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: Vec<ModId>,
    pub errored: Vec<ModId>,
}

/// 进程内的参考加载器
///
/// 依次完成发现、按依赖排序和加载，把生命周期变化写入注册表。
/// 不扫描文件，也不加载二进制模块：mod 以 [`GameMod`] 实例的形式提供。
pub struct ModLoader {
    dispatcher: MessageDispatcher,
    mods: Vec<ModSlot>,
}

impl ModLoader {
    pub fn new(dispatcher: MessageDispatcher) -> Self {
        Self {
            dispatcher,
            mods: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ModRegistry> {
        self.dispatcher.registry()
    }

    /// 添加一个 mod
    pub fn register<M: GameMod + 'static>(&mut self, module: M) {
        self.push(Box::new(module));
    }

    /// 只添加启用的 mod
    pub fn register_enabled(&mut self, mods: Vec<Box<dyn GameMod>>) {
        for module in mods {
            if module.is_enabled() {
                self.push(module);
            } else {
                info!("[{}] mod 已禁用，跳过", module.manifest().id);
            }
        }
    }

    fn push(&mut self, module: Box<dyn GameMod>) {
        self.mods.push(ModSlot {
            id: None,
            module,
            context: None,
        });
    }

    /// 发现、排序并加载所有 mod
    pub fn run(&mut self) -> LoadSummary {
        self.discover();
        self.sort();
        self.load_all();

        let registry = self.registry();
        let mut summary = LoadSummary::default();
        for record in registry.get_all_mods(true, true) {
            if record.errored {
                summary.errored.push(record.id);
            } else if record.is_loaded() {
                summary.loaded.push(record.id);
            }
        }
        summary
    }

    /// 在注册表中记录所有 mod（Found）
    pub fn discover(&mut self) {
        let registry = Arc::clone(self.registry());
        for slot in self.mods.iter_mut().filter(|slot| slot.id.is_none()) {
            match registry.register_found(slot.module.manifest()) {
                Ok(id) => slot.id = Some(id),
                Err(e) => error!("[加载器] 无法登记 mod {}: {}", slot.module.manifest().id, e),
            }
        }
    }

    /// 按依赖关系排序（Found → Sorted）
    ///
    /// 结果稳定：没有依赖约束的 mod 保持发现顺序。依赖缺失、依赖出错或
    /// 存在循环依赖的 mod 会被标记为出错。
    pub fn sort(&mut self) {
        let registry = Arc::clone(self.registry());
        let mut pending: Vec<(ModId, Vec<ModId>)> = Vec::new();

        for slot in &self.mods {
            let Some(id) = &slot.id else { continue };
            if registry.get_mod(id, true, true).is_some_and(|record| record.errored) {
                continue;
            }
            let mut deps = Vec::new();
            let mut missing = None;
            for raw in &slot.module.manifest().dependencies {
                let known = registry.normalize(raw).filter(|dep| {
                    self.mods.iter().any(|other| other.id.as_ref() == Some(dep))
                        || registry.mod_present(dep, true, true)
                });
                match known {
                    Some(dep) => deps.push(dep),
                    None => {
                        missing = Some(raw.clone());
                        break;
                    }
                }
            }
            match missing {
                Some(dep) => {
                    warn!("[加载器] mod {} 缺少依赖 {}", id, dep);
                    registry.mark_id_errored(id);
                }
                None => pending.push((id.clone(), deps)),
            }
        }

        let mut sorted: HashSet<ModId> = registry
            .get_all_mods(true, false)
            .into_iter()
            .map(|record| record.id)
            .collect();

        loop {
            let mut progressed = false;
            pending.retain(|(id, deps)| {
                if registry.mod_present(id, true, false) {
                    return false;
                }
                let errored_dep = deps
                    .iter()
                    .find(|dep| registry.get_mod(*dep, true, true).is_some_and(|record| record.errored));
                if let Some(dep) = errored_dep {
                    warn!("[加载器] mod {} 的依赖 {} 出错", id, dep);
                    registry.mark_id_errored(id);
                    progressed = true;
                    return false;
                }
                if !deps.iter().all(|dep| sorted.contains(dep)) {
                    return true;
                }
                match registry.mark_sorted(id) {
                    Ok(()) => {
                        sorted.insert(id.clone());
                    }
                    Err(e) => error!("[加载器] mod {} 排序失败: {}", id, e),
                }
                progressed = true;
                false
            });
            if !progressed {
                break;
            }
        }

        for (id, _) in pending {
            warn!("[加载器] mod {} 存在循环依赖", id);
            registry.mark_id_errored(&id);
        }
    }

    /// 加载所有已排序的 mod（Sorted → Loaded），按排序顺序进行
    pub fn load_all(&mut self) {
        let registry = Arc::clone(self.registry());
        for record in registry.get_all_mods(true, false) {
            if record.is_loaded() {
                continue;
            }
            let Some(slot) = self.mods.iter_mut().find(|slot| slot.id.as_ref() == Some(&record.id)) else {
                continue;
            };
            if !Self::load_one(&self.dispatcher, &registry, slot) {
                registry.mark_id_errored(&record.id);
            }
        }
    }

    fn load_one(dispatcher: &MessageDispatcher, registry: &ModRegistry, slot: &mut ModSlot) -> bool {
        let Some(id) = slot.id.clone() else { return false };

        let mut builder = ReceiverBuilder::new(registry, id.clone());
        if let Err(e) = slot.module.register_receivers(&mut builder) {
            error!("[加载器] mod {} 声明消息入口失败: {:#}", id, e);
            return false;
        }

        let handle = match registry.mark_loaded(&id, ModuleRef::new(), builder.build()) {
            Ok(handle) => handle,
            Err(e) => {
                error!("[加载器] mod {} 加载失败: {}", id, e);
                return false;
            }
        };

        let ctx = ModContext::new(dispatcher.clone(), handle);
        if let Err(e) = slot.module.on_loaded(&ctx) {
            error!("[加载器] mod {} 初始化失败: {:#}", id, e);
            return false;
        }
        slot.context = Some(ctx);
        true
    }

    /// 获取已加载 mod 的上下文
    pub fn context(&self, id: &str) -> Option<&ModContext> {
        let id = self.registry().normalize(id)?;
        self.mods
            .iter()
            .find(|slot| slot.id.as_ref() == Some(&id))
            .and_then(|slot| slot.context.as_ref())
    }

    /// 导出所有 mod 的清单为 JSON
    pub fn export_manifests(&self) -> anyhow::Result<String> {
        let manifests: Vec<&ModManifest> = self.mods.iter().map(|slot| slot.module.manifest()).collect();
        Ok(serde_json::to_string_pretty(&manifests)?)
    }

    /// 列出注册表中的所有 mod
    pub fn list_mods(&self) {
        info!("=== 已知的 mod ===");
        for (idx, record) in self.registry().get_all_mods(true, true).iter().enumerate() {
            info!("{}. {} ({})", idx + 1, record, record.display_name);
        }
    }
}
