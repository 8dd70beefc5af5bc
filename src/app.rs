use crate::api;
use crate::config::ModdingConfig;
use crate::dispatch::MessageDispatcher;
use crate::loader::{GameMod, LoadSummary, ModLoader};
use crate::registry::ModRegistry;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 应用构建器
///
/// 组装配置、注册表、分发器和加载器，并把分发器安装为进程级接口
pub struct App {
    mods: Vec<Box<dyn GameMod>>,
    config: Option<ModdingConfig>,
    config_path: Option<PathBuf>,
    show_manifests: bool,
    install_global: bool,
}

impl App {
    /// 使用所有内置 mod 创建应用
    pub fn new() -> Self {
        Self::with_mods(crate::mods::builtin_mods())
    }

    /// 使用自定义 mod 列表创建应用
    pub fn with_mods(mods: Vec<Box<dyn GameMod>>) -> Self {
        Self {
            mods,
            config: None,
            config_path: None,
            show_manifests: false,
            install_global: true,
        }
    }

    /// 直接指定配置
    pub fn config(mut self, config: ModdingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从文件读取配置（不存在时写出默认配置）
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// 设置是否输出 mod 清单
    pub fn show_manifests(mut self, show: bool) -> Self {
        self.show_manifests = show;
        self
    }

    /// 设置是否安装进程级接口
    pub fn install_global(mut self, install: bool) -> Self {
        self.install_global = install;
        self
    }

    /// 运行应用：加载所有 mod 并返回加载器
    pub fn run(self) -> Result<(ModLoader, LoadSummary)> {
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ModdingConfig::load_or_default(path),
            (None, None) => ModdingConfig::default(),
        };

        let registry = Arc::new(ModRegistry::from_config(&config)?);
        let dispatcher = MessageDispatcher::from_config(registry, &config);
        if self.install_global {
            api::install(dispatcher.clone())?;
        }

        let mut loader = ModLoader::new(dispatcher);
        loader.register_enabled(self.mods);

        if self.show_manifests {
            info!("=== mod 清单 (JSON) ===\n{}", loader.export_manifests()?);
        }

        let summary = loader.run();
        loader.list_mods();
        info!(
            "加载完成: {} 个 mod 已加载, {} 个出错",
            summary.loaded.len(),
            summary.errored.len()
        );
        Ok((loader, summary))
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
