use crate::mod_id::DEFAULT_ID_EXCLUSION_PATTERN;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::error;

/// 消息层配置，保存为 JSON 文件
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModdingConfig {
    /// mod ID 中需要去掉的字符（正则，忽略大小写）
    pub id_exclusion_pattern: String,
    /// 是否为每次投递输出 trace 日志
    pub log_dispatch: bool,
}

impl Default for ModdingConfig {
    fn default() -> Self {
        Self {
            id_exclusion_pattern: DEFAULT_ID_EXCLUSION_PATTERN.to_string(),
            log_dispatch: false,
        }
    }
}

impl ModdingConfig {
    /// 从文件读取配置
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// 读取配置；文件不存在时写出默认配置，读取或解析失败时使用默认值
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            let default_config = Self::default();
            if let Err(e) = default_config.save(path) {
                error!("Failed to write default config to {}: {}", path.display(), e);
            }
            return default_config;
        }

        Self::load(path).unwrap_or_else(|e| {
            error!("Failed to load config {}: {}, using default", path.display(), e);
            Self::default()
        })
    }
}
