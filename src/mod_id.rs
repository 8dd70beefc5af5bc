use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 默认的 ID 排除规则：除字母、数字和下划线以外的字符都会被去掉
pub const DEFAULT_ID_EXCLUSION_PATTERN: &str = "[^0-9a-z_]";

/// 规范化后的 mod 标识符
///
/// 只能通过 [`IdNormalizer`] 构造，保证加载器和注册表使用同一套规则。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModId(String);

impl ModId {
    /// 获取 ID 字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// ID 规范化器
///
/// 去掉所有匹配排除规则的字符（忽略大小写），结果统一转为小写，
/// 因此仅大小写或被排除字符不同的 ID 会得到相同的 [`ModId`]。
#[derive(Debug, Clone)]
pub struct IdNormalizer {
    exclusion: Regex,
}

impl IdNormalizer {
    /// 使用指定的排除规则创建规范化器
    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let exclusion = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { exclusion })
    }

    /// 规范化原始 ID；结果为空时返回 `None`
    pub fn normalize(&self, raw: &str) -> Option<ModId> {
        let stripped = self.exclusion.replace_all(raw, "");
        let id = stripped.to_lowercase();
        if id.is_empty() {
            None
        } else {
            Some(ModId(id))
        }
    }

    /// 当前使用的排除规则
    pub fn pattern(&self) -> &str {
        self.exclusion.as_str()
    }
}

impl Default for IdNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_ID_EXCLUSION_PATTERN).expect("内置 ID 规则无效")
    }
}
