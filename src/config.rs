use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 使能度如何对待截断为 0 的输入权重。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroWeightDegree {
    /// 使能度直接为 0，无限服务的倍乘因此使权重归零。
    #[default]
    Disabled,
    /// 跳过该项，不限制使能度。
    Unbounded,
}

/// `Net::random_transition` 如何把抽样下标映射到迁移。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// 每个使能迁移等概率。
    #[default]
    Uniform,
    /// 下标 `i` 选中第 `max(i - 1, 0)` 个元素：0 与 1 都落到第一个迁移，最后一个永远不会被选中。
    Legacy,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub zero_weight_degree: ZeroWeightDegree,
    #[serde(default)]
    pub selection: SelectionMode,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
