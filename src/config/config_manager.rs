// ==========================================
// BOQ 导入引擎 - 配置管理器
// ==========================================
// 职责: 规则配置加载、查询、覆写管理
// 存储: key-value（JSON 文件 / 代码注入）
// 覆写: 环境变量 BOQ_IMPORT_<KEY> 优先于文件值
// ==========================================

use crate::config::rule_config_trait::RuleConfigReader;
use crate::importer::error::{EngineError, EngineResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// 环境变量覆写前缀
pub const ENV_PREFIX: &str = "BOQ_IMPORT_";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    values: HashMap<String, String>,
}

impl ConfigManager {
    /// 空配置（全部走默认值,仍接受环境变量覆写）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从键值对创建
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 从 JSON 文本创建
    ///
    /// 格式: 扁平对象,值可为字符串/数值/布尔/字符串数组
    /// (数组按逗号拼接,与 `code_required_keywords` 的文本形式一致)
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let parsed: HashMap<String, Value> = serde_json::from_str(raw)?;

        let values = parsed
            .into_iter()
            .map(|(key, value)| {
                let text = match value {
                    Value::String(s) => s,
                    Value::Array(items) => items
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect();

        Ok(Self { values })
    }

    /// 从 JSON 文件加载
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigRead {
            key: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&raw)
    }

    /// 设置单个配置项（测试与 CLI 覆写使用）
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// 读取配置值: 环境变量 > 已加载值
    fn get_config_value(&self, key: &str) -> Option<String> {
        let env_key = format!("{}{}", ENV_PREFIX, key.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            return Some(value);
        }
        self.values.get(key).cloned()
    }

    /// 读取配置值,带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> String {
        self.get_config_value(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// 读取并解析数值配置; 格式错误时回落默认值
    fn get_parsed<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let value = self.get_config_or_default(key, &default.to_string());
        match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    config_key = key,
                    raw_value = %value,
                    "配置值格式错误，使用默认值"
                );
                default
            }
        }
    }

    /// 所有已加载配置的快照（按键排序）
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

// ==========================================
// RuleConfigReader Trait 实现
// ==========================================
#[async_trait]
impl RuleConfigReader for ConfigManager {
    // ===== 业务规则 =====

    async fn get_price_tolerance(&self) -> EngineResult<f64> {
        let tolerance = self.get_parsed(config_keys::PRICE_TOLERANCE, 0.01_f64);
        if !(0.0..=1.0).contains(&tolerance) {
            return Err(EngineError::ConfigRead {
                key: config_keys::PRICE_TOLERANCE.to_string(),
                message: format!("must be within [0, 1], got {}", tolerance),
            });
        }
        Ok(tolerance)
    }

    async fn get_min_description_length(&self) -> EngineResult<usize> {
        Ok(self.get_parsed(config_keys::MIN_DESCRIPTION_LENGTH, 5_usize))
    }

    async fn get_high_quantity_threshold(&self) -> EngineResult<f64> {
        Ok(self.get_parsed(config_keys::HIGH_QUANTITY_THRESHOLD, 10_000.0_f64))
    }

    async fn get_high_unit_price_threshold(&self) -> EngineResult<f64> {
        Ok(self.get_parsed(config_keys::HIGH_UNIT_PRICE_THRESHOLD, 1_000_000.0_f64))
    }

    async fn get_code_required_keywords(&self) -> EngineResult<Vec<String>> {
        let value = self.get_config_or_default(
            config_keys::CODE_REQUIRED_KEYWORDS,
            "cable,hardware,equipment",
        );

        Ok(value
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect())
    }

    // ===== 模式约束 =====

    async fn get_max_quantity(&self) -> EngineResult<f64> {
        Ok(self.get_parsed(config_keys::MAX_QUANTITY, 1_000_000.0_f64))
    }

    async fn get_max_price(&self) -> EngineResult<f64> {
        Ok(self.get_parsed(config_keys::MAX_PRICE, 100_000_000.0_f64))
    }

    // ===== 一致性规则 =====

    async fn get_max_uoms_per_category(&self) -> EngineResult<usize> {
        Ok(self.get_parsed(config_keys::MAX_UOMS_PER_CATEGORY, 3_usize))
    }

    async fn get_price_outlier_factor(&self) -> EngineResult<f64> {
        Ok(self.get_parsed(config_keys::PRICE_OUTLIER_FACTOR, 5.0_f64))
    }

    // ===== 任务管理 =====

    async fn get_history_retention_days(&self) -> EngineResult<i64> {
        Ok(self.get_parsed(config_keys::HISTORY_RETENTION_DAYS, 7_i64))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 业务规则
    pub const PRICE_TOLERANCE: &str = "price_tolerance";
    pub const MIN_DESCRIPTION_LENGTH: &str = "min_description_length";
    pub const HIGH_QUANTITY_THRESHOLD: &str = "high_quantity_threshold";
    pub const HIGH_UNIT_PRICE_THRESHOLD: &str = "high_unit_price_threshold";
    pub const CODE_REQUIRED_KEYWORDS: &str = "code_required_keywords"; // 逗号分隔

    // 模式约束
    pub const MAX_QUANTITY: &str = "max_quantity";
    pub const MAX_PRICE: &str = "max_price";

    // 一致性规则
    pub const MAX_UOMS_PER_CATEGORY: &str = "max_uoms_per_category";
    pub const PRICE_OUTLIER_FACTOR: &str = "price_outlier_factor";

    // 任务管理
    pub const HISTORY_RETENTION_DAYS: &str = "history_retention_days";
}
