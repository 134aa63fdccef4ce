// ==========================================
// BOQ 导入引擎 - 校验规则配置读取 Trait
// ==========================================
// 职责: 定义校验层所需的阈值读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::importer::error::EngineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ==========================================
// RuleConfigReader Trait
// ==========================================
// 用途: 校验阈值读取接口
// 实现者: ConfigManager（JSON 文件 + 环境变量覆写）
#[async_trait]
pub trait RuleConfigReader: Send + Sync {
    // ===== 业务规则 =====

    /// 单价 × 数量 与合价的相对容差
    ///
    /// # 默认值
    /// - 0.01（1%）
    async fn get_price_tolerance(&self) -> EngineResult<f64>;

    /// 描述最短长度（低于则警告）
    ///
    /// # 默认值
    /// - 5
    async fn get_min_description_length(&self) -> EngineResult<usize>;

    /// 数量偏大警告阈值
    ///
    /// # 默认值
    /// - 10000
    async fn get_high_quantity_threshold(&self) -> EngineResult<f64>;

    /// 单价偏高警告阈值
    ///
    /// # 默认值
    /// - 1000000
    async fn get_high_unit_price_threshold(&self) -> EngineResult<f64>;

    /// 建议填写物料编码的类别关键字
    ///
    /// # 默认值
    /// - ["cable", "hardware", "equipment"]
    async fn get_code_required_keywords(&self) -> EngineResult<Vec<String>>;

    // ===== 模式约束 =====

    /// 数量上限（含）
    ///
    /// # 默认值
    /// - 1000000
    async fn get_max_quantity(&self) -> EngineResult<f64>;

    /// 单价/合价上限（含）
    ///
    /// # 默认值
    /// - 100000000
    async fn get_max_price(&self) -> EngineResult<f64>;

    // ===== 一致性规则 =====

    /// 同一类别允许的计量单位种类数
    ///
    /// # 默认值
    /// - 3
    async fn get_max_uoms_per_category(&self) -> EngineResult<usize>;

    /// 单价离群倍数（相对类别均价）
    ///
    /// # 默认值
    /// - 5.0
    async fn get_price_outlier_factor(&self) -> EngineResult<f64>;

    // ===== 任务管理 =====

    /// 任务历史保留天数
    ///
    /// # 默认值
    /// - 7
    async fn get_history_retention_days(&self) -> EngineResult<i64>;
}

// ==========================================
// RuleThresholds - 单次导入使用的阈值快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleThresholds {
    pub price_tolerance: f64,
    pub min_description_length: usize,
    pub high_quantity_threshold: f64,
    pub high_unit_price_threshold: f64,
    pub code_required_keywords: Vec<String>,
    pub max_quantity: f64,
    pub max_price: f64,
    pub max_uoms_per_category: usize,
    pub price_outlier_factor: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            price_tolerance: 0.01,
            min_description_length: 5,
            high_quantity_threshold: 10_000.0,
            high_unit_price_threshold: 1_000_000.0,
            code_required_keywords: vec![
                "cable".to_string(),
                "hardware".to_string(),
                "equipment".to_string(),
            ],
            max_quantity: 1_000_000.0,
            max_price: 100_000_000.0,
            max_uoms_per_category: 3,
            price_outlier_factor: 5.0,
        }
    }
}

impl RuleThresholds {
    /// 从配置读取器加载完整阈值快照
    pub async fn load<C: RuleConfigReader + ?Sized>(reader: &C) -> EngineResult<Self> {
        Ok(Self {
            price_tolerance: reader.get_price_tolerance().await?,
            min_description_length: reader.get_min_description_length().await?,
            high_quantity_threshold: reader.get_high_quantity_threshold().await?,
            high_unit_price_threshold: reader.get_high_unit_price_threshold().await?,
            code_required_keywords: reader.get_code_required_keywords().await?,
            max_quantity: reader.get_max_quantity().await?,
            max_price: reader.get_max_price().await?,
            max_uoms_per_category: reader.get_max_uoms_per_category().await?,
            price_outlier_factor: reader.get_price_outlier_factor().await?,
        })
    }
}
