// ==========================================
// BOQ 导入引擎 - 单次导入配置
// ==========================================
// 职责: 每次调用传入的导入参数（审核、严格模式、分块、列映射覆写等）
// 红线: 进度通道不参与序列化
// ==========================================

use crate::domain::boq::BoqField;
use crate::domain::import::ImportProgress;
use crate::importer::error::{EngineError, EngineResult};
use crate::importer::file_parser::ReadOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// 重复记录处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    Skip,
    Update,
    #[default]
    Append,
}

impl DuplicateHandling {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateHandling::Skip => "skip",
            DuplicateHandling::Update => "update",
            DuplicateHandling::Append => "append",
        }
    }
}

impl std::str::FromStr for DuplicateHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(DuplicateHandling::Skip),
            "update" => Ok(DuplicateHandling::Update),
            "append" => Ok(DuplicateHandling::Append),
            other => Err(format!("unknown duplicate handling: {}", other)),
        }
    }
}

// ==========================================
// ImportConfig
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportConfig {
    pub auto_approve: bool,
    pub strict_validation: bool,
    pub min_mapping_confidence: f64,
    pub create_new_items: bool,
    pub duplicate_handling: DuplicateHandling,
    pub chunk_size: Option<usize>,
    pub column_mapping: Option<HashMap<BoqField, Vec<String>>>,
    pub header_row: usize,
    pub skip_rows: usize,
    pub sheet_name: Option<String>,

    /// 调用方进度通道（有界）
    #[serde(skip)]
    pub progress: Option<mpsc::Sender<ImportProgress>>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            strict_validation: false,
            min_mapping_confidence: 0.8,
            create_new_items: false,
            duplicate_handling: DuplicateHandling::Append,
            chunk_size: None,
            column_mapping: None,
            header_row: 1,
            skip_rows: 0,
            sheet_name: None,
            progress: None,
        }
    }
}

impl ImportConfig {
    /// 参数合法性检查
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.min_mapping_confidence) {
            return Err(EngineError::InvalidConfig(format!(
                "minMappingConfidence must be within [0, 1], got {}",
                self.min_mapping_confidence
            )));
        }
        if self.chunk_size == Some(0) {
            return Err(EngineError::InvalidConfig(
                "chunkSize must be at least 1".to_string(),
            ));
        }
        if self.header_row == 0 {
            return Err(EngineError::InvalidConfig(
                "headerRow is 1-based and must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// 文件读取选项
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            header_row: self.header_row,
            skip_rows: self.skip_rows,
            sheet_name: self.sheet_name.clone(),
        }
    }

    pub fn with_progress(mut self, sender: mpsc::Sender<ImportProgress>) -> Self {
        self.progress = Some(sender);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ImportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duplicate_handling, DuplicateHandling::Append);
        assert_eq!(config.min_mapping_confidence, 0.8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = ImportConfig {
            min_mapping_confidence: 1.5,
            ..ImportConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let config = ImportConfig {
            chunk_size: Some(0),
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ImportConfig {
            header_row: 0,
            ..ImportConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_camel_case_with_defaults() {
        let config: ImportConfig = serde_json::from_str(
            r#"{
                "strictValidation": true,
                "chunkSize": 250,
                "duplicateHandling": "skip",
                "columnMapping": { "quantity": ["Menge"], "unitPrice": ["Preis"] }
            }"#,
        )
        .unwrap();

        assert!(config.strict_validation);
        assert_eq!(config.chunk_size, Some(250));
        assert_eq!(config.duplicate_handling, DuplicateHandling::Skip);
        assert_eq!(config.header_row, 1);
        let overrides = config.column_mapping.unwrap();
        assert_eq!(overrides[&BoqField::Quantity], vec!["Menge".to_string()]);
        assert_eq!(overrides[&BoqField::UnitPrice], vec!["Preis".to_string()]);
        assert!(config.progress.is_none());
    }
}
