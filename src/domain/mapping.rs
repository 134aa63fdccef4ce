// ==========================================
// BOQ 导入引擎 - 列映射结果模型
// ==========================================
// 职责: 检测完成后冻结的 字段 → 表头 映射
// 红线: 只在检测阶段构造,行处理开始后只读
// ==========================================

use crate::domain::boq::BoqField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个字段的映射结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAssignment {
    pub field: BoqField,
    pub header: String,
    pub confidence: f64,
}

/// 冻结后的列映射
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedMapping {
    pub assignments: BTreeMap<BoqField, FieldAssignment>,
    pub confidence: f64,
    pub unmapped_headers: Vec<String>,
    pub missing_required: Vec<BoqField>,
}

impl DetectedMapping {
    /// 字段对应的表头
    pub fn header_for(&self, field: BoqField) -> Option<&str> {
        self.assignments.get(&field).map(|a| a.header.as_str())
    }

    pub fn is_mapped(&self, field: BoqField) -> bool {
        self.assignments.contains_key(&field)
    }

    /// 简化视图: 字段 → 表头
    pub fn as_field_map(&self) -> BTreeMap<BoqField, String> {
        self.assignments
            .iter()
            .map(|(field, a)| (*field, a.header.clone()))
            .collect()
    }
}
