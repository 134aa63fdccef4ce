// ==========================================
// BOQ 导入引擎 - 导入问题（错误 / 警告）
// ==========================================
// 职责: 行级/数据集级问题的封闭标签联合
// 说明: 同一类型既用于错误（行被剔除）也用于警告（行保留）,
//       严重程度由所在列表决定
//       按重复策略合并的行记为非阻断错误（行被剔除,导入仍可成功）
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// 问题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Validation,
    Mapping,
    Processing,
    System,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Validation => "validation",
            IssueKind::Mapping => "mapping",
            IssueKind::Processing => "processing",
            IssueKind::System => "system",
        }
    }
}

/// 导入问题
///
/// `row` 为 1 起的数据行号; 0 表示表头/整个数据集。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportIssue {
    Validation {
        row: usize,
        column: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    Mapping {
        row: usize,
        column: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    Processing {
        row: usize,
        column: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
    System {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ImportIssue {
    pub fn validation(row: usize, column: &str, message: impl Into<String>) -> Self {
        ImportIssue::Validation {
            row,
            column: Some(column.to_string()),
            message: message.into(),
            details: None,
        }
    }

    pub fn mapping(column: Option<&str>, message: impl Into<String>) -> Self {
        ImportIssue::Mapping {
            row: 0,
            column: column.map(str::to_string),
            message: message.into(),
            details: None,
        }
    }

    pub fn processing(row: usize, column: Option<&str>, message: impl Into<String>) -> Self {
        ImportIssue::Processing {
            row,
            column: column.map(str::to_string),
            message: message.into(),
            details: None,
        }
    }

    /// 按重复策略被合并的行
    pub fn duplicate_collapsed(
        row: usize,
        first_row: usize,
        action: &str,
        message: impl Into<String>,
    ) -> Self {
        ImportIssue::processing(row, None, message).with_details(json!({
            "first_row": first_row,
            "duplicate_row": row,
            "action": action,
        }))
    }

    pub fn system(message: impl Into<String>) -> Self {
        ImportIssue::System {
            message: message.into(),
            details: None,
        }
    }

    /// 附加结构化详情
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            ImportIssue::Validation { details, .. }
            | ImportIssue::Mapping { details, .. }
            | ImportIssue::Processing { details, .. }
            | ImportIssue::System { details, .. } => *details = Some(value),
        }
        self
    }

    pub fn kind(&self) -> IssueKind {
        match self {
            ImportIssue::Validation { .. } => IssueKind::Validation,
            ImportIssue::Mapping { .. } => IssueKind::Mapping,
            ImportIssue::Processing { .. } => IssueKind::Processing,
            ImportIssue::System { .. } => IssueKind::System,
        }
    }

    pub fn row(&self) -> usize {
        match self {
            ImportIssue::Validation { row, .. }
            | ImportIssue::Mapping { row, .. }
            | ImportIssue::Processing { row, .. } => *row,
            ImportIssue::System { .. } => 0,
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            ImportIssue::Validation { column, .. }
            | ImportIssue::Mapping { column, .. }
            | ImportIssue::Processing { column, .. } => column.as_deref(),
            ImportIssue::System { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ImportIssue::Validation { message, .. }
            | ImportIssue::Mapping { message, .. }
            | ImportIssue::Processing { message, .. }
            | ImportIssue::System { message, .. } => message,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            ImportIssue::Validation { details, .. }
            | ImportIssue::Mapping { details, .. }
            | ImportIssue::Processing { details, .. }
            | ImportIssue::System { details, .. } => details.as_ref(),
        }
    }

    pub fn is_duplicate_collapse(&self) -> bool {
        matches!(
            self,
            ImportIssue::Processing {
                details: Some(details),
                ..
            } if details.get("action").is_some()
        )
    }

    /// 阻断性错误: 除重复合并外的全部错误
    pub fn is_blocking(&self) -> bool {
        !self.is_duplicate_collapse()
    }
}

// ==========================================
// RowIssues - 单行/单阶段问题累加器
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowIssues {
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
}

impl RowIssues {
    pub fn error(&mut self, issue: ImportIssue) {
        self.errors.push(issue);
    }

    pub fn warn(&mut self, issue: ImportIssue) {
        self.warnings.push(issue);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn extend(&mut self, other: RowIssues) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.row(), self.column()) {
            (0, None) => write!(f, "[{}] {}", self.kind().as_str(), self.message()),
            (0, Some(col)) => write!(f, "[{}] {}: {}", self.kind().as_str(), col, self.message()),
            (row, None) => write!(f, "[{}] row {}: {}", self.kind().as_str(), row, self.message()),
            (row, Some(col)) => write!(
                f,
                "[{}] row {}, {}: {}",
                self.kind().as_str(),
                row,
                col,
                self.message()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_accessors() {
        let issue = ImportIssue::validation(4, "quantity", "quantity is required")
            .with_details(json!({ "raw": "" }));

        assert_eq!(issue.kind(), IssueKind::Validation);
        assert_eq!(issue.row(), 4);
        assert_eq!(issue.column(), Some("quantity"));
        assert_eq!(issue.details(), Some(&json!({ "raw": "" })));
        assert_eq!(
            issue.to_string(),
            "[validation] row 4, quantity: quantity is required"
        );
    }

    #[test]
    fn test_system_issue_has_no_row() {
        let issue = ImportIssue::system("File is empty");
        assert_eq!(issue.row(), 0);
        assert_eq!(issue.column(), None);
        assert_eq!(issue.to_string(), "[system] File is empty");
    }

    #[test]
    fn test_duplicate_collapse_is_not_blocking() {
        let collapsed = ImportIssue::duplicate_collapsed(3, 1, "skip", "Duplicate of row 1 skipped");
        assert_eq!(collapsed.kind(), IssueKind::Processing);
        assert_eq!(collapsed.row(), 3);
        assert!(!collapsed.is_blocking());

        assert!(ImportIssue::processing(3, None, "row transform failed").is_blocking());
        assert!(ImportIssue::validation(3, "quantity", "quantity is required").is_blocking());
    }

    #[test]
    fn test_issue_serializes_with_type_tag() {
        let issue = ImportIssue::mapping(Some("uom"), "Required field not mapped");
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value["type"], "mapping");
        assert_eq!(value["row"], 0);
        assert!(value.get("details").is_none());
    }
}
