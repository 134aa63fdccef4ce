// ==========================================
// BOQ 导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 职责: 数据集级失败（整单中止）; 行级问题走 ImportIssue
// ==========================================

use crate::domain::issue::ImportIssue;
use thiserror::Error;

/// 导入引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 文件相关错误 =====
    #[error("Unsupported file format: {0} (supported: .csv, .xlsx, .xls)")]
    UnsupportedFormat(String),

    #[error("File is empty: {0}")]
    EmptyFile(String),

    #[error("File has no columns: {0}")]
    NoColumns(String),

    #[error("No data rows found in {0}")]
    NoDataRows(String),

    #[error("Worksheet not found: {0}")]
    SheetNotFound(String),

    #[error("CSV parse failed: {0}")]
    CsvParse(String),

    #[error("Workbook parse failed: {0}")]
    WorkbookParse(String),

    #[error("File read failed: {0}")]
    Io(String),

    // ===== 配置错误 =====
    #[error("Invalid import configuration: {0}")]
    InvalidConfig(String),

    #[error("Config read failed (key: {key}): {message}")]
    ConfigRead { key: String, message: String },

    // ===== 任务控制 =====
    #[error("Import cancelled")]
    Cancelled,

    // ===== 通用错误 =====
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::CsvParse(err.to_string())
    }
}

impl From<calamine::Error> for EngineError {
    fn from(err: calamine::Error) -> Self {
        EngineError::WorkbookParse(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidConfig(err.to_string())
    }
}

/// 数据集级错误统一转为 system 问题
impl From<&EngineError> for ImportIssue {
    fn from(err: &EngineError) -> Self {
        ImportIssue::system(err.to_string())
    }
}

impl From<EngineError> for ImportIssue {
    fn from(err: EngineError) -> Self {
        ImportIssue::from(&err)
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::issue::IssueKind;

    #[test]
    fn test_engine_error_becomes_system_issue() {
        let issue: ImportIssue = EngineError::UnsupportedFormat("pdf".to_string()).into();
        assert_eq!(issue.kind(), IssueKind::System);
        assert!(issue.message().contains("pdf"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
