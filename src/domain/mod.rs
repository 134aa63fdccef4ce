// ==========================================
// BOQ 导入引擎 - 领域模型层
// ==========================================
// 职责: 定义清单行、导入问题、映射结果、任务与进度模型
// 红线: 不含解析逻辑,不含校验逻辑
// ==========================================

pub mod boq;
pub mod import;
pub mod issue;
pub mod mapping;

// 重导出核心类型
pub use boq::{format_number, BoqField, CellValue, ParsedBoqItem, RawRow};
pub use import::{
    FailureReason, ImportJob, ImportPhase, ImportProgress, ImportResult, ImportStats,
    ImportSummary, JobStatus, ReviewStatus, CANCELLED_BY_USER,
};
pub use issue::{ImportIssue, IssueKind, RowIssues};
pub use mapping::{DetectedMapping, FieldAssignment};
