// ==========================================
// BOQ 导入引擎 - 导入结果 / 进度 / 任务模型
// ==========================================
// 职责: ImportResult、ImportProgress、ImportJob、ImportStats
// ==========================================

use crate::domain::boq::ParsedBoqItem;
use crate::domain::issue::ImportIssue;
use crate::domain::mapping::DetectedMapping;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 用户取消时写入任务的终态错误信息
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

// ==========================================
// ImportSummary - 汇总统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,   // 读取的数据行数
    pub valid_rows: usize,   // 输出记录数
    pub error_rows: usize,   // 至少一个错误的行（去重）
    pub warning_rows: usize, // 至少一个警告的行（去重）
}

/// 审核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    NeedsReview,
}

// ==========================================
// ImportResult - 单次导入结果（创建后不可变）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub data: Vec<ParsedBoqItem>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
    pub stats: ImportSummary,
    pub mapping: Option<DetectedMapping>,
    pub review_status: ReviewStatus,
    pub duplicates_collapsed: usize,
}

impl ImportResult {
    /// 数据集级失败（文件不可读/为空等）
    pub fn failed(issue: ImportIssue, total_rows: usize, warnings: Vec<ImportIssue>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            errors: vec![issue],
            warnings,
            stats: ImportSummary {
                total_rows,
                ..ImportSummary::default()
            },
            mapping: None,
            review_status: ReviewStatus::NeedsReview,
            duplicates_collapsed: 0,
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// 指定行的全部错误
    pub fn errors_for_row(&self, row: usize) -> Vec<&ImportIssue> {
        self.errors.iter().filter(|e| e.row() == row).collect()
    }

    /// 指定行的全部警告
    pub fn warnings_for_row(&self, row: usize) -> Vec<&ImportIssue> {
        self.warnings.iter().filter(|w| w.row() == row).collect()
    }
}

// ==========================================
// ImportPhase - 进度阶段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    Parsing,
    Validating,
    Mapping,
    Processing,
    Saving,
    Complete,
    Error,
    Cancelled,
}

impl ImportPhase {
    /// 阶段顺序（进度事件只允许非递减）
    pub fn rank(&self) -> u8 {
        match self {
            ImportPhase::Parsing => 0,
            ImportPhase::Mapping => 1,
            ImportPhase::Validating => 2,
            ImportPhase::Processing => 3,
            ImportPhase::Saving => 4,
            ImportPhase::Complete => 5,
            ImportPhase::Error | ImportPhase::Cancelled => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::Complete | ImportPhase::Error | ImportPhase::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Parsing => "parsing",
            ImportPhase::Validating => "validating",
            ImportPhase::Mapping => "mapping",
            ImportPhase::Processing => "processing",
            ImportPhase::Saving => "saving",
            ImportPhase::Complete => "complete",
            ImportPhase::Error => "error",
            ImportPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ImportProgress - 进度快照（每次发送都是完整快照）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub phase: ImportPhase,
    pub percentage: f64,
    pub processed_rows: usize,
    pub total_rows: usize,
    pub message: String,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
    pub timestamp: DateTime<Utc>,
}

impl ImportProgress {
    /// 排队中任务的初始快照
    pub fn queued() -> Self {
        Self {
            phase: ImportPhase::Parsing,
            percentage: 0.0,
            processed_rows: 0,
            total_rows: 0,
            message: "Queued".to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

// ==========================================
// JobStatus - 任务状态机
// ==========================================
// pending → processing → {completed | failed | cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ImportJob - 导入任务
// ==========================================
// 红线: 进入终态后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub file_name: String,
    pub file_size: usize,
    pub status: JobStatus,
    pub progress: ImportProgress,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<ImportResult>,
    pub error: Option<String>,
}

impl ImportJob {
    pub fn new(file_name: impl Into<String>, file_size: usize) -> Self {
        Self {
            id: format!("imp_{}", Uuid::new_v4().simple()),
            file_name: file_name.into(),
            file_size,
            status: JobStatus::Pending,
            progress: ImportProgress::queued(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// 处理耗时（毫秒）
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    pub fn is_cancelled_by_user(&self) -> bool {
        self.error.as_deref() == Some(CANCELLED_BY_USER)
            || self.status == JobStatus::Cancelled
    }
}

// ==========================================
// ImportStats - 任务统计（按需扫描生成）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    pub cancelled_jobs: usize,
    pub total_valid_rows: usize,
    pub average_processing_ms: f64,
    pub top_failure_reasons: Vec<FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub reason: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_rank_order() {
        assert!(ImportPhase::Parsing.rank() < ImportPhase::Mapping.rank());
        assert!(ImportPhase::Mapping.rank() < ImportPhase::Validating.rank());
        assert!(ImportPhase::Validating.rank() < ImportPhase::Processing.rank());
        assert!(ImportPhase::Processing.rank() < ImportPhase::Complete.rank());
        assert!(ImportPhase::Cancelled.is_terminal());
        assert!(!ImportPhase::Saving.is_terminal());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = ImportJob::new("boq.csv", 128);
        assert!(job.id.starts_with("imp_"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.duration_ms(), None);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn test_failed_result_shape() {
        let result = ImportResult::failed(ImportIssue::system("File is empty"), 0, Vec::new());
        assert!(!result.success);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.stats.total_rows, 0);
        assert_eq!(result.review_status, ReviewStatus::NeedsReview);
    }
}
