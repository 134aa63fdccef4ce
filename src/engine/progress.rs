// ==========================================
// BOQ 导入引擎 - 进度跟踪器
// ==========================================
// 职责: 构造阶段化进度快照并投递到接收端
// 红线: 接收端失败只记录日志,不中断导入
//       投递不等待慢接收端: 通道写满时丢弃中间快照,终态快照后台补投
//       阶段序号与百分比只增不减; 终态之后不再投递
// ==========================================

use crate::domain::import::{ImportPhase, ImportProgress};
use crate::domain::issue::ImportIssue;
use crate::importer::error::{EngineError, EngineResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// 协作式取消标志（分块之间检查）
pub type CancelFlag = Arc<AtomicBool>;

pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(flag: &CancelFlag) -> bool {
    flag.load(Ordering::SeqCst)
}

/// 各阶段百分比区间
pub mod bands {
    pub const PARSING_START: f64 = 0.0;
    pub const PARSING_END: f64 = 10.0;
    pub const MAPPING_END: f64 = 15.0;
    pub const VALIDATING_END: f64 = 20.0;
    pub const PROCESSING_END: f64 = 95.0;
    pub const COMPLETE: f64 = 100.0;
}

// ==========================================
// ProgressSink Trait
// ==========================================
// 实现者: mpsc::Sender<ImportProgress>, JobProgressSink
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, progress: ImportProgress) -> EngineResult<()>;
}

#[async_trait]
impl ProgressSink for mpsc::Sender<ImportProgress> {
    async fn publish(&self, progress: ImportProgress) -> EngineResult<()> {
        deliver(self, progress)
    }
}

/// 非阻塞投递到有界通道
///
/// - 通道已满: 中间快照丢弃; 终态快照交给后台任务等待空位
/// - 接收端已关闭: 返回错误,调用方停止投递
pub fn deliver(tx: &mpsc::Sender<ImportProgress>, progress: ImportProgress) -> EngineResult<()> {
    match tx.try_send(progress) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(progress)) if progress.phase.is_terminal() => {
            let tx = tx.clone();
            tokio::spawn(async move {
                if tx.send(progress).await.is_err() {
                    debug!("接收端已关闭，终态进度未送达");
                }
            });
            Ok(())
        }
        Err(TrySendError::Full(progress)) => {
            debug!(
                phase = %progress.phase,
                percentage = progress.percentage,
                "进度通道已满，丢弃中间快照"
            );
            Ok(())
        }
        Err(TrySendError::Closed(_)) => {
            Err(EngineError::Internal("progress receiver dropped".to_string()))
        }
    }
}

// ==========================================
// ProgressTracker
// ==========================================
pub struct ProgressTracker {
    sink: Option<Arc<dyn ProgressSink>>,
    last: Option<(u8, f64)>, // (阶段序号, 百分比)
    finished: bool,
    total_rows: usize,
    errors: Vec<ImportIssue>,
    warnings: Vec<ImportIssue>,
}

impl ProgressTracker {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            last: None,
            finished: false,
            total_rows: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// 无接收端（只做顺序约束）
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn set_total_rows(&mut self, total_rows: usize) {
        self.total_rows = total_rows;
    }

    /// 更新快照中携带的累计问题列表
    pub fn set_issues(&mut self, errors: &[ImportIssue], warnings: &[ImportIssue]) {
        self.errors = errors.to_vec();
        self.warnings = warnings.to_vec();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn last_percentage(&self) -> f64 {
        self.last.map(|(_, pct)| pct).unwrap_or(bands::PARSING_START)
    }

    /// 处理阶段百分比: 20 ~ 95 按已处理行数线性分布
    pub fn processing_percentage(processed: usize, total: usize) -> f64 {
        if total == 0 {
            return bands::PROCESSING_END;
        }
        let ratio = (processed as f64 / total as f64).clamp(0.0, 1.0);
        bands::VALIDATING_END + ratio * (bands::PROCESSING_END - bands::VALIDATING_END)
    }

    /// 构造并投递快照
    ///
    /// # 返回
    /// - true: 已投递（或无接收端但通过顺序检查）
    /// - false: 因顺序约束/终态被丢弃
    pub async fn emit(
        &mut self,
        phase: ImportPhase,
        percentage: f64,
        processed_rows: usize,
        message: impl Into<String>,
    ) -> bool {
        if self.finished {
            return false;
        }

        let percentage = percentage.clamp(0.0, 100.0);
        if let Some((last_rank, last_pct)) = self.last {
            if phase.rank() < last_rank || percentage < last_pct {
                debug!(
                    phase = %phase,
                    percentage,
                    last_percentage = last_pct,
                    "进度事件倒退，已丢弃"
                );
                return false;
            }
        }

        self.last = Some((phase.rank(), percentage));
        if phase.is_terminal() {
            self.finished = true;
        }

        let snapshot = ImportProgress {
            phase,
            percentage,
            processed_rows,
            total_rows: self.total_rows,
            message: message.into(),
            errors: self.errors.clone(),
            warnings: self.warnings.clone(),
            timestamp: Utc::now(),
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.publish(snapshot).await {
                // 接收端关闭后本次导入不再投递
                debug!(error = %e, phase = %phase, "进度投递失败，已忽略");
                self.sink = None;
            }
        }
        true
    }

    /// 终态: 错误（百分比保持不变）
    pub async fn fail(&mut self, processed_rows: usize, message: impl Into<String>) -> bool {
        let pct = self.last_percentage();
        self.emit(ImportPhase::Error, pct, processed_rows, message).await
    }

    /// 终态: 取消（百分比保持不变）
    pub async fn cancel(&mut self, processed_rows: usize, message: impl Into<String>) -> bool {
        let pct = self.last_percentage();
        self.emit(ImportPhase::Cancelled, pct, processed_rows, message).await
    }
}
