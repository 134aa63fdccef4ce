// ==========================================
// BOQ 导入引擎 - 导入任务管理器
// ==========================================
// 职责: 后台导入任务的创建、状态跟踪、取消与统计
// 状态机: pending → processing → {completed | failed}
// 红线: 进入终态的任务不再被覆盖（取消优先于后到的结果）
//       任务锁内只做非阻塞转发（try_send）,慢接收端不阻塞查询与取消
//       终态快照在状态落定后转发,保证 cancelled 之后不再有进度事件
// ==========================================

use crate::config::{ImportConfig, RuleConfigReader};
use crate::domain::import::{
    FailureReason, ImportJob, ImportPhase, ImportProgress, ImportResult, ImportStats, JobStatus,
    CANCELLED_BY_USER,
};
use crate::domain::issue::ImportIssue;
use crate::engine::progress::{bands, deliver, new_cancel_flag, CancelFlag, ProgressSink};
use crate::importer::boq_importer_trait::BoqImporter;
use crate::importer::error::EngineResult;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 失败原因统计条数
const TOP_FAILURE_REASONS: usize = 5;

// ==========================================
// JobEntry - 任务表中的单个条目
// ==========================================
struct JobEntry {
    slot: Mutex<JobSlot>,
    cancel: CancelFlag,
}

struct JobSlot {
    job: ImportJob,
    forward: Option<mpsc::Sender<ImportProgress>>, // 调用方进度通道,终态后关闭
}

impl JobSlot {
    /// 转发到调用方通道（持有任务锁时调用,不等待）
    fn forward(&mut self, progress: ImportProgress) {
        let Some(tx) = &self.forward else {
            return;
        };
        if let Err(e) = deliver(tx, progress) {
            debug!(job_id = %self.job.id, error = %e, "进度转发失败，停止转发");
            self.forward = None;
        }
    }

    /// 终态: 发送最终快照后释放调用方通道
    fn close(&mut self) {
        let snapshot = self.job.progress.clone();
        self.forward(snapshot);
        self.forward = None;
    }
}

// ==========================================
// JobProgressSink - 进度写入任务并转发
// ==========================================
struct JobProgressSink {
    entry: Arc<JobEntry>,
}

#[async_trait]
impl ProgressSink for JobProgressSink {
    async fn publish(&self, progress: ImportProgress) -> EngineResult<()> {
        let mut slot = self.entry.slot.lock().await;
        if slot.job.status.is_terminal() {
            return Ok(());
        }
        slot.job.progress = progress.clone();
        if !progress.phase.is_terminal() {
            slot.forward(progress);
        }
        Ok(())
    }
}

// ==========================================
// JobHandle
// ==========================================
pub struct JobHandle {
    id: String,
    entry: Arc<JobEntry>,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 等待任务结束并返回最终快照
    pub async fn wait(self) -> ImportJob {
        if let Err(e) = self.task.await {
            error!(job_id = %self.id, error = %e, "任务执行异常");
        }
        self.entry.slot.lock().await.job.clone()
    }
}

// ==========================================
// JobManager
// ==========================================
pub struct JobManager<I>
where
    I: BoqImporter + 'static,
{
    importer: Arc<I>,
    jobs: Arc<RwLock<HashMap<String, Arc<JobEntry>>>>,
}

impl<I> Clone for JobManager<I>
where
    I: BoqImporter + 'static,
{
    fn clone(&self) -> Self {
        Self {
            importer: Arc::clone(&self.importer),
            jobs: Arc::clone(&self.jobs),
        }
    }
}

impl<I> JobManager<I>
where
    I: BoqImporter + 'static,
{
    pub fn new(importer: I) -> Self {
        Self {
            importer: Arc::new(importer),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 创建后台导入任务（立即返回）
    ///
    /// # 参数
    /// - bytes: 文件内容
    /// - file_name: 文件名（按扩展名选择解析器）
    /// - config: 导入配置; `config.progress` 作为调用方进度通道
    pub async fn start_import(
        &self,
        bytes: Vec<u8>,
        file_name: impl Into<String>,
        mut config: ImportConfig,
    ) -> JobHandle {
        let job = ImportJob::new(file_name, bytes.len());
        let id = job.id.clone();

        let entry = Arc::new(JobEntry {
            slot: Mutex::new(JobSlot {
                job,
                forward: config.progress.take(),
            }),
            cancel: new_cancel_flag(),
        });
        self.jobs
            .write()
            .await
            .insert(id.clone(), Arc::clone(&entry));

        info!(job_id = %id, size = bytes.len(), "导入任务已创建");

        let importer = Arc::clone(&self.importer);
        let task_entry = Arc::clone(&entry);
        let task = tokio::spawn(async move {
            run_job(importer, task_entry, bytes, config).await;
        });

        JobHandle { id, entry, task }
    }

    /// 取消任务
    ///
    /// # 返回
    /// - true: 任务处于 pending/processing,已标记取消
    /// - false: 任务不存在或已结束
    pub async fn cancel_job(&self, id: &str) -> bool {
        let Some(entry) = self.entry(id).await else {
            return false;
        };

        let mut slot = entry.slot.lock().await;
        if slot.job.status.is_terminal() {
            return false;
        }

        let now = Utc::now();
        let job = &mut slot.job;
        job.status = JobStatus::Failed;
        job.error = Some(CANCELLED_BY_USER.to_string());
        job.completed_at = Some(now);
        job.progress = ImportProgress {
            phase: ImportPhase::Cancelled,
            message: CANCELLED_BY_USER.to_string(),
            timestamp: now,
            ..job.progress.clone()
        };
        entry.cancel.store(true, Ordering::SeqCst);
        slot.close();

        info!(job_id = %id, "导入任务已取消");
        true
    }

    pub async fn get_job(&self, id: &str) -> Option<ImportJob> {
        let entry = self.entry(id).await?;
        let job = entry.slot.lock().await.job.clone();
        Some(job)
    }

    /// 未结束的任务（按创建时间升序）
    pub async fn active_jobs(&self) -> Vec<ImportJob> {
        let mut jobs: Vec<ImportJob> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|j| !j.status.is_terminal())
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// 已结束的任务（最新在前）
    pub async fn job_history(&self, limit: usize) -> Vec<ImportJob> {
        let mut jobs: Vec<ImportJob> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|j| j.status.is_terminal())
            .collect();
        jobs.sort_by(|a, b| {
            let a_key = a.completed_at.unwrap_or(a.created_at);
            let b_key = b.completed_at.unwrap_or(b.created_at);
            b_key.cmp(&a_key)
        });
        jobs.truncate(limit);
        jobs
    }

    /// 清理早于指定天数结束的任务
    ///
    /// # 返回
    /// - 被移除的任务数
    pub async fn cleanup_history(&self, older_than_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(older_than_days);

        let mut expired = Vec::new();
        for job in self.snapshot().await {
            if job.status.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff) {
                expired.push(job.id);
            }
        }

        let mut jobs = self.jobs.write().await;
        let removed = expired
            .iter()
            .filter(|id| jobs.remove(id.as_str()).is_some())
            .count();

        if removed > 0 {
            info!(removed, older_than_days, "已清理历史导入任务");
        }
        removed
    }

    /// 按配置的保留天数清理历史任务
    pub async fn cleanup_with_retention<C>(&self, rules: &C) -> EngineResult<usize>
    where
        C: RuleConfigReader + ?Sized,
    {
        let days = rules.get_history_retention_days().await?;
        Ok(self.cleanup_history(days).await)
    }

    /// 任务统计（按需扫描）
    pub async fn stats(&self) -> ImportStats {
        summarize(&self.snapshot().await)
    }

    async fn entry(&self, id: &str) -> Option<Arc<JobEntry>> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn snapshot(&self) -> Vec<ImportJob> {
        let entries: Vec<Arc<JobEntry>> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            jobs.push(entry.slot.lock().await.job.clone());
        }
        jobs
    }
}

/// 后台任务主体
async fn run_job<I>(importer: Arc<I>, entry: Arc<JobEntry>, bytes: Vec<u8>, config: ImportConfig)
where
    I: BoqImporter + 'static,
{
    let (job_id, file_name) = {
        let mut slot = entry.slot.lock().await;
        if slot.job.status.is_terminal() {
            debug!(job_id = %slot.job.id, "任务在开始前已结束，跳过");
            return;
        }
        slot.job.status = JobStatus::Processing;
        slot.job.started_at = Some(Utc::now());
        (slot.job.id.clone(), slot.job.file_name.clone())
    };

    info!(job_id = %job_id, file_name = %file_name, "导入任务开始处理");

    let sink: Arc<dyn ProgressSink> = Arc::new(JobProgressSink {
        entry: Arc::clone(&entry),
    });
    let cancel = Arc::clone(&entry.cancel);
    let pipeline_file_name = file_name.clone();

    // 嵌套任务: panic 以 JoinError 形式返回
    let outcome = tokio::spawn(async move {
        importer
            .import_with(&pipeline_file_name, &bytes, &config, Some(sink), cancel)
            .await
    })
    .await;

    let mut slot = entry.slot.lock().await;
    if slot.job.status.is_terminal() {
        info!(job_id = %job_id, status = %slot.job.status, "任务已处于终态，忽略处理结果");
        return;
    }

    let job = &mut slot.job;
    job.completed_at = Some(Utc::now());
    match outcome {
        Ok(Ok(result)) if result.success => {
            info!(
                job_id = %job_id,
                valid_rows = result.stats.valid_rows,
                warnings = result.warnings.len(),
                duration_ms = job.duration_ms().unwrap_or(0),
                "导入任务完成"
            );
            job.status = JobStatus::Completed;
            job.result = Some(result);
        }
        Ok(Ok(result)) => {
            let message = result
                .errors
                .iter()
                .find(|e| e.is_blocking())
                .map(|e| e.message().to_string())
                .unwrap_or_else(|| "No valid rows imported".to_string());
            warn!(job_id = %job_id, errors = result.errors.len(), error = %message, "导入任务失败");
            job.status = JobStatus::Failed;
            job.error = Some(message);
            job.result = Some(result);
        }
        Ok(Err(e)) => {
            error!(job_id = %job_id, error = %e, "导入任务异常结束");
            fail_job(job, e.to_string());
        }
        Err(join_error) => {
            error!(job_id = %job_id, error = %join_error, "导入任务崩溃");
            fail_job(job, format!("Import task aborted: {}", join_error));
        }
    }

    // 终态阶段与状态一致: completed → complete, failed → error
    let (final_phase, percentage) = if job.status == JobStatus::Completed {
        (ImportPhase::Complete, bands::COMPLETE)
    } else {
        (ImportPhase::Error, job.progress.percentage)
    };
    if job.progress.phase != final_phase {
        job.progress = ImportProgress {
            phase: final_phase,
            percentage,
            message: job.error.clone().unwrap_or_default(),
            timestamp: Utc::now(),
            ..job.progress.clone()
        };
    }
    slot.close();
}

fn fail_job(job: &mut ImportJob, message: String) {
    job.status = JobStatus::Failed;
    job.result = Some(ImportResult::failed(
        ImportIssue::system(message.clone()),
        0,
        Vec::new(),
    ));
    job.error = Some(message);
}

/// 任务统计
pub fn summarize(jobs: &[ImportJob]) -> ImportStats {
    let mut stats = ImportStats {
        total_jobs: jobs.len(),
        ..ImportStats::default()
    };

    let mut durations = Vec::new();
    let mut reasons: HashMap<String, usize> = HashMap::new();

    for job in jobs {
        match job.status {
            JobStatus::Pending => stats.pending_jobs += 1,
            JobStatus::Processing => stats.processing_jobs += 1,
            JobStatus::Completed => stats.completed_jobs += 1,
            JobStatus::Failed => stats.failed_jobs += 1,
            JobStatus::Cancelled => stats.cancelled_jobs += 1,
        }

        if job.status == JobStatus::Failed && job.is_cancelled_by_user() {
            stats.cancelled_jobs += 1;
        } else if let Some(error) = job.error.as_deref() {
            let reason = error.split(':').next().unwrap_or(error).trim().to_string();
            *reasons.entry(reason).or_insert(0) += 1;
        }

        if job.status == JobStatus::Completed {
            if let Some(result) = &job.result {
                stats.total_valid_rows += result.stats.valid_rows;
            }
            if let Some(ms) = job.duration_ms() {
                durations.push(ms as f64);
            }
        }
    }

    if !durations.is_empty() {
        stats.average_processing_ms = durations.iter().sum::<f64>() / durations.len() as f64;
    }

    let mut top: Vec<FailureReason> = reasons
        .into_iter()
        .map(|(reason, count)| FailureReason { reason, count })
        .collect();
    top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
    top.truncate(TOP_FAILURE_REASONS);
    stats.top_failure_reasons = top;

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(status: JobStatus, error: Option<&str>, duration_ms: i64) -> ImportJob {
        let mut job = ImportJob::new("boq.csv", 10);
        let start = Utc::now();
        job.status = status;
        job.started_at = Some(start);
        job.completed_at = Some(start + Duration::milliseconds(duration_ms));
        job.error = error.map(str::to_string);
        job
    }

    #[test]
    fn test_summarize_counts_and_reasons() {
        let jobs = vec![
            finished(JobStatus::Completed, None, 100),
            finished(JobStatus::Failed, Some("CSV parse failed: bad quote"), 200),
            finished(JobStatus::Failed, Some("CSV parse failed: line 3"), 300),
            finished(JobStatus::Failed, Some("description is required"), 400),
            finished(JobStatus::Failed, Some(CANCELLED_BY_USER), 0),
            ImportJob::new("pending.csv", 1),
        ];
        let stats = summarize(&jobs);

        assert_eq!(stats.total_jobs, 6);
        assert_eq!(stats.completed_jobs, 1);
        assert_eq!(stats.failed_jobs, 4);
        assert_eq!(stats.cancelled_jobs, 1);
        assert_eq!(stats.pending_jobs, 1);
        // 平均耗时只统计已完成任务
        assert_eq!(stats.average_processing_ms, 100.0);
        assert_eq!(
            stats.top_failure_reasons[0],
            FailureReason {
                reason: "CSV parse failed".to_string(),
                count: 2
            }
        );
        assert_eq!(stats.top_failure_reasons.len(), 2);
    }

    #[test]
    fn test_average_ignores_failed_jobs() {
        let jobs = vec![
            finished(JobStatus::Completed, None, 100),
            finished(JobStatus::Failed, Some("CSV parse failed: bad quote"), 1900),
        ];
        assert_eq!(summarize(&jobs).average_processing_ms, 100.0);

        let only_failed = vec![finished(JobStatus::Failed, Some("File is empty"), 500)];
        assert_eq!(summarize(&only_failed).average_processing_ms, 0.0);
    }

    #[test]
    fn test_summarize_empty() {
        let stats = summarize(&[]);
        assert_eq!(stats.total_jobs, 0);
        assert_eq!(stats.average_processing_ms, 0.0);
        assert!(stats.top_failure_reasons.is_empty());
    }
}
