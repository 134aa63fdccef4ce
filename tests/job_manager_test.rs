// ==========================================
// 导入任务管理器集成测试
// ==========================================
// 测试目标: 任务状态机、取消、并发任务、历史与统计
// ==========================================


use async_trait::async_trait;
use boq_import_engine::config::{ConfigManager, ImportConfig};
use boq_import_engine::domain::{ImportPhase, ImportProgress, ImportResult, JobStatus, CANCELLED_BY_USER};
use boq_import_engine::engine::{CancelFlag, JobManager, ProgressSink};
use boq_import_engine::importer::{BoqImporter, BoqImporterImpl, EngineResult};
use boq_import_engine::logging;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::*;
use tokio::sync::{mpsc, Notify};

// ==========================================
// 测试用导入器
// ==========================================

/// 在管道开始前等待放行的导入器
struct GatedImporter {
    inner: BoqImporterImpl<ConfigManager>,
    started: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl BoqImporter for GatedImporter {
    async fn import_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        self.inner.import_bytes(file_name, bytes, config).await
    }

    async fn import_with(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: CancelFlag,
    ) -> EngineResult<ImportResult> {
        self.started.notify_one();
        self.gate.notified().await;
        self.inner
            .import_with(file_name, bytes, config, sink, cancel)
            .await
    }

    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        self.inner.import_file(file_path, config).await
    }

    async fn batch_import(
        &self,
        files: Vec<(String, Vec<u8>)>,
        config: &ImportConfig,
    ) -> Vec<EngineResult<ImportResult>> {
        self.inner.batch_import(files, config).await
    }
}

/// 管道内部 panic 的导入器
struct PanickingImporter;

#[async_trait]
impl BoqImporter for PanickingImporter {
    async fn import_bytes(
        &self,
        _file_name: &str,
        _bytes: &[u8],
        _config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        panic!("parser exploded");
    }

    async fn import_with(
        &self,
        _file_name: &str,
        _bytes: &[u8],
        _config: &ImportConfig,
        _sink: Option<Arc<dyn ProgressSink>>,
        _cancel: CancelFlag,
    ) -> EngineResult<ImportResult> {
        panic!("parser exploded");
    }

    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        _file_path: P,
        _config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        panic!("parser exploded");
    }

    async fn batch_import(
        &self,
        _files: Vec<(String, Vec<u8>)>,
        _config: &ImportConfig,
    ) -> Vec<EngineResult<ImportResult>> {
        Vec::new()
    }
}

fn manager() -> JobManager<BoqImporterImpl<ConfigManager>> {
    JobManager::new(importer())
}

// ==========================================
// 状态机
// ==========================================

#[tokio::test]
async fn test_job_completes() {
    logging::init_test();

    let manager = manager();
    let (tx, rx) = mpsc::channel::<ImportProgress>(256);
    let config = ImportConfig {
        chunk_size: Some(10),
        ..ImportConfig::default()
    }
    .with_progress(tx);

    let handle = manager.start_import(standard_boq(50), "boq.csv", config).await;
    let id = handle.id().to_string();
    assert!(id.starts_with("imp_"));

    let job = handle.wait().await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.file_size, standard_boq(50).len());
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(job.progress.phase, ImportPhase::Complete);
    assert_eq!(job.result.as_ref().unwrap().stats.valid_rows, 50);
    assert!(job.error.is_none());

    // 任务结束后通道关闭,最后一个事件为 complete
    let events = collect_progress(rx).await;
    assert_eq!(events.last().unwrap().phase, ImportPhase::Complete);
    assert_eq!(
        events.iter().filter(|p| p.phase.is_terminal()).count(),
        1
    );

    assert_eq!(manager.get_job(&id).await.unwrap(), job);
}

#[tokio::test]
async fn test_job_fails_with_first_error() {
    let manager = manager();
    let handle = manager
        .start_import(b"Description,Qty,Unit\n".to_vec(), "boq.csv", ImportConfig::default())
        .await;

    let job = handle.wait().await;
    assert_eq!(job.status, JobStatus::Failed);
    let result = job.result.as_ref().unwrap();
    assert!(!result.success);
    assert_eq!(job.error.as_deref(), Some(result.errors[0].message()));
}

#[tokio::test]
async fn test_failed_result_ends_in_error_phase() {
    let manager = manager();
    let (tx, rx) = mpsc::channel::<ImportProgress>(64);
    let config = ImportConfig::default().with_progress(tx);
    let bytes = csv_bytes(
        &STANDARD_HEADERS,
        &[vec!["1", "Splice closure 48F", "0", "ea", "80", "0"]],
    );

    let job = manager.start_import(bytes, "boq.csv", config).await.wait().await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress.phase, ImportPhase::Error);
    assert!(job.error.unwrap().contains("quantity"));

    let events = collect_progress(rx).await;
    assert_eq!(events.last().unwrap().phase, ImportPhase::Error);
    assert!(events.iter().all(|p| p.phase != ImportPhase::Complete));
}

#[tokio::test]
async fn test_invalid_config_fails_job() {
    let manager = manager();
    let config = ImportConfig {
        header_row: 0,
        ..ImportConfig::default()
    };
    let job = manager
        .start_import(standard_boq(3), "boq.csv", config)
        .await
        .wait()
        .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("headerRow"));
    assert_eq!(job.progress.phase, ImportPhase::Error);
}

#[tokio::test]
async fn test_panic_in_pipeline_fails_job() {
    let manager = JobManager::new(PanickingImporter);
    let job = manager
        .start_import(standard_boq(3), "boq.csv", ImportConfig::default())
        .await
        .wait()
        .await;

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
    let result = job.result.unwrap();
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
}

// ==========================================
// 取消
// ==========================================

#[tokio::test]
async fn test_cancel_pending_job() {
    let manager = manager();
    let (tx, rx) = mpsc::channel::<ImportProgress>(16);
    let config = ImportConfig::default().with_progress(tx);

    // 单线程运行时: 任务在下一次让出前不会开始
    let handle = manager.start_import(standard_boq(10), "boq.csv", config).await;
    let id = handle.id().to_string();
    assert!(manager.cancel_job(&id).await);

    let job = handle.wait().await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(job.progress.phase, ImportPhase::Cancelled);
    assert!(job.started_at.is_none());
    assert!(job.result.is_none());

    let events = collect_progress(rx).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].phase, ImportPhase::Cancelled);

    // 终态任务不可再取消
    assert!(!manager.cancel_job(&id).await);
}

#[tokio::test]
async fn test_cancel_while_processing() {
    logging::init_test();

    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let manager = JobManager::new(GatedImporter {
        inner: importer(),
        started: Arc::clone(&started),
        gate: Arc::clone(&gate),
    });

    let (tx, rx) = mpsc::channel::<ImportProgress>(256);
    let config = ImportConfig {
        chunk_size: Some(1),
        ..ImportConfig::default()
    }
    .with_progress(tx);

    let handle = manager.start_import(standard_boq(200), "boq.csv", config).await;
    let id = handle.id().to_string();

    started.notified().await;
    assert_eq!(
        manager.get_job(&id).await.unwrap().status,
        JobStatus::Processing
    );
    assert!(manager.cancel_job(&id).await);
    gate.notify_one();

    let job = handle.wait().await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(CANCELLED_BY_USER));
    assert_eq!(job.progress.phase, ImportPhase::Cancelled);
    assert!(job.completed_at.is_some());

    // cancelled 之后没有任何进度事件
    let events = collect_progress(rx).await;
    assert_eq!(events.last().unwrap().phase, ImportPhase::Cancelled);
    assert_eq!(
        events.iter().filter(|p| p.phase.is_terminal()).count(),
        1
    );
}

#[tokio::test]
async fn test_cancel_unknown_or_finished_job() {
    let manager = manager();
    assert!(!manager.cancel_job("imp_missing").await);
    assert!(manager.get_job("imp_missing").await.is_none());

    let handle = manager
        .start_import(standard_boq(3), "boq.csv", ImportConfig::default())
        .await;
    let id = handle.id().to_string();
    handle.wait().await;
    assert!(!manager.cancel_job(&id).await);
    assert_eq!(
        manager.get_job(&id).await.unwrap().status,
        JobStatus::Completed
    );
}

// ==========================================
// 慢接收端
// ==========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unread_channel_does_not_block_job() {
    let manager = manager();
    let (tx, rx) = mpsc::channel::<ImportProgress>(1);
    let config = ImportConfig {
        chunk_size: Some(1),
        ..ImportConfig::default()
    }
    .with_progress(tx);

    let handle = manager.start_import(standard_boq(50), "boq.csv", config).await;
    let id = handle.id().to_string();

    // 接收端不读取时查询仍然立即返回
    for _ in 0..5 {
        let polled = tokio::time::timeout(Duration::from_millis(200), manager.get_job(&id))
            .await
            .expect("get_job blocked behind the progress channel");
        assert!(polled.is_some());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let job = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("job blocked behind the progress channel");
    assert_eq!(job.status, JobStatus::Completed);

    // 中间快照可被丢弃,终态快照必须送达
    let events = collect_progress(rx).await;
    assert_eq!(events.last().unwrap().phase, ImportPhase::Complete);
    assert_eq!(
        events.iter().filter(|p| p.phase.is_terminal()).count(),
        1
    );
}

// ==========================================
// 并发 / 历史 / 统计
// ==========================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_are_isolated() {
    logging::init_test();

    let manager = manager();
    let mut handles = Vec::new();
    for n in [5, 10, 15, 20, 25] {
        let config = ImportConfig {
            chunk_size: Some(4),
            ..ImportConfig::default()
        };
        handles.push((n, manager.start_import(standard_boq(n), format!("boq_{}.csv", n), config).await));
    }

    for (n, handle) in handles {
        let job = handle.wait().await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap().stats.valid_rows, n);
    }

    let stats = manager.stats().await;
    assert_eq!(stats.total_jobs, 5);
    assert_eq!(stats.completed_jobs, 5);
    assert_eq!(stats.total_valid_rows, 75);
    assert!(manager.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_history_and_cleanup() {
    let manager = manager();
    let mut ids = Vec::new();
    for i in 0..3 {
        let job = manager
            .start_import(standard_boq(2), format!("boq_{}.csv", i), ImportConfig::default())
            .await
            .wait()
            .await;
        ids.push(job.id);
    }
    let failed = manager
        .start_import(Vec::new(), "empty.csv", ImportConfig::default())
        .await
        .wait()
        .await;

    let history = manager.job_history(2).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, failed.id);
    assert_eq!(history[1].id, ids[2]);

    let stats = manager.stats().await;
    assert_eq!(stats.total_jobs, 4);
    assert_eq!(stats.failed_jobs, 1);
    assert_eq!(stats.top_failure_reasons.len(), 1);
    assert!(stats.average_processing_ms >= 0.0);

    // 默认保留 7 天: 不清理
    assert_eq!(manager.cleanup_with_retention(&ConfigManager::new()).await.unwrap(), 0);
    assert_eq!(manager.cleanup_history(1).await, 0);

    // 保留 0 天: 全部清理
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(manager.cleanup_history(0).await, 4);
    assert!(manager.get_job(&ids[0]).await.is_none());
    assert_eq!(manager.stats().await.total_jobs, 0);
}
