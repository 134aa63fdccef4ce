// ==========================================
// BOQ 导入引擎 - 清单导入器实现
// ==========================================
// 职责: 串联导入管道并发布阶段进度
// 流程: 配置检查 → 解析 → 列映射 → 行处理 + 校验 → 汇总 → 审核状态
// 红线: 数据集级失败返回 success=false 的结果; 行级失败不中止导入
// ==========================================

use crate::config::{ImportConfig, RuleConfigReader, RuleThresholds};
use crate::domain::import::{ImportPhase, ImportResult, ReviewStatus};
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::domain::mapping::DetectedMapping;
use crate::engine::progress::{bands, new_cancel_flag, CancelFlag, ProgressSink, ProgressTracker};
use crate::importer::boq_importer_trait::{BoqImporter, ColumnMapper, FileParser};
use crate::importer::chunk_processor::{ChunkProcessor, ProcessedBatch};
use crate::importer::column_mapper::{AliasCatalog, AliasColumnMapper, MANUAL_REVIEW_THRESHOLD};
use crate::importer::error::{EngineError, EngineResult};
use crate::importer::file_parser::UniversalFileParser;
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// BoqImporterImpl
// ==========================================
pub struct BoqImporterImpl<C>
where
    C: RuleConfigReader,
{
    // 校验阈值读取器
    rules: C,

    // 文件解析器
    file_parser: Box<dyn FileParser>,
}

impl<C> BoqImporterImpl<C>
where
    C: RuleConfigReader,
{
    /// 使用按扩展名分派的默认解析器
    pub fn new(rules: C) -> Self {
        Self::with_parser(rules, Box::new(UniversalFileParser))
    }

    pub fn with_parser(rules: C, file_parser: Box<dyn FileParser>) -> Self {
        Self { rules, file_parser }
    }

    pub fn rules(&self) -> &C {
        &self.rules
    }
}

#[async_trait]
impl<C> BoqImporter for BoqImporterImpl<C>
where
    C: RuleConfigReader + Send + Sync,
{
    async fn import_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        let sink = config
            .progress
            .clone()
            .map(|tx| Arc::new(tx) as Arc<dyn ProgressSink>);
        self.import_with(file_name, bytes, config, sink, new_cancel_flag())
            .await
    }

    #[instrument(skip(self, bytes, config, sink, cancel), fields(size = bytes.len()))]
    async fn import_with(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: CancelFlag,
    ) -> EngineResult<ImportResult> {
        let start_time = Instant::now();
        let mut tracker = ProgressTracker::new(sink);

        config.validate()?;
        let thresholds = RuleThresholds::load(&self.rules).await?;

        info!(file_name = %file_name, "开始导入清单");

        match self
            .run_pipeline(file_name, bytes, config, &thresholds, &mut tracker, &cancel)
            .await
        {
            Ok(result) => {
                info!(
                    file_name = %file_name,
                    success = result.success,
                    total_rows = result.stats.total_rows,
                    valid_rows = result.stats.valid_rows,
                    errors = result.errors.len(),
                    warnings = result.warnings.len(),
                    elapsed_ms = start_time.elapsed().as_millis() as u64,
                    "清单导入完成"
                );
                Ok(result)
            }
            Err(EngineError::Cancelled) => {
                info!(file_name = %file_name, "清单导入已取消");
                tracker.cancel(0, "Import cancelled").await;
                Err(EngineError::Cancelled)
            }
            Err(e) => {
                error!(file_name = %file_name, error = %e, "清单导入失败");
                tracker.fail(0, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        config: &ImportConfig,
    ) -> EngineResult<ImportResult> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        debug!(path = %path.display(), "读取文件");
        let bytes = tokio::fs::read(path).await?;
        self.import_bytes(&file_name, &bytes, config).await
    }

    async fn batch_import(
        &self,
        files: Vec<(String, Vec<u8>)>,
        config: &ImportConfig,
    ) -> Vec<EngineResult<ImportResult>> {
        use futures::future::join_all;

        info!(count = files.len(), "开始批量导入文件");

        // 为每个文件创建导入任务
        let import_tasks = files.into_iter().map(|(file_name, bytes)| async move {
            info!(file = %file_name, "开始导入文件");
            match self.import_bytes(&file_name, &bytes, config).await {
                Ok(result) => {
                    info!(file = %file_name, success = result.success, "文件导入完成");
                    Ok(result)
                }
                Err(e) => {
                    error!(file = %file_name, error = %e, "文件导入失败");
                    Err(e)
                }
            }
        });

        // 并发执行所有导入任务
        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results
                .iter()
                .filter(|r| matches!(r, Ok(result) if result.success))
                .count(),
            failed = results
                .iter()
                .filter(|r| !matches!(r, Ok(result) if result.success))
                .count(),
            "批量导入完成"
        );

        results
    }
}

// 管道步骤
impl<C> BoqImporterImpl<C>
where
    C: RuleConfigReader,
{
    async fn run_pipeline(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
        thresholds: &RuleThresholds,
        tracker: &mut ProgressTracker,
        cancel: &CancelFlag,
    ) -> EngineResult<ImportResult> {
        // === 步骤 1: 解析文件 ===
        tracker
            .emit(ImportPhase::Parsing, bands::PARSING_START, 0, format!("Reading {}", file_name))
            .await;

        let sheet = match self.file_parser.parse(file_name, bytes, &config.read_options()) {
            Ok(sheet) => sheet,
            Err(e) => return Ok(dataset_failure(tracker, e).await),
        };
        if sheet.rows.is_empty() {
            return Ok(dataset_failure(tracker, EngineError::NoDataRows(file_name.to_string())).await);
        }

        let total_rows = sheet.rows.len();
        tracker.set_total_rows(total_rows);
        info!(
            total_rows,
            columns = sheet.headers.len(),
            sheet = sheet.sheet_name.as_deref().unwrap_or("-"),
            "文件解析完成"
        );
        tracker
            .emit(
                ImportPhase::Parsing,
                bands::PARSING_END,
                0,
                format!("Read {} rows", total_rows),
            )
            .await;

        // === 步骤 2: 列映射 ===
        let catalog = match &config.column_mapping {
            Some(overrides) => AliasCatalog::default().with_overrides(overrides),
            None => AliasCatalog::default(),
        };
        let mapper = AliasColumnMapper::new(catalog);
        let mapping = mapper.detect(&sheet.headers);

        let mut carried = RowIssues::default();
        if sheet.encoding_replaced {
            carried.warn(ImportIssue::processing(
                0,
                None,
                "File is not valid UTF-8; unreadable characters were replaced",
            ));
        }
        for issue in mapping_advisories(&mapping, config.min_mapping_confidence) {
            warn!(message = %issue.message(), "列映射提示");
            carried.warn(issue);
        }
        if let Some(issue) = mapper.check_completeness(&mapping, &sheet.headers) {
            warn!(message = %issue.message(), "必填字段未映射");
            carried.warn(issue);
        }

        info!(
            mapped = mapping.assignments.len(),
            confidence = mapping.confidence,
            unmapped = mapping.unmapped_headers.len(),
            "列映射完成"
        );
        tracker.set_issues(&[], &carried.warnings);
        tracker
            .emit(
                ImportPhase::Mapping,
                bands::MAPPING_END,
                0,
                format!("Mapped {} columns", mapping.assignments.len()),
            )
            .await;

        // === 步骤 3: 行处理 + 校验 ===
        tracker
            .emit(ImportPhase::Validating, bands::VALIDATING_END, 0, "Validating rows")
            .await;

        let processor = ChunkProcessor::new(config, thresholds);
        let batch = match config.chunk_size {
            Some(n) => {
                processor
                    .process_in_chunks(&sheet.rows, &mapping, n, carried, tracker, cancel)
                    .await?
            }
            None => {
                processor
                    .process_all(&sheet.rows, &mapping, carried, tracker, cancel)
                    .await?
            }
        };

        // === 步骤 4: 结果 ===
        let result = build_result(batch, mapping, config);

        tracker.set_issues(&result.errors, &result.warnings);
        let summary = format!(
            "{} valid, {} errors, {} warnings",
            result.stats.valid_rows,
            result.errors.len(),
            result.warnings.len()
        );
        if result.success {
            tracker
                .emit(
                    ImportPhase::Complete,
                    bands::COMPLETE,
                    total_rows,
                    format!("Import complete: {}", summary),
                )
                .await;
        } else {
            tracker
                .fail(total_rows, format!("Import failed: {}", summary))
                .await;
        }

        Ok(result)
    }
}

/// 数据集级失败: 一个 system 错误, total_rows = 0
async fn dataset_failure(tracker: &mut ProgressTracker, e: EngineError) -> ImportResult {
    warn!(error = %e, "文件无法导入");
    let result = ImportResult::failed(ImportIssue::from(&e), 0, Vec::new());
    tracker.set_issues(&result.errors, &result.warnings);
    tracker.fail(0, e.to_string()).await;
    result
}

/// 映射置信度提示（row 0 的 mapping 警告）
fn mapping_advisories(mapping: &DetectedMapping, min_confidence: f64) -> Vec<ImportIssue> {
    let mut issues = Vec::new();
    if mapping.confidence < MANUAL_REVIEW_THRESHOLD {
        issues.push(
            ImportIssue::mapping(
                None,
                format!(
                    "Column mapping confidence is low ({:.0}%); manual review recommended",
                    mapping.confidence * 100.0
                ),
            )
            .with_details(json!({ "confidence": mapping.confidence })),
        );
    } else if mapping.confidence < min_confidence {
        issues.push(
            ImportIssue::mapping(
                None,
                format!(
                    "Column mapping confidence {:.0}% is below the configured minimum of {:.0}%",
                    mapping.confidence * 100.0,
                    min_confidence * 100.0
                ),
            )
            .with_details(json!({
                "confidence": mapping.confidence,
                "min_confidence": min_confidence,
            })),
        );
    }
    issues
}

fn build_result(batch: ProcessedBatch, mapping: DetectedMapping, config: &ImportConfig) -> ImportResult {
    let success = !batch.data.is_empty() && !batch.errors.iter().any(ImportIssue::is_blocking);
    let review_status = if config.auto_approve
        && success
        && mapping.confidence >= config.min_mapping_confidence
    {
        ReviewStatus::Approved
    } else {
        ReviewStatus::NeedsReview
    };

    ImportResult {
        success,
        data: batch.data,
        errors: batch.errors,
        warnings: batch.warnings,
        stats: batch.stats,
        mapping: Some(mapping),
        review_status,
        duplicates_collapsed: batch.duplicates_collapsed,
    }
}
