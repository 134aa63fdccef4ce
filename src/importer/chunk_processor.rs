// ==========================================
// BOQ 导入引擎 - 分块处理器
// ==========================================
// 职责: 行处理 + 行级校验 + 汇总（一致性 / 重复处理 / 统计）
// 红线: 单次处理与分块处理结果完全一致（同一行例程、同一汇总步骤）
//       取消只在块之间检查
// ==========================================

use crate::config::{DuplicateHandling, ImportConfig, RuleThresholds};
use crate::domain::boq::{ParsedBoqItem, RawRow};
use crate::domain::import::{ImportPhase, ImportSummary};
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::domain::mapping::DetectedMapping;
use crate::engine::progress::{is_cancelled, CancelFlag, ProgressTracker};
use crate::importer::boq_importer_trait::{ConsistencyChecker, RowValidator};
use crate::importer::business_validator::BusinessValidator;
use crate::importer::consistency_validator::ConsistencyValidator;
use crate::importer::error::{EngineError, EngineResult};
use crate::importer::row_processor::RowProcessor;
use crate::importer::schema_validator::SchemaValidator;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// 处理完成后的数据集
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedBatch {
    pub data: Vec<ParsedBoqItem>,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
    pub stats: ImportSummary,
    pub duplicates_collapsed: usize,
}

/// 处理过程中的累加器
#[derive(Debug, Default)]
struct Accumulator {
    data: Vec<ParsedBoqItem>,
    issues: RowIssues,
    processed: usize,
}

pub struct ChunkProcessor {
    row_processor: RowProcessor,
    validators: Vec<Box<dyn RowValidator>>, // 模式层 → 业务层
    consistency: Box<dyn ConsistencyChecker>,
    duplicate_handling: DuplicateHandling,
}

impl ChunkProcessor {
    pub fn new(config: &ImportConfig, thresholds: &RuleThresholds) -> Self {
        Self {
            row_processor: RowProcessor::new(config.strict_validation),
            validators: vec![
                Box::new(SchemaValidator::new(thresholds)),
                Box::new(BusinessValidator::new(
                    thresholds.clone(),
                    config.create_new_items,
                )),
            ],
            consistency: Box::new(ConsistencyValidator::new(thresholds)),
            duplicate_handling: config.duplicate_handling,
        }
    }

    /// 单次处理全部行
    ///
    /// # 参数
    /// - carried: 处理前已产生的问题（如映射警告）,原样并入结果
    pub async fn process_all(
        &self,
        rows: &[RawRow],
        mapping: &DetectedMapping,
        carried: RowIssues,
        tracker: &mut ProgressTracker,
        cancel: &CancelFlag,
    ) -> EngineResult<ProcessedBatch> {
        if is_cancelled(cancel) {
            return Err(EngineError::Cancelled);
        }

        let mut acc = Accumulator {
            issues: carried,
            ..Accumulator::default()
        };
        self.process_rows(rows, 0, mapping, &mut acc);
        self.report_progress(rows.len(), &acc, tracker).await;

        Ok(self.finalize(rows.len(), acc))
    }

    /// 分块处理（块之间让出执行权并检查取消）
    ///
    /// chunk_size 为 0 时按 1 处理
    pub async fn process_in_chunks(
        &self,
        rows: &[RawRow],
        mapping: &DetectedMapping,
        chunk_size: usize,
        carried: RowIssues,
        tracker: &mut ProgressTracker,
        cancel: &CancelFlag,
    ) -> EngineResult<ProcessedBatch> {
        let chunk_size = chunk_size.max(1);
        let mut acc = Accumulator {
            issues: carried,
            ..Accumulator::default()
        };

        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            if is_cancelled(cancel) {
                debug!(chunk_index, processed = acc.processed, "检测到取消标志，停止处理");
                return Err(EngineError::Cancelled);
            }

            let offset = chunk_index * chunk_size;
            self.process_rows(chunk, offset, mapping, &mut acc);
            debug!(
                chunk_index,
                rows = chunk.len(),
                processed = acc.processed,
                valid = acc.data.len(),
                "分块处理完成"
            );
            self.report_progress(rows.len(), &acc, tracker).await;

            tokio::task::yield_now().await;
        }

        if is_cancelled(cancel) {
            return Err(EngineError::Cancelled);
        }

        Ok(self.finalize(rows.len(), acc))
    }

    /// 行例程: 行处理 → 模式层 → 业务层; 无错误的记录进入数据集
    fn process_rows(
        &self,
        rows: &[RawRow],
        offset: usize,
        mapping: &DetectedMapping,
        acc: &mut Accumulator,
    ) {
        for (i, row) in rows.iter().enumerate() {
            let row_number = offset + i + 1;
            let outcome = self.row_processor.process_row(row, row_number, mapping);
            let mut issues = outcome.issues;

            if let Some(record) = outcome.record {
                for validator in &self.validators {
                    validator.validate(&record, &mut issues);
                }
                if !issues.has_errors() {
                    acc.data.push(record);
                }
            }

            acc.issues.extend(issues);
            acc.processed += 1;
        }
    }

    async fn report_progress(&self, total: usize, acc: &Accumulator, tracker: &mut ProgressTracker) {
        tracker.set_issues(&acc.issues.errors, &acc.issues.warnings);
        tracker
            .emit(
                ImportPhase::Processing,
                ProgressTracker::processing_percentage(acc.processed, total),
                acc.processed,
                format!("Processed {} of {} rows", acc.processed, total),
            )
            .await;
    }

    /// 汇总: 一致性校验 → 重复处理 → 统计（只计算一次）
    fn finalize(&self, total_rows: usize, mut acc: Accumulator) -> ProcessedBatch {
        let report = self.consistency.check(&acc.data);
        if !report.rejected_rows.is_empty() {
            acc.data
                .retain(|item| !report.rejected_rows.contains(&item.row_number));
        }
        acc.issues.extend(report.issues);

        let duplicates_collapsed =
            apply_duplicate_handling(self.duplicate_handling, &mut acc.data, &mut acc.issues);

        let stats = ImportSummary {
            total_rows,
            valid_rows: acc.data.len(),
            error_rows: distinct_rows(&acc.issues.errors),
            warning_rows: distinct_rows(&acc.issues.warnings),
        };

        ProcessedBatch {
            data: acc.data,
            errors: acc.issues.errors,
            warnings: acc.issues.warnings,
            stats,
            duplicates_collapsed,
        }
    }
}

/// 重复判定键: 物料编码; 无编码时用 描述 + 单位（忽略大小写）
fn duplicate_key(item: &ParsedBoqItem) -> String {
    match item.item_code.as_deref() {
        Some(code) => format!("code:{}", code.trim().to_lowercase()),
        None => format!(
            "desc:{}|{}",
            item.description.trim().to_lowercase(),
            item.uom.trim().to_lowercase()
        ),
    }
}

/// 按策略合并重复记录
///
/// # 返回
/// - 被合并（移除）的记录数
pub fn apply_duplicate_handling(
    handling: DuplicateHandling,
    data: &mut Vec<ParsedBoqItem>,
    issues: &mut RowIssues,
) -> usize {
    if handling == DuplicateHandling::Append {
        return 0;
    }

    let mut first_index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ParsedBoqItem> = Vec::with_capacity(data.len());
    let mut collapsed = 0;

    for item in data.drain(..) {
        let key = duplicate_key(&item);
        let Some(&index) = first_index.get(&key) else {
            first_index.insert(key, kept.len());
            kept.push(item);
            continue;
        };

        let first_row = kept[index].row_number;
        let message = match handling {
            DuplicateHandling::Skip => format!("Duplicate of row {} skipped", first_row),
            _ => format!("Duplicate of row {}; row {} updated with these values", first_row, first_row),
        };
        // 被剔除的行必须有错误记录
        issues.error(ImportIssue::duplicate_collapsed(
            item.row_number,
            first_row,
            handling.as_str(),
            message,
        ));

        if handling == DuplicateHandling::Update {
            let first = &kept[index];
            let merged = ParsedBoqItem {
                row_number: first.row_number,
                line_number: first.line_number,
                line_number_defaulted: first.line_number_defaulted,
                ..item
            };
            kept[index] = merged;
        }
        collapsed += 1;
    }

    *data = kept;
    collapsed
}

/// 含问题的不同数据行数（row 0 不计）
fn distinct_rows(issues: &[ImportIssue]) -> usize {
    issues
        .iter()
        .map(ImportIssue::row)
        .filter(|row| *row > 0)
        .collect::<BTreeSet<_>>()
        .len()
}
