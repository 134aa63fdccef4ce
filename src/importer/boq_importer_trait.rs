// ==========================================
// BOQ 导入引擎 - 导入接口 Trait
// ==========================================
// 职责: 定义导入管道各阶段接口（不包含实现）
// 阶段: 解析 → 列映射 → 行处理 + 行级校验 → 一致性校验
// ==========================================

use crate::config::ImportConfig;
use crate::domain::boq::ParsedBoqItem;
use crate::domain::import::ImportResult;
use crate::domain::issue::{ImportIssue, RowIssues};
use crate::domain::mapping::DetectedMapping;
use crate::engine::progress::{CancelFlag, ProgressSink};
use crate::importer::error::EngineResult;
use crate::importer::file_parser::{ReadOptions, SheetData};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

// ==========================================
// BoqImporter Trait
// ==========================================
// 用途: 清单导入主接口
// 实现者: BoqImporterImpl
#[async_trait]
pub trait BoqImporter: Send + Sync {
    /// 导入内存中的文件内容
    ///
    /// # 参数
    /// - file_name: 文件名（按扩展名选择解析器）
    /// - bytes: 文件内容
    /// - config: 导入配置（进度通道取自 `config.progress`）
    ///
    /// # 返回
    /// - Ok(ImportResult): 导入结果; 文件不可读/为空时 success=false 且含一个 system 错误
    /// - Err: 配置非法、任务被取消
    async fn import_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
    ) -> EngineResult<ImportResult>;

    /// 带外部进度接收端与取消标志的导入（任务管理器使用）
    async fn import_with(
        &self,
        file_name: &str,
        bytes: &[u8],
        config: &ImportConfig,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: CancelFlag,
    ) -> EngineResult<ImportResult>;

    /// 从磁盘文件导入
    async fn import_file<P: AsRef<Path> + Send>(
        &self,
        file_path: P,
        config: &ImportConfig,
    ) -> EngineResult<ImportResult>;

    /// 批量导入多个文件（并发执行）
    ///
    /// # 说明
    /// - 每个文件的导入是独立的，互不影响
    /// - 返回顺序与输入顺序一致
    async fn batch_import(
        &self,
        files: Vec<(String, Vec<u8>)>,
        config: &ImportConfig,
    ) -> Vec<EngineResult<ImportResult>>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析接口（阶段 0）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 解析文件内容为表头 + 原始行
    fn parse(&self, file_name: &str, bytes: &[u8], options: &ReadOptions) -> EngineResult<SheetData>;
}

// ==========================================
// ColumnMapper Trait
// ==========================================
// 用途: 列映射接口（阶段 1）
// 实现者: AliasColumnMapper
pub trait ColumnMapper: Send + Sync {
    /// 检测 字段 → 表头 映射（确定性、幂等）
    fn detect(&self, headers: &[String]) -> DetectedMapping;

    /// 必填字段完整性检查
    ///
    /// # 返回
    /// - Some(ImportIssue): 一个 mapping 警告（row 0）,details 含 missing / suggestions
    /// - None: 必填字段均已映射
    fn check_completeness(&self, mapping: &DetectedMapping, headers: &[String]) -> Option<ImportIssue>;
}

// ==========================================
// RowValidator Trait
// ==========================================
// 用途: 单行记录校验（模式层 / 业务层）
// 实现者: SchemaValidator, BusinessValidator
pub trait RowValidator: Send + Sync {
    /// 校验层名称（日志用）
    fn name(&self) -> &'static str;

    /// 校验单条记录,问题写入 issues
    fn validate(&self, item: &ParsedBoqItem, issues: &mut RowIssues);
}

// ==========================================
// ConsistencyChecker Trait
// ==========================================
// 用途: 全数据集一致性校验（在全部行处理完成后执行一次）
// 实现者: ConsistencyValidator
pub trait ConsistencyChecker: Send + Sync {
    /// 按行号顺序检查记录集
    fn check(&self, items: &[ParsedBoqItem]) -> ConsistencyReport;
}

/// 一致性校验结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsistencyReport {
    pub issues: RowIssues,
    pub rejected_rows: BTreeSet<usize>, // 需要从结果中剔除的行号
}
