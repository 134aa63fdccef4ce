// ==========================================
// BOQ 导入引擎 - 导入层
// ==========================================
// 职责: 表格文件 → 类型化清单记录 + 错误/警告
// 支持: CSV, Excel (.xlsx / .xls)
// 流程: 解析 → 列映射 → 行处理 → 模式/业务/一致性校验
// ==========================================

// 模块声明
pub mod boq_importer_impl;
pub mod boq_importer_trait;
pub mod business_validator;
pub mod chunk_processor;
pub mod column_mapper;
pub mod consistency_validator;
pub mod data_cleaner;
pub mod error;
pub mod file_parser;
pub mod row_processor;
pub mod schema_validator;

// 重导出核心类型
pub use boq_importer_impl::BoqImporterImpl;
pub use business_validator::BusinessValidator;
pub use chunk_processor::{ChunkProcessor, ProcessedBatch};
pub use column_mapper::{detect_mapping, score_header, AliasCatalog, AliasColumnMapper};
pub use consistency_validator::ConsistencyValidator;
pub use data_cleaner::DataCleaner;
pub use error::{EngineError, EngineResult};
pub use file_parser::{CsvParser, ExcelParser, ReadOptions, SheetData, UniversalFileParser};
pub use row_processor::{RowOutcome, RowProcessor};
pub use schema_validator::{FieldConstraint, SchemaValidator};

// 重导出 Trait 接口
pub use boq_importer_trait::{
    BoqImporter, ColumnMapper, ConsistencyChecker, ConsistencyReport, FileParser, RowValidator,
};
