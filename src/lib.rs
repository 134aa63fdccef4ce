// ==========================================
// BOQ 导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + tokio + calamine/csv
// 系统定位: 工程量清单表格导入（解析、映射、分层校验、后台任务）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录、问题、任务模型
pub mod domain;

// 导入层 - 解析与校验管道
pub mod importer;

// 任务层 - 进度与任务管理
pub mod engine;

// 配置层 - 导入配置与规则阈值
pub mod config;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    BoqField, CellValue, DetectedMapping, ImportIssue, ImportJob, ImportPhase, ImportProgress,
    ImportResult, ImportStats, ImportSummary, IssueKind, JobStatus, ParsedBoqItem, RawRow,
    ReviewStatus,
};

// 导入器
pub use importer::{BoqImporter, BoqImporterImpl, EngineError, EngineResult};

// 任务管理
pub use engine::{JobHandle, JobManager, ProgressSink};

// 配置
pub use config::{ConfigManager, DuplicateHandling, ImportConfig, RuleConfigReader, RuleThresholds};

// ==========================================
// 常量定义
// ==========================================

// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "BOQ Import Engine";
