// ==========================================
// BOQ 导入引擎 - 配置层
// ==========================================
// 职责: 单次导入配置 + 校验规则阈值（支持文件与环境变量覆写）
// ==========================================

pub mod config_manager;
pub mod import_config;
pub mod rule_config_trait;

// 重导出核心配置类型
pub use config_manager::{config_keys, ConfigManager};
pub use import_config::{DuplicateHandling, ImportConfig};
pub use rule_config_trait::{RuleConfigReader, RuleThresholds};
