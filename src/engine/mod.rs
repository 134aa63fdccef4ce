// ==========================================
// BOQ 导入引擎 - 任务层
// ==========================================
// 职责: 进度跟踪、后台导入任务调度与取消
// 红线: 不含解析/校验逻辑,只调用 BoqImporter
// ==========================================

pub mod job_manager;
pub mod progress;

// 重导出核心类型
pub use job_manager::{JobHandle, JobManager};
pub use progress::{new_cancel_flag, CancelFlag, ProgressSink, ProgressTracker};
