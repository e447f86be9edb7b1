//! 健康检测模块
//!
//! 提供单站点探测、有界并行的批量检测以及周期调度功能

pub mod engine;
pub mod prober;
pub mod scheduler;

// 重新导出主要类型
pub use engine::{default_concurrency, HealthCheckEngine, SweepReport};
pub use prober::{describe_probe_error, HttpProber, ProbeOutcome, Prober};
pub use scheduler::{SweepScheduler, SweepSettings};
