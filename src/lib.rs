//! Site Vitals - 站点健康监控工具
//!
//! 这是一个用Rust编写的站点健康监控工具，支持：
//! - 并发安全的站点注册表
//! - 有界并行的HTTP健康检测
//! - 检测完成事件的实时推送（SSE）
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod registry;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use error::{RegistryError, SiteVitalsError, UrlError};
pub use health::{HealthCheckEngine, HttpProber, ProbeOutcome, Prober, SweepReport};
pub use notification::{Notifier, SweepEvent};
pub use registry::{Site, SiteId, SiteRegistry, SiteStatus};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
