//! Web界面和API模块
//!
//! 提供站点管理页面、AJAX接口以及检测完成事件流

use crate::health::SweepScheduler;
use crate::registry::SiteRegistry;
use std::sync::Arc;

pub mod handlers;
pub mod server;

pub use server::{build_router, WebServer};

/// Web服务器共享状态
#[derive(Clone)]
pub struct AppState {
    /// 站点注册表
    pub registry: Arc<SiteRegistry>,
    /// 检测调度器，按需检测也通过它执行并广播
    pub scheduler: Arc<SweepScheduler>,
    /// 是否开启 `/sse`
    pub sse_enabled: bool,
}

impl AppState {
    /// 创建新的Web服务器状态
    pub fn new(scheduler: Arc<SweepScheduler>, sse_enabled: bool) -> Self {
        Self {
            registry: Arc::clone(scheduler.engine().registry()),
            scheduler,
            sse_enabled,
        }
    }
}
