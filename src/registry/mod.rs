//! 站点注册表模块
//!
//! 提供受监控站点的数据结构、URL校验以及并发安全的存储

pub mod site;
pub mod store;

// 重新导出主要类型
pub use site::{validate_site_url, Site, SiteId, SiteStatus, SiteSummary};
pub use store::SiteRegistry;
