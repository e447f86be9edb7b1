//! 站点注册表实现
//!
//! 持有全部站点记录，写操作互斥、读操作共享。URL校验在加锁之前完成，
//! 临界区内只做内存中的映射和计数器操作。

use crate::error::RegistryError;
use crate::registry::site::{validate_site_url, Site, SiteId, SiteStatus, SiteSummary};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 注册表内部状态
#[derive(Debug, Default)]
struct RegistryState {
    /// 按ID排序的站点
    sites: BTreeMap<SiteId, Site>,
    /// URL到ID的索引，用于去重
    by_url: HashMap<String, SiteId>,
    /// 最后分配的ID，只增不减
    last_id: SiteId,
}

/// 并发安全的站点注册表
#[derive(Debug, Default)]
pub struct SiteRegistry {
    state: RwLock<RegistryState>,
}

impl SiteRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加站点
    ///
    /// URL 与已有站点完全相同时不会创建新记录，也不返回错误，
    /// 而是返回已有站点的ID。
    ///
    /// # 参数
    /// * `url` - 站点URL
    ///
    /// # 返回
    /// * `Result<SiteId, RegistryError>` - 站点ID或校验错误
    pub async fn add(&self, url: &str) -> Result<SiteId, RegistryError> {
        validate_site_url(url)?;

        let mut state = self.state.write().await;

        if let Some(&existing) = state.by_url.get(url) {
            debug!("站点已存在，忽略重复添加: {} (id={})", url, existing);
            return Ok(existing);
        }

        state.last_id += 1;
        let id = state.last_id;
        state.sites.insert(id, Site::new(id, url.to_string()));
        state.by_url.insert(url.to_string(), id);
        drop(state);

        info!("添加站点: {} (id={})", url, id);
        Ok(id)
    }

    /// 按ID升序列出全部站点
    pub async fn list(&self) -> Vec<Site> {
        let state = self.state.read().await;
        state.sites.values().cloned().collect()
    }

    /// 列出需要探测的站点
    ///
    /// 未探测过的站点，或最后探测时间早于 `now - lookback` 的站点。
    /// `lookback` 为零时等同于 [`list`](Self::list)。
    pub async fn list_due(&self, lookback: Duration) -> Vec<Site> {
        self.list_due_at(lookback, Utc::now()).await
    }

    /// 以指定时刻为基准列出需要探测的站点
    pub async fn list_due_at(&self, lookback: Duration, now: DateTime<Utc>) -> Vec<Site> {
        if lookback.is_zero() {
            return self.list().await;
        }

        let threshold = TimeDelta::from_std(lookback)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let state = self.state.read().await;
        state
            .sites
            .values()
            .filter(|site| site.is_due(threshold))
            .cloned()
            .collect()
    }

    /// 获取单个站点
    pub async fn get(&self, id: SiteId) -> Option<Site> {
        let state = self.state.read().await;
        state.sites.get(&id).cloned()
    }

    /// 更新站点健康状态，同时刷新最后探测时间
    ///
    /// # 参数
    /// * `id` - 站点ID
    /// * `status` - 新状态
    ///
    /// # 返回
    /// * `Result<(), RegistryError>` - 站点不存在时返回 `NotFound`
    pub async fn update_status(&self, id: SiteId, status: SiteStatus) -> Result<(), RegistryError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let site = state
            .sites
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { id })?;
        site.record(status, now);
        Ok(())
    }

    /// 删除站点，已删除的ID不会再被分配
    pub async fn delete(&self, id: SiteId) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let site = state
            .sites
            .remove(&id)
            .ok_or(RegistryError::NotFound { id })?;
        state.by_url.remove(site.url());
        drop(state);

        info!("删除站点: {} (id={})", site.url(), id);
        Ok(())
    }

    /// 站点数量
    pub async fn len(&self) -> usize {
        self.state.read().await.sites.len()
    }

    /// 是否为空
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sites.is_empty()
    }

    /// 当前状态统计
    pub async fn summary(&self) -> SiteSummary {
        SiteSummary::from_sites(&self.list().await)
    }
}
