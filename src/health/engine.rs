//! 健康检测引擎
//!
//! 对一组站点执行一轮探测（sweep），并把结果写回站点注册表。
//! 并行版本通过信号量限制同时进行的探测数量，所有探测及其写回完成后才返回。

use crate::health::prober::{ProbeOutcome, Prober};
use crate::registry::{Site, SiteRegistry, SiteStatus};
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 默认并发上限：可用的硬件并行度
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// 单个站点的检测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteCheck {
    /// 状态已写回
    Recorded(SiteStatus),
    /// 探测期间站点已被删除
    Vanished,
}

/// 一轮检测的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 已写回状态的站点数
    pub checked: usize,
    /// 健康站点数
    pub healthy: usize,
    /// 异常站点数
    pub unhealthy: usize,
    /// 探测期间被删除的站点数
    pub vanished: usize,
    /// 异常退出的探测任务数
    pub aborted: usize,
    /// 耗时（毫秒）
    pub elapsed_ms: u64,
}

impl SweepReport {
    fn record(&mut self, check: SiteCheck) {
        match check {
            SiteCheck::Recorded(status) => {
                self.checked += 1;
                if status.is_healthy() {
                    self.healthy += 1;
                } else {
                    self.unhealthy += 1;
                }
            }
            SiteCheck::Vanished => self.vanished += 1,
        }
    }

    fn finish(mut self, started: Instant) -> Self {
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }
}

/// 健康检测引擎
pub struct HealthCheckEngine {
    /// 站点注册表
    registry: Arc<SiteRegistry>,
    /// 探测器
    prober: Arc<dyn Prober>,
}

impl HealthCheckEngine {
    /// 创建新的检测引擎
    ///
    /// # 参数
    /// * `registry` - 站点注册表，探测结果会写回其中
    /// * `prober` - 探测策略
    pub fn new(registry: Arc<SiteRegistry>, prober: Arc<dyn Prober>) -> Self {
        Self { registry, prober }
    }

    /// 站点注册表
    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    /// 并行执行一轮检测
    ///
    /// 每个站点恰好探测一次，不重试。同时进行的探测不超过 `concurrency_limit`
    /// （为 0 时按 1 处理）。函数在所有探测和写回完成后才返回，站点之间的完成顺序不做保证。
    ///
    /// # 参数
    /// * `sites` - 待检测站点（通常来自 `list_due`）
    /// * `timeout` - 单次探测超时时间
    /// * `concurrency_limit` - 最大并发探测数
    ///
    /// # 返回
    /// * `SweepReport` - 本轮汇总
    pub async fn run_sweep(
        &self,
        sites: Vec<Site>,
        timeout: Duration,
        concurrency_limit: usize,
    ) -> SweepReport {
        let started = Instant::now();
        let limit = concurrency_limit.max(1);
        info!("开始健康检测，站点数量: {}, 并发上限: {}", sites.len(), limit);

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for site in sites {
            let semaphore = Arc::clone(&semaphore);
            let prober = Arc::clone(&self.prober);
            let registry = Arc::clone(&self.registry);

            tasks.spawn(async move {
                // 信号量不会被关闭，许可在任务结束时释放
                let _permit = semaphore.acquire_owned().await;
                check_site(prober.as_ref(), &registry, site, timeout).await
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(check) => report.record(check),
                Err(e) => {
                    error!("探测任务异常退出: {}", e);
                    report.aborted += 1;
                }
            }
        }

        let report = report.finish(started);
        info!(
            "健康检测完成: 已检测 {}, 正常 {}, 异常 {}, 耗时 {}ms",
            report.checked, report.healthy, report.unhealthy, report.elapsed_ms
        );
        report
    }

    /// 串行执行一轮检测
    ///
    /// 逐个探测，适合站点较少或排查问题时使用。给定相同的探测结果，
    /// 最终的注册表状态与并行版本一致。
    pub async fn run_sweep_serial(&self, sites: Vec<Site>, timeout: Duration) -> SweepReport {
        let started = Instant::now();
        info!("开始串行健康检测，站点数量: {}", sites.len());

        let mut report = SweepReport::default();
        for site in sites {
            let check = check_site(self.prober.as_ref(), &self.registry, site, timeout).await;
            report.record(check);
        }

        let report = report.finish(started);
        info!(
            "串行健康检测完成: 已检测 {}, 正常 {}, 异常 {}, 耗时 {}ms",
            report.checked, report.healthy, report.unhealthy, report.elapsed_ms
        );
        report
    }

    /// 检测所有到期站点
    ///
    /// # 参数
    /// * `lookback` - 回看窗口，为零时检测全部站点
    /// * `timeout` - 单次探测超时时间
    /// * `concurrency_limit` - 最大并发探测数
    pub async fn sweep_due(
        &self,
        lookback: Duration,
        timeout: Duration,
        concurrency_limit: usize,
    ) -> SweepReport {
        let sites = self.registry.list_due(lookback).await;
        self.run_sweep(sites, timeout, concurrency_limit).await
    }
}

/// 探测单个站点并写回状态
async fn check_site(
    prober: &dyn Prober,
    registry: &SiteRegistry,
    site: Site,
    timeout: Duration,
) -> SiteCheck {
    debug!("开始探测站点: {}", site.url());
    let outcome = prober.probe(site.url(), timeout).await;

    match &outcome {
        ProbeOutcome::Healthy => debug!("站点探测正常: {}", site.url()),
        ProbeOutcome::Unhealthy { reason } => warn!("站点探测失败: {}, {}", site.url(), reason),
    }

    let status = outcome.status();
    match registry.update_status(site.id(), status).await {
        Ok(()) => SiteCheck::Recorded(status),
        Err(e) => {
            warn!("写回探测结果失败: {} - {}", site.url(), e);
            SiteCheck::Vanished
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按URL返回预设结果，并记录并发峰值
    #[derive(Default)]
    struct ScriptedProber {
        outcomes: HashMap<String, ProbeOutcome>,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedProber {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn outcome(mut self, url: &str, outcome: ProbeOutcome) -> Self {
            self.outcomes.insert(url.to_string(), outcome);
            self
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.outcomes
                .get(url)
                .cloned()
                .unwrap_or(ProbeOutcome::Healthy)
        }
    }

    async fn registry_with(urls: &[String]) -> Arc<SiteRegistry> {
        let registry = Arc::new(SiteRegistry::new());
        for url in urls {
            registry.add(url).await.unwrap();
        }
        registry
    }

    fn urls(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://site-{i}.example.com"))
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_sweep_bounds_concurrency() {
        let urls = urls(20);
        let registry = registry_with(&urls).await;
        let prober = Arc::new(ScriptedProber::with_delay(Duration::from_millis(20)));
        let engine = HealthCheckEngine::new(Arc::clone(&registry), prober.clone());

        let sites = registry.list().await;
        let started = Instant::now();
        let report = engine.run_sweep(sites, Duration::from_secs(1), 3).await;
        let elapsed = started.elapsed();

        assert_eq!(report.checked, 20);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 20);
        // 20 个站点、每次 20ms，3 个许可一定会被占满
        assert_eq!(prober.peak.load(Ordering::SeqCst), 3);
        // 串行至少需要 400ms
        assert!(elapsed < Duration::from_millis(300), "耗时: {elapsed:?}");
        assert!(registry
            .list()
            .await
            .iter()
            .all(|site| site.status() == SiteStatus::Healthy));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_concurrency_limit_still_completes() {
        let urls = urls(4);
        let registry = registry_with(&urls).await;
        let prober = Arc::new(ScriptedProber::default());
        let engine = HealthCheckEngine::new(Arc::clone(&registry), prober.clone());

        let report = engine
            .run_sweep(registry.list().await, Duration::from_secs(1), 0)
            .await;

        assert_eq!(report.checked, 4);
        assert_eq!(prober.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_sweep() {
        let registry = Arc::new(SiteRegistry::new());
        let engine = HealthCheckEngine::new(registry, Arc::new(ScriptedProber::default()));

        let report = engine.run_sweep(Vec::new(), Duration::from_secs(1), 4).await;
        assert_eq!(report.checked, 0);
        assert_eq!(report.vanished, 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_sites() {
        let urls = urls(3);
        let registry = registry_with(&urls).await;
        let prober = ScriptedProber::default()
            .outcome(&urls[0], ProbeOutcome::unhealthy("Connection refused"));
        let engine = HealthCheckEngine::new(Arc::clone(&registry), Arc::new(prober));

        let report = engine
            .run_sweep(registry.list().await, Duration::from_secs(1), 2)
            .await;

        assert_eq!(report.healthy, 2);
        assert_eq!(report.unhealthy, 1);
        let statuses: Vec<SiteStatus> = registry.list().await.iter().map(Site::status).collect();
        assert_eq!(
            statuses,
            vec![
                SiteStatus::Unhealthy,
                SiteStatus::Healthy,
                SiteStatus::Healthy
            ]
        );
    }

    #[tokio::test]
    async fn test_deleted_site_is_counted_as_vanished() {
        let urls = urls(2);
        let registry = registry_with(&urls).await;
        let engine = HealthCheckEngine::new(
            Arc::clone(&registry),
            Arc::new(ScriptedProber::default()),
        );

        let sites = registry.list().await;
        registry.delete(sites[0].id()).await.unwrap();

        let report = engine.run_sweep(sites, Duration::from_secs(1), 2).await;
        assert_eq!(report.checked, 1);
        assert_eq!(report.vanished, 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_serial_matches_parallel() {
        let urls = urls(5);
        let script = |prober: ScriptedProber| {
            prober
                .outcome(&urls[1], ProbeOutcome::unhealthy("Request timeout"))
                .outcome(&urls[3], ProbeOutcome::unhealthy("HTTP 500 Internal Server Error"))
        };

        let parallel_registry = registry_with(&urls).await;
        let parallel = HealthCheckEngine::new(
            Arc::clone(&parallel_registry),
            Arc::new(script(ScriptedProber::default())),
        );
        parallel
            .run_sweep(parallel_registry.list().await, Duration::from_secs(1), 4)
            .await;

        let serial_registry = registry_with(&urls).await;
        let serial = HealthCheckEngine::new(
            Arc::clone(&serial_registry),
            Arc::new(script(ScriptedProber::default())),
        );
        let report = serial
            .run_sweep_serial(serial_registry.list().await, Duration::from_secs(1))
            .await;

        assert_eq!(report.unhealthy, 2);
        let parallel_statuses: Vec<SiteStatus> = parallel_registry
            .list()
            .await
            .iter()
            .map(Site::status)
            .collect();
        let serial_statuses: Vec<SiteStatus> = serial_registry
            .list()
            .await
            .iter()
            .map(Site::status)
            .collect();
        assert_eq!(parallel_statuses, serial_statuses);
    }

    #[tokio::test]
    async fn test_sweep_due_skips_recent_sites() {
        let urls = urls(2);
        let registry = registry_with(&urls).await;
        registry.update_status(1, SiteStatus::Healthy).await.unwrap();

        let prober = Arc::new(ScriptedProber::default());
        let engine = HealthCheckEngine::new(Arc::clone(&registry), prober.clone());

        let report = engine
            .sweep_due(Duration::from_secs(60), Duration::from_secs(1), 2)
            .await;

        assert_eq!(report.checked, 1);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_concurrency_is_positive() {
        assert!(default_concurrency() >= 1);
    }
}
