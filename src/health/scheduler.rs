//! 检测调度器模块
//!
//! 按固定间隔执行“列出到期站点 → 并行检测 → 广播完成事件”，直到收到关闭信号。

use crate::config::CheckerConfig;
use crate::health::engine::{default_concurrency, HealthCheckEngine, SweepReport};
use crate::logging::LoggingSystem;
use crate::notification::{Notifier, PublishReport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSettings {
    /// 检测间隔
    pub interval: Duration,
    /// 回看窗口，为零时每轮检测全部站点
    pub lookback: Duration,
    /// 单次探测超时时间
    pub timeout: Duration,
    /// 最大并发探测数
    pub concurrency_limit: usize,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from(&CheckerConfig::default())
    }
}

impl From<&CheckerConfig> for SweepSettings {
    fn from(config: &CheckerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.check_interval_seconds),
            lookback: Duration::from_secs(config.lookback_seconds),
            timeout: Duration::from_millis(config.request_timeout_ms),
            concurrency_limit: config
                .max_concurrent_checks
                .unwrap_or_else(default_concurrency),
        }
    }
}

/// 周期检测调度器
///
/// 自身的检测轮次严格串行：上一轮结束（含广播）之前不会开始下一轮。
/// 错过的 tick 会顺延而不是补跑。
pub struct SweepScheduler {
    /// 检测引擎
    engine: Arc<HealthCheckEngine>,
    /// 事件广播器
    notifier: Arc<Notifier>,
    /// 调度参数
    settings: SweepSettings,
}

impl SweepScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `engine` - 检测引擎
    /// * `notifier` - 检测完成后广播事件的广播器
    /// * `settings` - 调度参数
    pub fn new(engine: Arc<HealthCheckEngine>, notifier: Arc<Notifier>, settings: SweepSettings) -> Self {
        Self {
            engine,
            notifier,
            settings,
        }
    }

    /// 调度参数
    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// 检测引擎
    pub fn engine(&self) -> &Arc<HealthCheckEngine> {
        &self.engine
    }

    /// 事件广播器
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// 立即执行一轮检测并广播完成事件
    ///
    /// # 返回
    /// * `(SweepReport, PublishReport)` - 检测汇总与投递统计
    pub async fn run_once(&self) -> (SweepReport, PublishReport) {
        let report = self
            .engine
            .sweep_due(
                self.settings.lookback,
                self.settings.timeout,
                self.settings.concurrency_limit,
            )
            .await;

        LoggingSystem::sweep_log(&report);

        let event = self.notifier.next_event(report.checked);
        let published = self.notifier.publish(event);
        (report, published)
    }

    /// 运行调度循环，直到收到关闭信号
    ///
    /// 首轮检测在启动一个间隔之后进行。
    ///
    /// # 参数
    /// * `shutdown` - 关闭信号接收器
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.settings.interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("检测调度器已启动，间隔: {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("调度器触发检测");
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("检测调度器收到关闭信号");
                    break;
                }
            }
        }

        info!("检测调度器已停止");
    }

    /// 在后台任务中运行调度循环
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
