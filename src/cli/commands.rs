//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{default_config_template, Config, ConfigLoader, TomlConfigLoader};
use crate::error::{Result, SiteVitalsError};
use crate::health::{HealthCheckEngine, HttpProber, SweepReport, SweepScheduler, SweepSettings};
use crate::logging::LoggingSystem;
use crate::notification::Notifier;
use crate::registry::{Site, SiteRegistry};
use crate::web::{AppState, WebServer};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 关闭时等待后台任务退出的最长时间
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, default_config_template()).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加需要监控的站点");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        let invalid: Vec<&String> = config
            .sites
            .iter()
            .filter(|url| crate::registry::validate_site_url(url).is_err())
            .collect();

        println!("✓ 配置文件验证通过");
        println!("  监听地址: {}", config.server.bind_address());
        println!("  检测间隔: {}秒", config.checker.check_interval_seconds);
        println!("  请求超时: {}ms", config.checker.request_timeout_ms);
        println!("✓ 找到 {} 个站点", config.sites.len());
        for url in invalid {
            println!("⚠ 无效站点将在启动时被跳过: {}", url);
        }

        Ok(())
    }
}

/// 一次性检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Check {
            urls,
            serial,
            format,
            timeout_ms,
            max_concurrent,
        } = &args.command
        else {
            return Ok(());
        };

        let config = TomlConfigLoader::default()
            .load_or_default(args.get_config_path())
            .await?;

        let mut settings = SweepSettings::from(&config.checker);
        if let Some(timeout_ms) = timeout_ms {
            settings.timeout = Duration::from_millis(*timeout_ms);
        }
        if let Some(limit) = max_concurrent {
            settings.concurrency_limit = *limit;
        }

        let (report, sites, rejected) = self.perform_check(urls, *serial, &settings).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "sites": sites,
                    "rejected": rejected
                        .iter()
                        .map(|(url, reason)| serde_json::json!({"url": url, "error": reason}))
                        .collect::<Vec<_>>(),
                    "report": report,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => self.print_text_results(&sites, &rejected, &report),
        }

        let failures = report.unhealthy + rejected.len();
        if failures > 0 {
            return Err(SiteVitalsError::Other(anyhow::anyhow!(
                "{} 个站点检测未通过",
                failures
            )));
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 注册URL并执行一轮检测
    ///
    /// # 返回
    /// * `(SweepReport, Vec<Site>, Vec<(String, String)>)` - 汇总、检测后的站点、被拒绝的URL及原因
    pub async fn perform_check(
        &self,
        urls: &[String],
        serial: bool,
        settings: &SweepSettings,
    ) -> Result<(SweepReport, Vec<Site>, Vec<(String, String)>)> {
        let registry = Arc::new(SiteRegistry::new());
        let mut rejected = Vec::new();
        for url in urls {
            if let Err(e) = registry.add(url.trim()).await {
                rejected.push((url.clone(), e.to_string()));
            }
        }

        let engine = HealthCheckEngine::new(Arc::clone(&registry), Arc::new(HttpProber::new()?));
        let sites = registry.list().await;

        let report = if serial {
            engine.run_sweep_serial(sites, settings.timeout).await
        } else {
            engine
                .run_sweep(sites, settings.timeout, settings.concurrency_limit)
                .await
        };

        Ok((report, registry.list().await, rejected))
    }

    /// 打印文本格式结果
    fn print_text_results(&self, sites: &[Site], rejected: &[(String, String)], report: &SweepReport) {
        for site in sites {
            let status_icon = if site.status().is_healthy() { "✓" } else { "✗" };
            println!("{} {} - {}", status_icon, site.url(), site.status());
        }
        for (url, reason) in rejected {
            println!("✗ {} - {}", url, reason);
        }
        println!(
            "共 {} 个站点: 正常 {}, 异常 {}, 耗时 {}ms",
            report.checked + rejected.len(),
            report.healthy,
            report.unhealthy + rejected.len(),
            report.elapsed_ms
        );
    }
}

/// 服务命令
///
/// 启动Web服务和周期检测，直到关闭信号触发。
pub struct ServeCommand {
    /// 关闭信号发送端
    shutdown_tx: broadcast::Sender<()>,
}

impl ServeCommand {
    /// 创建服务命令
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// 合并命令行参数到配置
    pub fn apply_cli_overrides(config: &mut Config, command: &Commands) {
        if let Commands::Serve {
            host,
            sse,
            interval,
            lookback,
            max_concurrent,
        } = command
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if *sse {
                config.server.sse = true;
            }
            if let Some(interval) = interval {
                config.checker.check_interval_seconds = *interval;
            }
            if let Some(lookback) = lookback {
                config.checker.lookback_seconds = *lookback;
            }
            if max_concurrent.is_some() {
                config.checker.max_concurrent_checks = *max_concurrent;
            }
        }
    }

    /// 将配置中的站点写入注册表，无效的记录日志后跳过
    ///
    /// # 返回
    /// * `usize` - 新增的站点数，重复的URL不计入
    pub async fn seed_sites(registry: &SiteRegistry, sites: &[String]) -> usize {
        let before = registry.len().await;
        for url in sites {
            if let Err(e) = registry.add(url.trim()).await {
                warn!("跳过无效站点 {:?}: {}", url, e);
            }
        }
        registry.len().await.saturating_sub(before)
    }
}

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let loader = TomlConfigLoader::default();
        let mut config = loader.load_or_default(args.get_config_path()).await?;
        Self::apply_cli_overrides(&mut config, &args.command);
        loader.validate(&config)?;

        let registry = Arc::new(SiteRegistry::new());
        let seeded = Self::seed_sites(&registry, &config.sites).await;
        info!("已加载 {} 个站点", seeded);

        let settings = SweepSettings::from(&config.checker);
        info!(
            "检测间隔: {:?}, 回看窗口: {:?}, 超时: {:?}, 并发上限: {}",
            settings.interval, settings.lookback, settings.timeout, settings.concurrency_limit
        );

        let engine = Arc::new(HealthCheckEngine::new(
            Arc::clone(&registry),
            Arc::new(HttpProber::new()?),
        ));
        let notifier = Arc::new(Notifier::new(config.notifier.subscriber_capacity));
        let scheduler = Arc::new(SweepScheduler::new(engine, notifier, settings));

        let server = WebServer::new(
            AppState::new(Arc::clone(&scheduler), config.server.sse),
            config.server.bind_address(),
        );
        let listener = server.bind().await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let scheduler_handle = Arc::clone(&scheduler).spawn(self.shutdown_tx.subscribe());
        let mut server_handle = tokio::spawn(server.run(listener, self.shutdown_tx.subscribe()));

        tokio::select! {
            _ = shutdown_rx.recv() => {}
            joined = &mut server_handle => {
                // Web服务器提前退出时同样停止调度器
                let _ = self.shutdown_tx.send(());
                if let Err(e) = scheduler_handle.await {
                    error!("检测调度器异常退出: {}", e);
                }
                return match joined {
                    Ok(result) => result,
                    Err(e) => Err(SiteVitalsError::Other(anyhow::anyhow!("Web服务器任务异常退出: {}", e))),
                };
            }
        }
        info!("正在停止服务，最多等待 {:?}", SHUTDOWN_GRACE);

        let wait_all = async {
            if let Err(e) = scheduler_handle.await {
                error!("检测调度器异常退出: {}", e);
            }
            match server_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Web服务器运行失败: {}", e),
                Err(e) => error!("Web服务器任务异常退出: {}", e),
            }
        };

        if tokio::time::timeout(SHUTDOWN_GRACE, wait_all).await.is_err() {
            warn!("等待超时，强制退出");
        }

        for site in registry.list().await {
            LoggingSystem::site_status_log(&site);
        }
        info!("服务已停止");
        Ok(())
    }
}
