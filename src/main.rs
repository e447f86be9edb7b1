//! Site Vitals 主程序入口
//!
//! 站点健康监控工具

use anyhow::{Context, Result};
use clap::Parser;
use site_vitals::cli::args::{Args, Commands};
use site_vitals::cli::commands::{CheckCommand, Command, InitCommand, ServeCommand, ValidateCommand};
use site_vitals::config::TomlConfigLoader;
use site_vitals::logging::{LogConfig, LoggingSystem};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = resolve_log_config(&args).await;
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Site Vitals v{} 启动", site_vitals::VERSION);

    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志配置：命令行参数优先，其次是配置文件
///
/// 配置文件有误时使用默认日志配置，具体错误由各子命令报告。
async fn resolve_log_config(args: &Args) -> LogConfig {
    let config = TomlConfigLoader::default()
        .load_or_default(args.get_config_path())
        .await
        .unwrap_or_default();
    args.log_config(&config)
}

/// 执行CLI命令
async fn execute_command(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Serve { .. } => {
            let (shutdown_tx, _) = broadcast::channel(1);
            spawn_signal_listener(shutdown_tx.clone());

            ServeCommand::new(shutdown_tx)
                .execute(args)
                .await
                .context("服务运行失败")
        }
        Commands::Check { .. } => CheckCommand.execute(args).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Init { .. } => InitCommand.execute(args).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Validate { .. } => ValidateCommand
            .execute(args)
            .await
            .map_err(|e| anyhow::anyhow!(e)),
    }
}

/// 监听 Ctrl+C 与 SIGTERM，触发后广播关闭信号
fn spawn_signal_listener(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                error!("监听中断信号失败: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    error!("监听SIGTERM失败: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("收到中断信号，正在停止服务..."),
            _ = terminate => info!("收到SIGTERM，正在停止服务..."),
        }

        let _ = shutdown_tx.send(());
    });
}
