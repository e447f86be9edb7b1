//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::Config;
use crate::logging::LogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Site Vitals - 站点健康监控工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "site-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SITE_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(short, long, value_enum, help = "日志级别", global = true)]
    pub log_level: Option<LogLevel>,

    /// 是否输出JSON格式日志
    #[arg(long, help = "输出JSON格式日志", env = "SITE_VITALS_JSON_LOGS", global = true)]
    pub json_logs: bool,

    /// 日志文件路径，同时保留控制台输出
    #[arg(long, value_name = "FILE", help = "日志文件路径", env = "SITE_VITALS_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// 追踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动Web服务和周期检测
    Serve {
        /// 监听地址
        #[arg(long, value_name = "ADDR", help = "监听地址，例如 0.0.0.0:8080")]
        host: Option<String>,

        /// 开启 /sse 事件流
        #[arg(long, help = "开启 /sse 事件流")]
        sse: bool,

        /// 检测间隔（秒）
        #[arg(short, long, value_name = "SECONDS", help = "检测间隔（秒）")]
        interval: Option<u64>,

        /// 回看窗口（秒）
        #[arg(long, value_name = "SECONDS", help = "回看窗口（秒）")]
        lookback: Option<u64>,

        /// 最大并发检测数
        #[arg(long, value_name = "COUNT", help = "最大并发检测数")]
        max_concurrent: Option<usize>,
    },

    /// 对给定URL执行一次性健康检测
    Check {
        /// 待检测的URL
        #[arg(value_name = "URL", required = true, help = "待检测的URL")]
        urls: Vec<String>,

        /// 逐个检测
        #[arg(long, help = "逐个检测，不并行")]
        serial: bool,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,

        /// 单次探测超时（毫秒）
        #[arg(short, long, value_name = "MILLIS", help = "单次探测超时（毫秒）")]
        timeout_ms: Option<u64>,

        /// 最大并发检测数
        #[arg(long, value_name = "COUNT", help = "最大并发检测数")]
        max_concurrent: Option<usize>,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = crate::config::DEFAULT_CONFIG_FILE
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 合并配置文件与命令行参数得到日志配置，命令行优先
    pub fn log_config(&self, config: &Config) -> LogConfig {
        let mut log_config = LogConfig::from_config(config);
        if let Some(level) = self.log_level {
            log_config.level = level.into();
        }
        if self.json_logs {
            log_config.json_format = true;
        }
        if let Some(path) = &self.log_file {
            log_config.file_path = Some(path.clone());
        }
        log_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_prefers_cli() {
        let mut config = Config::default();
        config.log_level = "warn".to_string();
        config
            .logging
            .modules
            .insert("hyper".to_string(), "error".to_string());

        let args = Args::try_parse_from(["site-vitals", "validate"]).unwrap();
        let log_config = args.log_config(&config);
        assert_eq!(log_config.level, log::LevelFilter::Warn);
        assert!(!log_config.json_format);
        assert_eq!(log_config.file_path, None);
        assert_eq!(log_config.module_levels["hyper"], log::LevelFilter::Error);

        let args = Args::try_parse_from([
            "site-vitals",
            "--log-level",
            "debug",
            "--json-logs",
            "--log-file",
            "out.log",
            "validate",
        ])
        .unwrap();
        let log_config = args.log_config(&config);
        assert_eq!(log_config.level, log::LevelFilter::Debug);
        assert!(log_config.json_format);
        assert_eq!(log_config.file_path, Some(PathBuf::from("out.log")));
        assert!(log_config.console);
    }

    #[test]
    fn test_parse_serve() {
        let args = Args::try_parse_from([
            "site-vitals",
            "serve",
            "--host",
            ":9000",
            "--sse",
            "--lookback",
            "15",
        ])
        .unwrap();

        match args.command {
            Commands::Serve {
                host, sse, lookback, ..
            } => {
                assert_eq!(host.as_deref(), Some(":9000"));
                assert!(sse);
                assert_eq!(lookback, Some(15));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_check() {
        let args = Args::try_parse_from([
            "site-vitals",
            "--log-level",
            "debug",
            "check",
            "https://google.com",
            "https://golang.org",
            "--serial",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.log_level, Some(LogLevel::Debug));
        match args.command {
            Commands::Check {
                urls,
                serial,
                format,
                ..
            } => {
                assert_eq!(urls.len(), 2);
                assert!(serial);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_check_requires_url() {
        assert!(Args::try_parse_from(["site-vitals", "check"]).is_err());
    }

    #[test]
    fn test_init_default_path() {
        let args = Args::try_parse_from(["site-vitals", "init"]).unwrap();
        match args.command {
            Commands::Init { config_path, force } => {
                assert_eq!(config_path, PathBuf::from("site-vitals.toml"));
                assert!(!force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(log::LevelFilter::from(LogLevel::Warn), log::LevelFilter::Warn);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
