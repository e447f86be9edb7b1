//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体、环境变量覆盖和验证逻辑

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 启动时写入注册表的站点
    #[serde(default)]
    pub sites: Vec<String>,
    /// Web 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 检测配置
    #[serde(default)]
    pub checker: CheckerConfig,
    /// 通知配置
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// 日志输出配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sites: Vec::new(),
            server: ServerConfig::default(),
            checker: CheckerConfig::default(),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Web 服务器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// 监听地址，`:8080` 形式等同于 `0.0.0.0:8080`
    #[serde(default = "default_host")]
    pub host: String,
    /// 是否开启 `/sse` 事件流
    #[serde(default)]
    pub sse: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            sse: false,
        }
    }
}

impl ServerConfig {
    /// 实际绑定的地址
    pub fn bind_address(&self) -> String {
        if self.host.starts_with(':') {
            format!("0.0.0.0{}", self.host)
        } else {
            self.host.clone()
        }
    }
}

/// 检测配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckerConfig {
    /// 检测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 单次探测超时时间（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 回看窗口（秒），在窗口内探测过的站点本轮跳过；0 表示每轮全部检测
    #[serde(default)]
    pub lookback_seconds: u64,
    /// 最大并发检测数，缺省时使用可用的硬件并行度
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_checks: Option<usize>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            request_timeout_ms: default_request_timeout_ms(),
            lookback_seconds: 0,
            max_concurrent_checks: None,
        }
    }
}

/// 通知配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifierConfig {
    /// 每个订阅者的事件队列容量
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

/// 日志输出配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// 日志文件路径，缺省时只输出到控制台
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// 是否输出到控制台
    #[serde(default = "default_true")]
    pub console: bool,
    /// 是否使用JSON格式
    #[serde(default)]
    pub json: bool,
    /// 按模块设置的日志级别，例如 `hyper = "warn"`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            console: true,
            json: false,
            modules: BTreeMap::new(),
        }
    }
}

// 默认值函数
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_check_interval() -> u64 {
    15
}
fn default_request_timeout_ms() -> u64 {
    800
}
fn default_subscriber_capacity() -> usize {
    crate::notification::DEFAULT_SUBSCRIBER_CAPACITY
}

impl Config {
    /// 使用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// 使用给定的查找函数覆盖配置
    ///
    /// 同时识别部署时沿用的 `HOST`、`LOOKBACK_PERIOD`、`SSE`，
    /// 以及带 `SITE_VITALS_` 前缀的变量；后者优先。值为空的变量视为未设置。
    /// 回看窗口不接受负数。
    ///
    /// # 参数
    /// * `lookup` - 变量名到值的查找函数
    ///
    /// # 返回
    /// * `Result<(), ConfigError>` - 变量值无法解析时返回 `EnvVarError`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |names: &[&str]| -> Option<(String, String)> {
            names
                .iter()
                .find_map(|name| {
                    lookup(name)
                        .filter(|value| !value.is_empty())
                        .map(|value| (name.to_string(), value))
                })
        };

        if let Some((_, host)) = pick(&["SITE_VITALS_HOST", "HOST"]) {
            if !host.trim().is_empty() {
                self.server.host = host.trim().to_string();
            }
        }

        if let Some((var, value)) = pick(&["SITE_VITALS_LOOKBACK_SECONDS", "LOOKBACK_PERIOD"]) {
            self.checker.lookback_seconds = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvVarError { var })?;
        }

        if let Some((var, value)) = pick(&["SITE_VITALS_SSE", "SSE"]) {
            self.server.sse = parse_flag(&value).ok_or(ConfigError::EnvVarError { var })?;
        }

        if let Some((var, value)) = pick(&["SITE_VITALS_CHECK_INTERVAL"]) {
            self.checker.check_interval_seconds = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::EnvVarError { var })?;
        }

        if let Some((_, level)) = pick(&["SITE_VITALS_LOG_LEVEL"]) {
            self.log_level = level.trim().to_lowercase();
        }

        Ok(())
    }
}

/// 解析布尔开关，取值范围与部署脚本保持一致
fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// 配置验证函数
///
/// 种子站点不在此处校验，启动时逐个写入注册表，无效的记录日志后跳过。
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    if config.checker.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if config.checker.request_timeout_ms == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if config.checker.max_concurrent_checks == Some(0) {
        return Err("最大并发检测数不能为0".to_string());
    }

    if config.notifier.subscriber_capacity == 0 {
        return Err("订阅队列容量不能为0".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.log_level, valid_log_levels
        ));
    }

    for (module, level) in &config.logging.modules {
        if module.trim().is_empty() {
            return Err("模块日志级别的模块名不能为空".to_string());
        }
        if !valid_log_levels.contains(&level.as_str()) && level != "off" {
            return Err(format!("模块 {} 的日志级别无效: {}", module, level));
        }
    }

    if !config.logging.console && config.logging.file.is_none() {
        return Err("关闭控制台日志时必须指定日志文件".to_string());
    }

    // 验证监听地址
    let bind_address = config.server.bind_address();
    let port = bind_address
        .rsplit_once(':')
        .and_then(|(host, port)| (!host.is_empty()).then_some(port))
        .and_then(|port| port.parse::<u16>().ok());
    if port.is_none() {
        return Err(format!(
            "无效的监听地址: {}，格式应为 host:port",
            config.server.host
        ));
    }

    Ok(())
}
