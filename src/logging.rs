//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能

use crate::config::Config;
use crate::health::SweepReport;
use crate::registry::Site;
use log::LevelFilter;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing_subscriber::filter::{Directive, LevelFilter as TracingLevel};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer, Registry};

/// 输出层挂载的 subscriber 类型
type FilteredRegistry = Layered<EnvFilter, Registry>;

/// 全局日志初始化状态
#[derive(Debug)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化结果
    init_result: Result<(), String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

impl Default for GlobalLoggingState {
    fn default() -> Self {
        Self {
            initialized: false,
            init_result: Ok(()),
            current_config: None,
        }
    }
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

fn global_state() -> MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 按级别名称创建配置，无法识别的名称回退到 `info`
    pub fn with_level(level: &str) -> Self {
        Self {
            level: LevelFilter::from_str(level).unwrap_or(LevelFilter::Info),
            ..Self::default()
        }
    }

    /// 从应用配置构建日志配置
    ///
    /// 无法识别的模块级别会被跳过，`validate_config` 已在加载时拦截这类配置。
    pub fn from_config(config: &Config) -> Self {
        let module_levels = config
            .logging
            .modules
            .iter()
            .filter_map(|(module, level)| {
                LevelFilter::from_str(level)
                    .ok()
                    .map(|level| (module.clone(), level))
            })
            .collect();

        Self {
            file_path: config.logging.file.clone(),
            console: config.logging.console,
            json_format: config.logging.json,
            module_levels,
            ..Self::with_level(&config.log_level)
        }
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    /// 配置
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只会真正初始化一次，后续调用直接返回。
    ///
    /// # 参数
    /// * `config` - 日志配置
    ///
    /// # 返回
    /// * `Result<LoggingSystem, anyhow::Error>` - 初始化结果
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否强制重新初始化（主要用于测试）
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        {
            let state = global_state();
            if state.initialized && !force_reinit {
                return match &state.init_result {
                    Ok(()) => Ok(Self { config }),
                    Err(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let init_result = Self::perform_initialization(&config);

        {
            let mut state = global_state();
            state.initialized = true;
            state.current_config = Some(config.clone());
            state.init_result = init_result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        }

        init_result?;
        Ok(Self { config })
    }

    /// 当前实例使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// 执行实际的日志系统初始化
    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config)?;
        Ok(())
    }

    /// 初始化 LogTracer（log crate 到 tracing 的桥接）
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(Self::convert_level_to_directive(config.level));

        // 模块级别过滤
        for (module, level) in &config.module_levels {
            match format!("{}={}", module, Self::level_to_string(*level)).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {}: {}", module, e),
            }
        }

        let mut layers: Vec<Box<dyn Layer<FilteredRegistry> + Send + Sync>> = Vec::new();

        if config.console {
            let console_layer = if config.json_format {
                fmt::layer()
                    .json()
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_file(true)
                    .with_line_number(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .boxed()
            };
            layers.push(console_layer);
        }

        if let Some(file_path) = &config.file_path {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|e| anyhow::anyhow!("打开日志文件失败 {}: {}", file_path.display(), e))?;
            let writer = Mutex::new(file);

            let file_layer = if config.json_format {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_file(true)
                    .with_line_number(true)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(writer)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed()
            };
            layers.push(file_layer);
        }

        let result = registry().with(env_filter).with(layers).try_init();

        match result {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) || error_msg.contains("a global default trace dispatcher has already been set")
                {
                    // 已有全局 subscriber（例如测试中重复初始化）
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!(
                        "tracing subscriber初始化失败: {}",
                        error_msg
                    ))
                }
            }
        }
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn convert_level_to_directive(level: LevelFilter) -> Directive {
        let level = match level {
            LevelFilter::Off => TracingLevel::OFF,
            LevelFilter::Error => TracingLevel::ERROR,
            LevelFilter::Warn => TracingLevel::WARN,
            LevelFilter::Info => TracingLevel::INFO,
            LevelFilter::Debug => TracingLevel::DEBUG,
            LevelFilter::Trace => TracingLevel::TRACE,
        };
        Directive::from(level)
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .map(|state| state.lock().unwrap_or_else(PoisonError::into_inner).initialized)
            .unwrap_or(false)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE.get().and_then(|state| {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_config
                .clone()
        })
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(state_mutex) = GLOBAL_LOGGING_STATE.get() {
            let mut state = state_mutex.lock().unwrap_or_else(PoisonError::into_inner);
            state.initialized = false;
            state.init_result = Ok(());
            state.current_config = None;
        }
    }

    /// 当前是否输出JSON格式日志
    fn json_enabled() -> bool {
        Self::current_config()
            .map(|config| config.json_format)
            .unwrap_or(false)
    }

    /// 构造一轮检测的结构化记录
    pub fn sweep_entry(report: &SweepReport) -> serde_json::Value {
        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "type": "sweep",
            "checked": report.checked,
            "healthy": report.healthy,
            "unhealthy": report.unhealthy,
            "vanished": report.vanished,
            "aborted": report.aborted,
            "elapsed_ms": report.elapsed_ms,
        })
    }

    /// 记录一轮检测的汇总日志
    pub fn sweep_log(report: &SweepReport) {
        if Self::json_enabled() {
            tracing::info!("{}", Self::sweep_entry(report));
        } else {
            tracing::info!(
                "SWEEP: 检测 {} 个站点 - 正常 {} / 异常 {} ({}ms)",
                report.checked,
                report.healthy,
                report.unhealthy,
                report.elapsed_ms
            );
        }
    }

    /// 构造单个站点状态的结构化记录
    pub fn site_status_entry(site: &Site) -> serde_json::Value {
        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "type": "site_status",
            "id": site.id(),
            "url": site.url(),
            "status": site.status().as_str(),
            "updated_at": site.last_checked_at().map(|at| at.to_rfc3339()),
        })
    }

    /// 记录单个站点的状态日志
    pub fn site_status_log(site: &Site) {
        if Self::json_enabled() {
            tracing::info!("{}", Self::site_status_entry(site));
        } else {
            tracing::info!(
                "SITE: #{} {} - {}",
                site.id(),
                site.url(),
                site.status()
            );
        }
    }
}
