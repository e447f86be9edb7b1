//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Site Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum SiteVitalsError {
    /// 站点注册表相关错误
    #[error("站点错误: {0}")]
    Registry(#[from] RegistryError),

    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测相关错误
    #[error("探测错误: {0}")]
    Probe(#[from] ProbeError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 站点注册表错误类型
///
/// 两种错误都会在调用方同步返回，注册表内容保持不变。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// URL 校验失败
    #[error("{0}")]
    Validation(#[from] UrlError),

    /// 站点不存在
    #[error("site {id} does not exist")]
    NotFound { id: u64 },
}

impl RegistryError {
    /// 是否为校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, RegistryError::Validation(_))
    }

    /// 是否为站点不存在错误
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// URL 校验错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlError {
    /// 无法解析为 URI
    #[error("not a valid URL")]
    Invalid,

    /// 缺少 scheme 或 host
    #[error("must be absolute")]
    NotAbsolute,

    /// 非 http/https 协议
    #[error("must be http/https")]
    UnsupportedScheme,
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 探测错误类型
///
/// 仅在探测器内部使用，最终会被转换为站点的 `Unhealthy` 状态。
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP请求错误
    #[error("HTTP请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 超时错误
    #[error("请求超时")]
    Timeout,

    /// 非成功状态码
    #[error("非成功状态码: {status}")]
    UnexpectedStatus { status: u16 },
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, SiteVitalsError>;
