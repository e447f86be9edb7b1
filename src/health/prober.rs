//! HTTP探测器实现
//!
//! 对单个URL发起一次带超时的健康探测，并把结果归类为健康或异常。
//! 探测器本身无状态，通过 [`Prober`] trait 注入到检测引擎中，便于在测试中替换。

use crate::error::{ProbeError, Result};
use crate::registry::SiteStatus;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;

/// 单次探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 在超时时间内返回了 2xx 状态码
    Healthy,
    /// 连接失败、超时或非成功状态码
    Unhealthy {
        /// 失败原因
        reason: String,
    },
}

impl ProbeOutcome {
    /// 构造异常结果
    pub fn unhealthy(reason: impl Into<String>) -> Self {
        ProbeOutcome::Unhealthy {
            reason: reason.into(),
        }
    }

    /// 判断是否健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }

    /// 对应的站点状态
    pub fn status(&self) -> SiteStatus {
        SiteStatus::from_healthy(self.is_healthy())
    }

    /// 失败原因（健康时为 `None`）
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Healthy => None,
            ProbeOutcome::Unhealthy { reason } => Some(reason),
        }
    }
}

impl From<ProbeError> for ProbeOutcome {
    fn from(error: ProbeError) -> Self {
        ProbeOutcome::unhealthy(describe_probe_error(&error))
    }
}

/// 探测器trait，定义单次探测接口
#[async_trait]
pub trait Prober: Send + Sync {
    /// 执行一次健康探测
    ///
    /// # 参数
    /// * `url` - 目标URL
    /// * `timeout` - 超时时间
    ///
    /// # 返回
    /// * `ProbeOutcome` - 探测结果，任何失败都归类为 `Unhealthy`
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// 基于 reqwest 的HTTP探测器
#[derive(Debug, Clone)]
pub struct HttpProber {
    /// HTTP客户端
    client: Client,
}

impl HttpProber {
    /// 创建新的HTTP探测器
    ///
    /// # 返回
    /// * `Result<Self>` - 探测器实例
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(ProbeError::Request)?;

        Ok(Self { client })
    }

    /// 发送请求并校验状态码
    async fn send(&self, url: &str, timeout_duration: Duration) -> std::result::Result<u16, ProbeError> {
        let response = timeout(timeout_duration, self.client.get(url).send())
            .await
            .map_err(|_| ProbeError::Timeout)??;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(ProbeError::UnexpectedStatus {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str, timeout_duration: Duration) -> ProbeOutcome {
        match self.send(url, timeout_duration).await {
            Ok(_) => ProbeOutcome::Healthy,
            Err(e) => e.into(),
        }
    }
}

/// 将探测错误转换为易读的失败原因
pub fn describe_probe_error(error: &ProbeError) -> String {
    match error {
        ProbeError::Timeout => "Request timeout".to_string(),
        ProbeError::UnexpectedStatus { status } => format!(
            "HTTP {} {}",
            status,
            reqwest::StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown")
        ),
        ProbeError::Request(e) => format_request_error(e),
    }
}

/// 格式化请求错误信息，使其更加清晰易读
fn format_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_builder() || error.is_request() {
        "Invalid request".to_string()
    } else if error.is_decode() {
        "Response decode error".to_string()
    } else {
        let error_str = error.to_string();
        if error_str.contains("dns") || error_str.contains("DNS") {
            "DNS resolution failed".to_string()
        } else if error_str.contains("certificate")
            || error_str.contains("tls")
            || error_str.contains("ssl")
        {
            "SSL/TLS certificate error".to_string()
        } else {
            format!("Request failed: {}", error_str)
        }
    }
}
