//! 站点数据结构定义
//!
//! 定义受监控站点、健康状态枚举以及URL校验逻辑

use crate::error::UrlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

/// 站点ID，由注册表分配，单调递增且永不复用
pub type SiteId = u64;

/// 站点健康状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    /// 尚未探测
    #[default]
    Unknown,
    /// 最近一次探测成功
    Healthy,
    /// 最近一次探测失败
    Unhealthy,
}

impl std::fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteStatus::Unknown => write!(f, "未知"),
            SiteStatus::Healthy => write!(f, "正常"),
            SiteStatus::Unhealthy => write!(f, "异常"),
        }
    }
}

impl SiteStatus {
    /// 判断状态是否为健康
    pub fn is_healthy(&self) -> bool {
        matches!(self, SiteStatus::Healthy)
    }

    /// 是否已经被探测过
    pub fn is_checked(&self) -> bool {
        !matches!(self, SiteStatus::Unknown)
    }

    /// 线上表示（与序列化结果一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Unknown => "unknown",
            SiteStatus::Healthy => "healthy",
            SiteStatus::Unhealthy => "unhealthy",
        }
    }

    /// 由探测结果构造状态
    pub fn from_healthy(healthy: bool) -> Self {
        if healthy {
            SiteStatus::Healthy
        } else {
            SiteStatus::Unhealthy
        }
    }
}

/// 受监控站点
///
/// 只能由 [`SiteRegistry`](super::SiteRegistry) 创建和修改，外部拿到的都是快照副本。
/// 序列化格式：`{"id": 1, "url": "...", "status": "healthy", "updatedAt": "..."}`，
/// 未探测过的站点不输出 `updatedAt`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    id: SiteId,
    url: String,
    status: SiteStatus,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    last_checked_at: Option<DateTime<Utc>>,
}

impl Site {
    pub(crate) fn new(id: SiteId, url: String) -> Self {
        Self {
            id,
            url,
            status: SiteStatus::Unknown,
            last_checked_at: None,
        }
    }

    /// 站点ID
    pub fn id(&self) -> SiteId {
        self.id
    }

    /// 站点URL（与添加时的字符串完全一致）
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 当前健康状态
    pub fn status(&self) -> SiteStatus {
        self.status
    }

    /// 最后探测时间
    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }

    /// 写入探测结果；`Unknown` 会同时清除探测时间
    pub(crate) fn record(&mut self, status: SiteStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_checked_at = status.is_checked().then_some(at);
    }

    /// 从未探测过，或最后探测时间早于 `threshold`
    pub(crate) fn is_due(&self, threshold: DateTime<Utc>) -> bool {
        match self.last_checked_at {
            None => true,
            Some(checked_at) => checked_at < threshold,
        }
    }
}

/// 站点状态统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SiteSummary {
    /// 站点总数
    pub total: usize,
    /// 健康站点数
    pub healthy: usize,
    /// 异常站点数
    pub unhealthy: usize,
    /// 未探测站点数
    pub unknown: usize,
}

impl SiteSummary {
    /// 从站点快照统计
    pub fn from_sites(sites: &[Site]) -> Self {
        sites.iter().fold(Self::default(), |mut summary, site| {
            summary.total += 1;
            match site.status() {
                SiteStatus::Healthy => summary.healthy += 1,
                SiteStatus::Unhealthy => summary.unhealthy += 1,
                SiteStatus::Unknown => summary.unknown += 1,
            }
            summary
        })
    }
}

/// 校验站点URL
///
/// 必须是带非空 host 的 http/https 绝对地址，并且原样就是合法的URI：
/// 含空白或控制字符的输入直接拒绝，缺少 `//` 权限段的写法（如 `http:google.com`）
/// 视为非绝对地址。注册表保存的是原始字符串，因此不依赖解析器的自动修正。
///
/// # 参数
/// * `raw` - 原始URL字符串
///
/// # 返回
/// * `Result<Url, UrlError>` - 解析后的URL或校验错误
pub fn validate_site_url(raw: &str) -> Result<Url, UrlError> {
    if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(UrlError::Invalid);
    }

    let parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        // 以 "/" 开头的请求路径本身是合法的 URI，只是缺少 scheme 和 host
        Err(ParseError::RelativeUrlWithoutBase) if raw.starts_with('/') => {
            return Err(UrlError::NotAbsolute)
        }
        Err(ParseError::EmptyHost) => return Err(UrlError::NotAbsolute),
        Err(_) => return Err(UrlError::Invalid),
    };

    if parsed.scheme().is_empty()
        || parsed.host_str().is_none_or(str::is_empty)
        || !has_authority(raw)
    {
        return Err(UrlError::NotAbsolute);
    }

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlError::UnsupportedScheme);
    }

    Ok(parsed)
}

/// 原始字符串在 scheme 之后是否紧跟非空的 `//authority`
fn has_authority(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once(':') else {
        return false;
    };

    match rest.strip_prefix("//") {
        Some(authority) => !authority.is_empty() && !authority.starts_with(['/', '?', '#']),
        None => false,
    }
}
