//! Web 路由处理函数
//!
//! 实现 Web 服务器的路由处理逻辑

use super::AppState;
use crate::error::RegistryError;
use crate::registry::{Site, SiteId, SiteSummary};
use askama::Template;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json, Response,
    },
    Form,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, error, warn};

/// 页面上展示的站点
struct SiteView {
    id: SiteId,
    url: String,
    status: &'static str,
    status_label: String,
    updated_at: String,
}

impl From<&Site> for SiteView {
    fn from(site: &Site) -> Self {
        Self {
            id: site.id(),
            url: site.url().to_string(),
            status: site.status().as_str(),
            status_label: site.status().to_string(),
            updated_at: site
                .last_checked_at()
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// 首页模板
#[derive(Template)]
#[template(path = "homepage.html")]
struct HomepageTemplate {
    sites: Vec<SiteView>,
    summary: SiteSummary,
    error: Option<String>,
    submitted_url: String,
    sse_enabled: bool,
}

/// 添加站点表单
#[derive(Debug, Deserialize)]
pub struct SaveSiteForm {
    #[serde(default)]
    url: String,
}

async fn render_homepage(
    state: &AppState,
    status: StatusCode,
    error: Option<String>,
    submitted_url: String,
) -> Response {
    let sites = state.registry.list().await;

    let template = HomepageTemplate {
        summary: SiteSummary::from_sites(&sites),
        sites: sites.iter().map(SiteView::from).collect(),
        error,
        submitted_url,
        sse_enabled: state.sse_enabled,
    };

    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("模板渲染失败: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "模板渲染失败").into_response()
        }
    }
}

/// 首页
pub async fn homepage(State(state): State<AppState>) -> Response {
    render_homepage(&state, StatusCode::OK, None, String::new()).await
}

/// 添加站点
///
/// 成功时重定向回首页；校验失败时返回 422 并在首页展示错误信息。
pub async fn save_site(State(state): State<AppState>, Form(form): Form<SaveSiteForm>) -> Response {
    let url = form.url.trim();

    match state.registry.add(url).await {
        Ok(id) => {
            debug!("表单添加站点成功: {} (id={})", url, id);
            (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
        }
        Err(e) => {
            warn!("表单添加站点失败: {:?} - {}", url, e);
            render_homepage(
                &state,
                StatusCode::UNPROCESSABLE_ENTITY,
                Some(e.to_string()),
                url.to_string(),
            )
            .await
        }
    }
}

/// 检测到期站点并返回最新列表
pub async fn check_sites(State(state): State<AppState>) -> Json<Vec<Site>> {
    state.scheduler.run_once().await;
    Json(state.registry.list().await)
}

/// 返回站点列表，不触发检测
pub async fn list_sites(State(state): State<AppState>) -> Json<Vec<Site>> {
    Json(state.registry.list().await)
}

/// 删除站点
pub async fn delete_site(State(state): State<AppState>, Path(id): Path<SiteId>) -> Response {
    match state.registry.delete(id).await {
        Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(e @ RegistryError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// 检测完成事件流
///
/// 每轮检测完成推送一条 `data: done`。客户端断开后订阅句柄随流一起释放，
/// 下一次广播时被移除。
pub async fn sweep_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.scheduler.notifier().subscribe();
    debug!("SSE 客户端已连接，订阅者: {}", subscription.id());

    let stream = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.recv().await?;
        let message = Event::default()
            .id(event.sequence.to_string())
            .data("done");
        Some((Ok(message), subscription))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// 未匹配的路由
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}
