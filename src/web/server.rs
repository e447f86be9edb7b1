//! Web服务器实现
//!
//! 提供路由组装、请求日志中间件和带优雅关闭的HTTP服务

use super::{handlers, AppState};
use crate::error::Result;
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// 请求ID响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 组装路由
///
/// `/sse` 只在开启事件流时注册，其余未匹配的路径返回 404。
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::homepage))
        .route("/sites/save", post(handlers::save_site))
        .route("/ajax/sites", get(handlers::list_sites))
        .route("/ajax/sites/check", get(handlers::check_sites))
        .route("/ajax/sites/delete/{id}", delete(handlers::delete_site));

    if state.sse_enabled {
        router = router.route("/sse", get(handlers::sweep_events));
    }

    router
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
}

/// 请求日志中间件
///
/// 为每个请求分配ID（沿用客户端传入的 `x-request-id`），
/// 记录方法、路径、状态码和耗时，并在响应头中回写ID。
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(request).await;

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "HTTP请求"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Web服务器
pub struct WebServer {
    /// 共享状态
    state: AppState,
    /// 监听地址
    bind_address: String,
}

impl WebServer {
    /// 创建新的Web服务器
    pub fn new(state: AppState, bind_address: impl Into<String>) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
        }
    }

    /// 监听地址
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    /// 绑定监听端口
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(&self.bind_address).await?)
    }

    /// 在给定的监听器上运行，收到关闭信号后停止接受新连接并等待已有请求结束
    ///
    /// # 参数
    /// * `listener` - 已绑定的监听器
    /// * `shutdown` - 关闭信号接收器
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr = listener.local_addr()?;
        let sse_enabled = self.state.sse_enabled;
        let app = build_router(self.state);

        info!("Web服务器已启动: http://{}", addr);
        if sse_enabled {
            info!("事件流地址: http://{}/sse", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await?;

        info!("Web服务器已关闭");
        Ok(())
    }
}
