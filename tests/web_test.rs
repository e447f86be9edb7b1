//! Web路由集成测试
//!
//! 通过 `tower::ServiceExt::oneshot` 直接驱动完整路由

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use site_vitals::health::{HealthCheckEngine, ProbeOutcome, Prober, SweepScheduler, SweepSettings};
use site_vitals::notification::Notifier;
use site_vitals::registry::SiteRegistry;
use site_vitals::web::server::REQUEST_ID_HEADER;
use site_vitals::web::{build_router, AppState};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// 所有站点都健康的探测器
struct AlwaysUp;

#[async_trait]
impl Prober for AlwaysUp {
    async fn probe(&self, _url: &str, _timeout: Duration) -> ProbeOutcome {
        ProbeOutcome::Healthy
    }
}

fn app(sse_enabled: bool) -> (Router, Arc<SiteRegistry>) {
    let registry = Arc::new(SiteRegistry::new());
    let engine = Arc::new(HealthCheckEngine::new(Arc::clone(&registry), Arc::new(AlwaysUp)));
    let scheduler = Arc::new(SweepScheduler::new(
        engine,
        Arc::new(Notifier::default()),
        SweepSettings::default(),
    ));
    (build_router(AppState::new(scheduler, sse_enabled)), registry)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn save_form(url: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/sites/save")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("url={url}")))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let (router, _) = app(false);

    let response = router.oneshot(get("/nope")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"404 page not found");
}

#[tokio::test]
async fn test_homepage_summary_counts() {
    let (router, registry) = app(false);
    let up = registry.add("https://example.com").await.unwrap();
    registry.add("https://example.org").await.unwrap();
    registry
        .update_status(up, site_vitals::registry::SiteStatus::Healthy)
        .await
        .unwrap();

    let response = router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains(r#"<strong id="total">2</strong>"#));
    assert!(html.contains(r#"<strong id="count-healthy">1</strong>"#));
    assert!(html.contains(r#"<strong id="count-unhealthy">0</strong>"#));
    assert!(html.contains(r#"<strong id="count-unknown">1</strong>"#));
    // 刷新后由脚本重新计算全部汇总
    assert!(html.contains("function renderSummary(sites)"));
}

#[tokio::test]
async fn test_save_site_redirects_to_homepage() {
    let (router, registry) = app(false);

    let response = router
        .oneshot(save_form("https%3A%2F%2Fexample.com"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/");
    assert_eq!(registry.list().await[0].url(), "https://example.com");
}

#[tokio::test]
async fn test_save_invalid_site_renders_error() {
    let (router, registry) = app(false);

    let response = router
        .oneshot(save_form("not%20a%20url"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_list_and_check_sites() {
    let (router, registry) = app(false);
    registry.add("https://example.com").await.unwrap();

    let response = router.clone().oneshot(get("/ajax/sites")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed[0]["url"], "https://example.com");
    assert_eq!(listed[0]["status"], "unknown");
    assert!(listed[0].get("updatedAt").is_none());

    let response = router.oneshot(get("/ajax/sites/check")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let checked = body_json(response).await;
    assert_eq!(checked[0]["status"], "healthy");
    assert!(checked[0]["updatedAt"].is_string());
}

#[tokio::test]
async fn test_delete_site() {
    let (router, registry) = app(false);
    let id = registry.add("https://example.com").await.unwrap();
    let delete = |uri: String| {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    };

    let response = router
        .clone()
        .oneshot(delete(format!("/ajax/sites/delete/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(registry.is_empty().await);

    let response = router
        .clone()
        .oneshot(delete(format!("/ajax/sites/delete/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());

    let response = router
        .oneshot(delete("/ajax/sites/delete/abc".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sse_route_follows_setting() {
    let (disabled, _) = app(false);
    let response = disabled.oneshot(get("/sse")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (enabled, _) = app(true);
    let response = enabled.oneshot(get("/sse")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_request_id_header() {
    let (router, _) = app(false);

    let response = router.clone().oneshot(get("/ajax/sites")).await.unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let request = Request::builder()
        .uri("/ajax/sites")
        .header(REQUEST_ID_HEADER, "trace-42")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "trace-42");
}
