//! HTTP-level tests for the gateway router

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rivalscope_core::config::{AuthConfig, AuthMode, ExecutorConfig, LimitConfig};
use rivalscope_gateway::auth::ResolvedAuth;
use rivalscope_gateway::{build_router, GatewayState};
use rivalscope_pipeline::{AnalysisService, MemoryResultStore};
use rivalscope_worker::ScriptedWorker;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "secret-token";

fn app_with(worker: ScriptedWorker, auth: ResolvedAuth) -> (Router, Arc<GatewayState>) {
    let service = AnalysisService::new(
        Arc::new(worker),
        Arc::new(MemoryResultStore::new()),
        &ExecutorConfig::default(),
    );
    let state = Arc::new(GatewayState::new(
        service,
        auth,
        LimitConfig {
            max_targets: 3,
            max_bulk_targets: 5,
        },
    ));
    (build_router(state.clone()), state)
}

fn app(worker: ScriptedWorker) -> (Router, Arc<GatewayState>) {
    app_with(worker, ResolvedAuth::none())
}

fn token_auth() -> ResolvedAuth {
    ResolvedAuth::from_config(
        &AuthConfig {
            mode: AuthMode::Token,
            token: Some(TOKEN.into()),
        },
        None,
    )
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn wait_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..500 {
        let (_, body) = send(app, get(&format!("/api/jobs/{}", job_id))).await;
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} did not finish", job_id);
}

// ===========================================================================
// Health
// ===========================================================================

#[tokio::test]
async fn health_is_open_even_with_token_auth() {
    let (app, _) = app_with(ScriptedWorker::new(), token_auth());
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["jobs"]["pending"], 0);
}

// ===========================================================================
// Submission
// ===========================================================================

#[tokio::test]
async fn submit_returns_accepted_with_estimate() {
    let (app, _) = app(ScriptedWorker::new());
    let (status, body) = send(
        &app,
        post_json("/api/analyze", json!({"targets": ["acme", "globex"], "depth": "quick"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["estimated_completion_secs"], 120);
    assert_eq!(body["topology"], "flat");
    assert_eq!(body["cached_results"], 0);
    assert!(body["job_id"].as_str().is_some());
}

#[tokio::test]
async fn invalid_depth_is_bad_request() {
    let (app, state) = app(ScriptedWorker::new());
    let (status, body) = send(
        &app,
        post_json("/api/analyze", json!({"targets": ["acme"], "depth": "deep"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("deep"));
    assert!(state.service.jobs().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let (app, _) = app(ScriptedWorker::new());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"targets\": "))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn bulk_route_has_higher_limit() {
    let (app, _) = app(ScriptedWorker::new());
    let targets = json!({"targets": ["a", "b", "c", "d", "e"], "depth": "quick"});

    let (status, _) = send(&app, post_json("/api/analyze", targets.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post_json("/api/analyze/bulk", targets)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["topology"], "managed");
    // 60 × (3 + 2 × 0.5)
    assert_eq!(body["estimated_completion_secs"], 240);
}

// ===========================================================================
// Status, report, cancel
// ===========================================================================

#[tokio::test]
async fn completed_job_serves_report() {
    let (app, _) = app(ScriptedWorker::new().confidence("acme", 0.8));
    let (_, submitted) = send(&app, post_json("/api/analyze", json!({"targets": ["acme"]}))).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let status = wait_terminal(&app, &job_id).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress_percentage"], 100);
    assert_eq!(status["targets_processed"], 1);

    let (code, report) = send(&app, get(&format!("/api/jobs/{}/report", job_id))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(report["average_confidence"], 0.8);
    assert_eq!(report["results"][0]["outcome"], "success");
    assert_eq!(report["tenant_id"], "default");
}

#[tokio::test]
async fn running_job_report_is_conflict() {
    let (app, _) = app(ScriptedWorker::new().hang_on("acme", "research"));
    let (_, submitted) = send(&app, post_json("/api/analyze", json!({"targets": ["acme"]}))).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let (code, body) = send(&app, get(&format!("/api/jobs/{}/report", job_id))).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["job_id"], job_id.as_str());
}

#[tokio::test]
async fn cancelled_job_report_is_unprocessable() {
    let (app, _) = app(ScriptedWorker::new().hang_on("acme", "research"));
    let (_, submitted) = send(&app, post_json("/api/analyze", json!({"targets": ["acme"]}))).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let cancel = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/jobs/{}", job_id))
        .body(Body::empty())
        .unwrap();
    let (code, _) = send(&app, cancel).await;
    assert_eq!(code, StatusCode::ACCEPTED);

    let status = wait_terminal(&app, &job_id).await;
    assert_eq!(status["status"], "failed");
    assert_eq!(status["error"]["message"], "job cancelled");

    let (code, body) = send(&app, get(&format!("/api/jobs/{}/report", job_id))).await;
    assert_eq!(code, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "job cancelled");

    // already terminal
    let again = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/api/jobs/{}", job_id))
        .body(Body::empty())
        .unwrap();
    let (code, _) = send(&app, again).await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (app, _) = app(ScriptedWorker::new());
    let (code, body) = send(&app, get("/api/jobs/does-not-exist")).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    let (code, _) = send(&app, get("/api/jobs/does-not-exist/report")).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

// ===========================================================================
// Tenants
// ===========================================================================

#[tokio::test]
async fn reports_are_listed_per_tenant() {
    let (app, _) = app(ScriptedWorker::new());
    let mut request = post_json("/api/analyze", json!({"targets": ["acme"]}));
    request
        .headers_mut()
        .insert("x-tenant-id", "team-blue".parse().unwrap());
    let (_, submitted) = send(&app, request).await;
    wait_terminal(&app, submitted["job_id"].as_str().unwrap()).await;

    let (code, body) = send(&app, get("/api/tenants/team-blue/reports")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (_, body) = send(&app, get("/api/tenants/default/reports")).await;
    assert_eq!(body["count"], 0);
}

// ===========================================================================
// Auth
// ===========================================================================

#[tokio::test]
async fn api_requires_bearer_token() {
    let (app, _) = app_with(ScriptedWorker::new(), token_auth());
    let body = json!({"targets": ["acme"]});

    let (code, _) = send(&app, post_json("/api/analyze", body.clone())).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);

    let mut wrong = post_json("/api/analyze", body.clone());
    wrong
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer nope".parse().unwrap());
    let (code, _) = send(&app, wrong).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);

    let mut right = post_json("/api/analyze", body);
    right
        .headers_mut()
        .insert(header::AUTHORIZATION, format!("Bearer {}", TOKEN).parse().unwrap());
    let (code, _) = send(&app, right).await;
    assert_eq!(code, StatusCode::ACCEPTED);
}
