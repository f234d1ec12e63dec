//! Gateway server: submission, polling, reports and cancellation over HTTP

use crate::auth::{tenant_id, ResolvedAuth};
use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rivalscope_core::config::{AuthMode, LimitConfig};
use rivalscope_core::{JobId, JobStatus, ServiceConfig, SubmitRequest};
use rivalscope_pipeline::{store, AnalysisService};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct GatewayState {
    pub service: AnalysisService,
    pub auth: ResolvedAuth,
    pub limits: LimitConfig,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(service: AnalysisService, auth: ResolvedAuth, limits: LimitConfig) -> Self {
        Self {
            service,
            auth,
            limits,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    let api = Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/bulk", post(bulk_analyze_handler))
        .route("/api/jobs/:id", get(job_handler).delete(cancel_handler))
        .route("/api/jobs/:id/report", get(report_handler))
        .route("/api/tenants/:tenant/reports", get(tenant_reports_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_handler))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn start_gateway(config: ServiceConfig) -> anyhow::Result<()> {
    let env_token = std::env::var("RIVALSCOPE_GATEWAY_TOKEN").ok();
    let auth = ResolvedAuth::from_config(&config.auth, env_token);
    if auth.mode == AuthMode::Token && auth.token.is_none() {
        anyhow::bail!(
            "auth mode is 'token' but no token is configured (set RIVALSCOPE_GATEWAY_TOKEN or disable auth)"
        );
    }

    let worker = rivalscope_worker::from_config(&config.worker)?;
    let results = store::from_config(&config.store);
    let service = AnalysisService::new(worker.clone(), results.clone(), &config.executor);
    let state = Arc::new(GatewayState::new(service, auth, config.limits.clone()));
    let app = build_router(state);

    let bind_addr: SocketAddr =
        format!("{}:{}", config.server.bind.to_addr(), config.server.port).parse()?;

    info!("Rivalscope Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Auth mode: {:?}", config.auth.mode);
    info!("  Worker: {}", worker.name());
    info!("  Result store: {}", results.name());
    info!(
        "  Limits: {} targets, {} bulk",
        config.limits.max_targets, config.limits.max_bulk_targets
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn require_auth(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.auth.verify_headers(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let jobs: serde_json::Map<String, serde_json::Value> = state
        .service
        .counts()
        .into_iter()
        .map(|(status, count)| (status.to_string(), json!(count)))
        .collect();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "jobs": jobs,
    }))
}

async fn analyze_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let max = state.limits.max_targets;
    submit(&state, &headers, body, max).await
}

async fn bulk_analyze_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let max = state.limits.max_bulk_targets;
    submit(&state, &headers, body, max).await
}

async fn submit(
    state: &GatewayState,
    headers: &HeaderMap,
    body: Result<Json<SubmitRequest>, JsonRejection>,
    max_targets: usize,
) -> Result<(StatusCode, Json<rivalscope_core::SubmitResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let tenant = tenant_id(headers);
    let response = state.service.submit(&tenant, &request, max_targets).await?;
    info!(job_id = %response.job_id, tenant = %tenant, targets = response.targets, "job submitted");
    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn job_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.status(&JobId::new(id))?))
}

async fn report_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.service.job(&JobId::new(id))?;
    match (job.status, job.aggregate_report, job.error) {
        (JobStatus::Completed, Some(report), _) => Ok(Json(report)),
        (JobStatus::Failed, _, error) => {
            let (message, step) = error
                .map(|e| (e.message, e.step))
                .unwrap_or_else(|| ("job failed".into(), String::new()));
            Err(ApiError::JobFailed {
                job_id: job.id.to_string(),
                message,
                step,
            })
        }
        (status, _, _) => Err(ApiError::NotReady {
            job_id: job.id.to_string(),
            status: status.to_string(),
            progress: job.progress_percentage,
        }),
    }
}

async fn cancel_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = JobId::new(id);
    state.service.cancel(&id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": id, "cancelling": true })),
    ))
}

async fn tenant_reports_handler(
    State(state): State<Arc<GatewayState>>,
    Path(tenant): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let reports = state.service.existing_reports(&tenant).await?;
    Ok(Json(json!({
        "tenant_id": tenant,
        "count": reports.len(),
        "reports": reports,
    })))
}
