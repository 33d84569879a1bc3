use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};

use crate::api::{handlers::ApiResult, state::AppState, types::*};

/// GET /health -- liveness check
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_seconds(),
    })
}

/// GET /api/system/status
pub async fn get_system_status(State(state): State<AppState>) -> ApiResult<Json<SystemStatus>> {
    let x402 = &state.config.x402;
    Ok(Json(SystemStatus {
        status: "running".to_string(),
        started_at: state.start_time,
        uptime_secs: state.uptime_seconds(),
        agents: state.registry.all().len(),
        active_escrows: state.escrow.active_escrow_count().await,
        payment_sessions: state.sessions.len().await,
        rate_limit_buckets: state.rate_limiter.bucket_count().await,
        congestion: state.network.status().await.congestion,
        queue: state.orchestrator.queue_stats().await,
        metrics: state.metrics.snapshot(),
        payments: PaymentSettings {
            x402_version: x402.x402_version,
            network: x402.network.clone(),
            asset: x402.asset.clone(),
            pay_to: x402.pay_to.clone(),
            facilitator_url: x402.facilitator_url.clone(),
        },
    }))
}

/// GET /metrics -- Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut response = state.metrics.prometheus().into_response();
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
