use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;

use crate::api::{
    auth::ensure_admin_authorized,
    handlers::{bad_request, ApiResult},
    state::AppState,
    types::*,
};
use crate::payment::{NetworkState, NetworkStatus, Urgency};

pub fn parse_urgency(raw: Option<&str>) -> ApiResult<Urgency> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value.parse().map_err(bad_request),
        None => Ok(Urgency::default()),
    }
}

/// GET /api/network/status
pub async fn get_network_status(State(state): State<AppState>) -> Json<NetworkStatus> {
    Json(state.network.status().await)
}

/// GET /api/network/fees?urgency=
pub async fn get_network_fees(
    State(state): State<AppState>,
    Query(query): Query<UrgencyQuery>,
) -> ApiResult<Json<FeesResponse>> {
    let urgency = parse_urgency(query.urgency.as_deref())?;
    Ok(Json(FeesResponse {
        fees: state.network.estimate_priority_fee(urgency).await,
        recommendation: state.network.should_delay(urgency).await,
    }))
}

/// POST /api/network/samples -- externally observed telemetry (admin)
pub async fn record_network_sample(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NetworkSampleRequest>,
) -> ApiResult<(StatusCode, Json<NetworkState>)> {
    ensure_admin_authorized(&state.admin, &headers)?;
    if !req.tps.is_finite() || req.tps < 0.0 || !req.block_time_ms.is_finite() || req.block_time_ms <= 0.0 {
        return Err(bad_request("tps must be >= 0 and blockTimeMs > 0"));
    }

    let sample = NetworkState::new(req.slot, req.tps, req.block_time_ms, Utc::now());
    state.network.record_sample(sample.clone()).await;
    Ok((StatusCode::CREATED, Json(sample)))
}
