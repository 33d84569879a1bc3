use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::agents::{AgentTask, QueueStats};
use crate::api::{
    auth::ensure_admin_authorized,
    handlers::{api_error, bad_request, not_found, ApiResult},
    state::AppState,
    types::*,
};

/// POST /api/tasks
///
/// Queued tasks skip the x402 gate, so paid agents are admin-only here.
pub async fn submit_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitTaskRequest>,
) -> ApiResult<(StatusCode, Json<AgentTask>)> {
    let Some(agent) = state.registry.get(&req.agent_id) else {
        return Err(not_found(format!("unknown agent: {}", req.agent_id)));
    };
    if !agent.is_free() {
        ensure_admin_authorized(&state.admin, &headers)?;
    }

    let task = state
        .orchestrator
        .submit(&req.agent_id, req.input, req.priority)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(task)))
}

/// GET /api/tasks -- queue statistics
pub async fn get_queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.orchestrator.queue_stats().await)
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentTask>> {
    let id = Uuid::parse_str(&id).map_err(|_| bad_request("task id must be a UUID"))?;
    state
        .orchestrator
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("task not found: {}", id)))
}
