use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use crate::api::{
    auth::{ensure_admin_authorized, require_wallet},
    handlers::{api_error, bad_request, not_found, ApiResult},
    state::AppState,
    types::*,
};
use crate::payment::{EscrowAccount, EscrowStats};
use crate::validation::validate_amount;

fn conflict(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::CONFLICT, msg.into())
}

/// Load an escrow the caller is a party to
async fn party_escrow(
    state: &AppState,
    id: &str,
    wallet: &str,
) -> ApiResult<EscrowAccount> {
    let escrow = state
        .escrow
        .get_escrow(id)
        .await
        .ok_or_else(|| not_found(format!("escrow not found: {}", id)))?;
    if escrow.depositor != wallet && escrow.beneficiary != wallet {
        // Hide escrows of other parties
        return Err(not_found(format!("escrow not found: {}", id)));
    }
    Ok(escrow)
}

/// POST /api/escrow -- the signed-in wallet is the depositor
pub async fn create_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateEscrowRequest>,
) -> ApiResult<(StatusCode, Json<EscrowAccount>)> {
    let token = require_wallet(&state, &headers, "escrow").await?;
    validate_amount(req.amount, "amount").map_err(api_error)?;

    let escrow = state
        .escrow
        .create_escrow(&token.wallet, req.beneficiary.trim(), req.amount, &req.condition)
        .await
        .ok_or_else(|| bad_request("invalid beneficiary, amount or condition"))?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

/// GET /api/escrow
pub async fn list_escrows(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<EscrowAccount>>> {
    let token = require_wallet(&state, &headers, "read").await?;
    Ok(Json(state.escrow.escrows_for_wallet(&token.wallet).await))
}

/// GET /api/escrow/:id
pub async fn get_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<EscrowAccount>> {
    let token = require_wallet(&state, &headers, "read").await?;
    party_escrow(&state, &id, &token.wallet).await.map(Json)
}

/// POST /api/escrow/:id/release -- depositor only
pub async fn release_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<EscrowAccount>> {
    let token = require_wallet(&state, &headers, "escrow").await?;
    party_escrow(&state, &id, &token.wallet).await?;

    if !state.escrow.release_escrow(&id, &token.wallet).await {
        return Err(conflict("escrow cannot be released by this wallet in its current state"));
    }
    party_escrow(&state, &id, &token.wallet).await.map(Json)
}

/// POST /api/escrow/:id/refund -- depositor only
pub async fn refund_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<EscrowAccount>> {
    let token = require_wallet(&state, &headers, "escrow").await?;
    let escrow = party_escrow(&state, &id, &token.wallet).await?;
    if escrow.depositor != token.wallet {
        return Err((
            StatusCode::FORBIDDEN,
            "only the depositor can request a refund".to_string(),
        ));
    }

    if !state.escrow.refund_escrow(&id).await {
        return Err(conflict(format!(
            "escrow is {} and cannot be refunded",
            escrow.status.as_str()
        )));
    }
    party_escrow(&state, &id, &token.wallet).await.map(Json)
}

/// POST /api/escrow/:id/dispute -- either party
pub async fn dispute_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<DisputeRequest>,
) -> ApiResult<Json<EscrowAccount>> {
    let token = require_wallet(&state, &headers, "escrow").await?;
    party_escrow(&state, &id, &token.wallet).await?;

    if !state
        .escrow
        .dispute_escrow(&id, &token.wallet, req.reason.trim())
        .await
    {
        return Err(conflict("escrow cannot be disputed in its current state"));
    }
    party_escrow(&state, &id, &token.wallet).await.map(Json)
}

/// POST /api/escrow/:id/resolve (admin)
pub async fn resolve_escrow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<EscrowAccount>> {
    ensure_admin_authorized(&state.admin, &headers)?;
    if !state.escrow.resolve_dispute(&id, req.resolution).await {
        return Err(conflict("escrow is not disputed"));
    }
    info!("Escrow {} resolved as {:?}", id, req.resolution);
    state
        .escrow
        .get_escrow(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("escrow not found: {}", id)))
}

/// GET /api/escrow/stats (admin)
pub async fn get_escrow_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<EscrowStats>> {
    ensure_admin_authorized(&state.admin, &headers)?;
    Ok(Json(state.escrow.stats().await))
}
