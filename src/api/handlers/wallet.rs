use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use tracing::{info, warn};

use crate::api::{
    auth::{extract_bearer_token, require_wallet},
    handlers::{api_error, ApiResult},
    state::AppState,
    types::*,
};
use crate::payment::{AuthChallenge, AuthToken};
use crate::validation::validate_solana_address;

/// POST /api/auth/challenge
pub async fn issue_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> ApiResult<Json<AuthChallenge>> {
    let wallet = req.wallet.trim();
    validate_solana_address(wallet).map_err(api_error)?;

    state
        .wallet_auth
        .issue_challenge(wallet)
        .await
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::TOO_MANY_REQUESTS,
                "wallet is temporarily locked after repeated failed sign-ins".to_string(),
            )
        })
}

/// POST /api/auth/verify
pub async fn verify_signature(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<AuthToken>> {
    let wallet = req.wallet.trim();
    let token = state
        .wallet_auth
        .verify_signature(wallet, req.signature.trim())
        .await
        .map_err(api_error)?;

    if let Err(e) = state.repository.upsert_user(wallet).await {
        warn!("Failed to record user {}: {}", wallet, e);
    }
    info!("Wallet {} signed in", wallet);
    Ok(Json(token))
}

/// GET /api/auth/session
pub async fn get_wallet_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AuthToken>> {
    let token = require_wallet(&state, &headers, "read").await?;
    Ok(Json(token))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<MutationResponse>> {
    let Some(raw) = extract_bearer_token(&headers) else {
        return Err((StatusCode::UNAUTHORIZED, "missing bearer token".to_string()));
    };
    let success = state.wallet_auth.revoke_token(raw).await;
    Ok(Json(MutationResponse { success }))
}
