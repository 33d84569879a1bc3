//! Per-wallet watchlist and tracked wallets (bearer token)

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::{
    auth::require_wallet,
    handlers::{api_error, bad_request, not_found, ApiResult},
    state::AppState,
    types::*,
};
use crate::domain::{TrackedWallet, WatchlistEntry};
use crate::validation::{validate_solana_address, validate_text};

const MAX_NOTE_LEN: usize = 280;
const MAX_LABEL_LEN: usize = 64;

/// GET /api/watchlist
pub async fn get_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<WatchlistEntry>>> {
    let token = require_wallet(&state, &headers, "watchlist").await?;
    let entries = state
        .repository
        .watchlist(&token.wallet)
        .await
        .map_err(api_error)?;
    Ok(Json(entries))
}

/// POST /api/watchlist
pub async fn add_to_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WatchlistRequest>,
) -> ApiResult<(StatusCode, Json<WatchlistEntry>)> {
    let token = require_wallet(&state, &headers, "watchlist").await?;
    validate_solana_address(&req.token_address).map_err(api_error)?;
    if let Some(note) = &req.note {
        validate_text(note, "note", MAX_NOTE_LEN).map_err(api_error)?;
    }

    let entry = WatchlistEntry {
        owner: token.wallet,
        token_address: req.token_address,
        note: req.note,
        added_at: Utc::now(),
    };
    state
        .repository
        .add_to_watchlist(&entry)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE /api/watchlist/:token
pub async fn remove_from_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(token_address): Path<String>,
) -> ApiResult<Json<MutationResponse>> {
    let token = require_wallet(&state, &headers, "watchlist").await?;
    let removed = state
        .repository
        .remove_from_watchlist(&token.wallet, &token_address)
        .await
        .map_err(api_error)?;
    if !removed {
        return Err(not_found(format!("{} is not on the watchlist", token_address)));
    }
    Ok(Json(MutationResponse { success: true }))
}

/// GET /api/tracked-wallets
pub async fn get_tracked_wallets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TrackedWallet>>> {
    let token = require_wallet(&state, &headers, "read").await?;
    let wallets = state
        .repository
        .tracked_wallets(&token.wallet)
        .await
        .map_err(api_error)?;
    Ok(Json(wallets))
}

/// POST /api/tracked-wallets
pub async fn track_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TrackWalletRequest>,
) -> ApiResult<(StatusCode, Json<TrackedWallet>)> {
    let token = require_wallet(&state, &headers, "watchlist").await?;
    validate_solana_address(&req.address).map_err(api_error)?;
    if req.address == token.wallet {
        return Err(bad_request("cannot track your own wallet"));
    }
    if let Some(label) = &req.label {
        validate_text(label, "label", MAX_LABEL_LEN).map_err(api_error)?;
    }

    let tracked = TrackedWallet::new(&token.wallet, &req.address, req.label);
    state
        .repository
        .add_tracked_wallet(&tracked)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

/// DELETE /api/tracked-wallets/:id
pub async fn untrack_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MutationResponse>> {
    let token = require_wallet(&state, &headers, "watchlist").await?;
    let id = Uuid::parse_str(&id).map_err(|_| bad_request("id must be a UUID"))?;
    let removed = state
        .repository
        .remove_tracked_wallet(&token.wallet, id)
        .await
        .map_err(api_error)?;
    if !removed {
        return Err(not_found(format!("tracked wallet not found: {}", id)));
    }
    Ok(Json(MutationResponse { success: true }))
}
