use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::api::{
    auth::ensure_admin_authorized,
    handlers::{api_error, bad_request, ApiResult},
    state::AppState,
    types::*,
};
use crate::domain::{TradeSide, WhaleTrade};
use crate::validation::{validate_amount, validate_solana_address};

/// POST /api/whale-trades -- ingest one observed large trade (admin)
pub async fn ingest_whale_trade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<WhaleTradeRequest>,
) -> ApiResult<(StatusCode, Json<WhaleTrade>)> {
    ensure_admin_authorized(&state.admin, &headers)?;
    validate_solana_address(&req.token_address).map_err(api_error)?;
    validate_solana_address(&req.wallet).map_err(api_error)?;
    validate_amount(req.amount_usd, "amountUsd").map_err(api_error)?;
    let side = TradeSide::try_from(req.side.as_str()).map_err(bad_request)?;

    let trade = WhaleTrade {
        id: Uuid::new_v4(),
        token_address: req.token_address,
        wallet: req.wallet,
        side,
        amount_usd: req.amount_usd,
        signature: req.signature,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
    };
    state
        .repository
        .record_whale_trade(&trade)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(trade)))
}
