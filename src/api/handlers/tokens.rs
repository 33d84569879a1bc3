use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::warn;

use crate::adapters::{BoostedToken, DexPair, GammaMarket};
use crate::api::{
    handlers::{api_error, bad_request, ApiResult},
    state::AppState,
    types::*,
};
use crate::domain::TokenSnapshot;
use crate::services::agent_service::{DEFAULT_MARKET_LIMIT, MAX_MARKET_LIMIT};
use crate::validation::{validate_solana_address, validate_text};

const MAX_HISTORY: usize = 500;

/// GET /api/tokens/:address
pub async fn get_token(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult<Json<TokenPairsResponse>> {
    validate_solana_address(&address).map_err(api_error)?;
    let pairs = state.market.token_pairs(&address).await.map_err(api_error)?;
    Ok(Json(TokenPairsResponse { address, pairs }))
}

/// GET /api/tokens/:address/history?limit=
pub async fn get_token_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<TokenSnapshot>>> {
    validate_solana_address(&address).map_err(api_error)?;
    let limit = query.limit.unwrap_or(100).clamp(1, MAX_HISTORY);
    let snapshots = state
        .repository
        .token_snapshots(&address, limit)
        .await
        .map_err(api_error)?;
    Ok(Json(snapshots))
}

/// GET /api/tokens/boosted -- degrades to an empty list when upstream fails
pub async fn get_boosted_tokens(State(state): State<AppState>) -> Json<Vec<BoostedToken>> {
    match state.market.boosted_tokens().await {
        Ok(tokens) => Json(tokens),
        Err(e) => {
            warn!("Boosted token lookup failed: {}", e);
            Json(Vec::new())
        }
    }
}

/// GET /api/tokens/search?q=
pub async fn search_tokens(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<DexPair>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(bad_request("q is required"));
    }
    validate_text(q, "q", 64).map_err(api_error)?;
    let pairs = state.market.search(q).await.map_err(api_error)?;
    Ok(Json(pairs))
}

/// GET /api/polymarket/markets?limit= -- degrades to an empty list
pub async fn get_polymarket_markets(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<Vec<GammaMarket>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MARKET_LIMIT)
        .clamp(1, MAX_MARKET_LIMIT);
    match state.predictions.active_markets(limit).await {
        Ok(markets) => Json(markets),
        Err(e) => {
            warn!("Polymarket lookup failed: {}", e);
            Json(Vec::new())
        }
    }
}
