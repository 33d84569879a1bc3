use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use rust_decimal::Decimal;
use tracing::info;

use crate::api::{
    auth::ensure_admin_authorized,
    handlers::{bad_request, not_found, ApiResult},
    state::AppState,
    types::*,
};
use crate::payment::{ActionType, AgentPricing, DiscountRule, PriceQuote};
use crate::validation::validate_solana_address;

/// GET /api/pricing
pub async fn list_pricing(State(state): State<AppState>) -> Json<Vec<AgentPricing>> {
    Json(state.pricing.all_pricing().await)
}

/// GET /api/pricing/:agent?wallet=&units=
pub async fn get_price_quote(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<QuoteQuery>,
) -> ApiResult<Json<PriceQuote>> {
    let wallet = query.wallet.as_deref().map(str::trim).filter(|w| !w.is_empty());
    if let Some(wallet) = wallet {
        validate_solana_address(wallet).map_err(|e| bad_request(e.to_string()))?;
    }

    state
        .pricing
        .calculate_price(&agent_id, wallet, query.units.unwrap_or(1))
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown agent: {}", agent_id)))
}

/// GET /api/pricing/discounts
pub async fn list_discount_rules(State(state): State<AppState>) -> Json<Vec<DiscountRule>> {
    Json(state.pricing.discount_rules().await)
}

/// POST /api/pricing/discounts (admin)
pub async fn add_discount_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(rule): Json<DiscountRule>,
) -> ApiResult<(StatusCode, Json<DiscountRule>)> {
    ensure_admin_authorized(&state.admin, &headers)?;
    if rule.id.trim().is_empty() {
        return Err(bad_request("rule id is required"));
    }
    if rule.percent <= Decimal::ZERO || rule.percent >= Decimal::ONE {
        return Err(bad_request("percent must be a fraction between 0 and 1"));
    }

    info!("Adding discount rule {} ({})", rule.id, rule.percent);
    state.pricing.add_discount_rule(rule.clone()).await;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// DELETE /api/pricing/discounts/:id (admin)
pub async fn remove_discount_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rule_id): Path<String>,
) -> ApiResult<Json<MutationResponse>> {
    ensure_admin_authorized(&state.admin, &headers)?;
    if !state.pricing.remove_discount_rule(&rule_id).await {
        return Err(not_found(format!("discount rule not found: {}", rule_id)));
    }
    Ok(Json(MutationResponse { success: true }))
}

/// GET /api/rate-limit?wallet=
pub async fn get_rate_limit_status(
    State(state): State<AppState>,
    Query(query): Query<WalletQuery>,
) -> ApiResult<Json<RateLimitStatusResponse>> {
    let wallet = query.wallet.trim();
    if wallet.is_empty() {
        return Err(bad_request("wallet is required"));
    }

    let mut limits = Vec::with_capacity(ActionType::ALL.len());
    for action in ActionType::ALL {
        limits.push(state.rate_limiter.status(wallet, action).await);
    }
    Ok(Json(RateLimitStatusResponse {
        wallet: wallet.to_string(),
        limits,
    }))
}

/// POST /api/rate-limit/reset (admin)
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ResetRateLimitRequest>,
) -> ApiResult<Json<ResetRateLimitResponse>> {
    ensure_admin_authorized(&state.admin, &headers)?;
    let wallet = req.wallet.trim().to_string();
    let buckets_cleared = state.rate_limiter.reset(&wallet).await;
    info!("Reset {} rate limit buckets for {}", buckets_cleared, wallet);
    Ok(Json(ResetRateLimitResponse {
        wallet,
        buckets_cleared,
    }))
}
