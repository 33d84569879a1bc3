//! Agent manifest and the paid agent endpoints
//!
//! The paid handlers run behind the x402 gate, which has already priced,
//! verified and rate limited the call by the time they execute.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use tracing::debug;

use crate::analysis::{EntryAnalysis, PortfolioReport, PredictionSummary, TrendingScore};
use crate::api::{
    handlers::{api_error, network::parse_urgency, ApiResult},
    state::AppState,
    types::*,
};
use crate::services::{NetworkReport, TokenOverview, WhaleActivity};
use crate::x402::PaymentContext;

fn log_payment(context: Option<Extension<PaymentContext>>) {
    if let Some(Extension(ctx)) = context {
        debug!(
            "Serving {} for session {} ({} USD, payer {:?})",
            ctx.agent_id, ctx.session_id, ctx.amount, ctx.payer
        );
    }
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentManifest> {
    Json(AgentManifest {
        x402_version: state.config.x402.x402_version,
        network: state.config.x402.network.clone(),
        agents: state.registry.all().to_vec(),
    })
}

/// POST /api/agents/token-safety
pub async fn token_safety(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Json(req): Json<AddressRequest>,
) -> ApiResult<Json<TokenOverview>> {
    log_payment(context);
    let overview = state
        .agents
        .token_safety(req.address.trim())
        .await
        .map_err(api_error)?;
    Ok(Json(overview))
}

/// GET /api/agents/trending
pub async fn trending(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    log_payment(context);
    let tokens: Vec<TrendingScore> = state
        .agents
        .trending(query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({ "tokens": tokens })))
}

/// POST /api/agents/smart-entry
pub async fn smart_entry(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Json(req): Json<AddressRequest>,
) -> ApiResult<Json<EntryAnalysis>> {
    log_payment(context);
    let analysis = state
        .agents
        .smart_entry(req.address.trim())
        .await
        .map_err(api_error)?;
    Ok(Json(analysis))
}

/// POST /api/agents/portfolio
pub async fn portfolio(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Json(req): Json<PortfolioRequest>,
) -> ApiResult<Json<PortfolioReport>> {
    log_payment(context);
    let report = state.agents.portfolio(&req.holdings).map_err(api_error)?;
    Ok(Json(report))
}

/// GET /api/agents/polymarket
pub async fn polymarket_insights(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<PredictionSummary>> {
    log_payment(context);
    let summary = state
        .agents
        .polymarket(query.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(summary))
}

/// POST /api/agents/whale-activity
pub async fn whale_activity(
    State(state): State<AppState>,
    context: Option<Extension<PaymentContext>>,
    Json(req): Json<WhaleActivityRequest>,
) -> ApiResult<Json<WhaleActivity>> {
    log_payment(context);
    let activity = state
        .agents
        .whale_activity(req.address.trim(), req.min_usd)
        .await
        .map_err(api_error)?;
    Ok(Json(activity))
}

/// GET /api/agents/network-status
pub async fn network_agent(
    State(state): State<AppState>,
    Query(query): Query<UrgencyQuery>,
) -> ApiResult<Json<NetworkReport>> {
    let urgency = parse_urgency(query.urgency.as_deref())?;
    Ok(Json(state.agents.network_status(urgency).await))
}
