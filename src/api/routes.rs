use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};
use crate::x402::x402_middleware;

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    // Agent resources behind the x402 gate
    let paid = Router::new()
        .route("/api/agents/token-safety", post(handlers::token_safety))
        .route("/api/agents/trending", get(handlers::trending))
        .route("/api/agents/smart-entry", post(handlers::smart_entry))
        .route("/api/agents/portfolio", post(handlers::portfolio))
        .route("/api/agents/polymarket", get(handlers::polymarket_insights))
        .route("/api/agents/whale-activity", post(handlers::whale_activity))
        .route("/api/agents/network-status", get(handlers::network_agent))
        .route_layer(from_fn_with_state(state.gate.clone(), x402_middleware));

    Router::new()
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/system/status", get(handlers::get_system_status))
        // Agent manifest
        .route("/api/agents", get(handlers::list_agents))
        // Pricing and rate limits
        .route("/api/pricing", get(handlers::list_pricing))
        .route(
            "/api/pricing/discounts",
            get(handlers::list_discount_rules).post(handlers::add_discount_rule),
        )
        .route(
            "/api/pricing/discounts/:id",
            delete(handlers::remove_discount_rule),
        )
        .route("/api/pricing/:agent", get(handlers::get_price_quote))
        .route("/api/rate-limit", get(handlers::get_rate_limit_status))
        .route("/api/rate-limit/reset", post(handlers::reset_rate_limit))
        // Network congestion
        .route("/api/network/status", get(handlers::get_network_status))
        .route("/api/network/fees", get(handlers::get_network_fees))
        .route("/api/network/samples", post(handlers::record_network_sample))
        // Market data
        .route("/api/tokens/boosted", get(handlers::get_boosted_tokens))
        .route("/api/tokens/search", get(handlers::search_tokens))
        .route("/api/tokens/:address", get(handlers::get_token))
        .route("/api/tokens/:address/history", get(handlers::get_token_history))
        .route("/api/polymarket/markets", get(handlers::get_polymarket_markets))
        // Wallet sign-in
        .route("/api/auth/challenge", post(handlers::issue_challenge))
        .route("/api/auth/verify", post(handlers::verify_signature))
        .route("/api/auth/session", get(handlers::get_wallet_session))
        .route("/api/auth/logout", post(handlers::logout))
        // Payment sessions and settlements
        .route("/api/sessions/:id", get(handlers::get_payment_session))
        .route("/api/transactions/:id", get(handlers::get_transaction))
        // Orchestrator
        .route(
            "/api/tasks",
            get(handlers::get_queue_stats).post(handlers::submit_task),
        )
        .route("/api/tasks/:id", get(handlers::get_task))
        // Watchlist and tracked wallets
        .route(
            "/api/watchlist",
            get(handlers::get_watchlist).post(handlers::add_to_watchlist),
        )
        .route("/api/watchlist/:token", delete(handlers::remove_from_watchlist))
        .route(
            "/api/tracked-wallets",
            get(handlers::get_tracked_wallets).post(handlers::track_wallet),
        )
        .route("/api/tracked-wallets/:id", delete(handlers::untrack_wallet))
        // Escrow
        .route(
            "/api/escrow",
            get(handlers::list_escrows).post(handlers::create_escrow),
        )
        .route("/api/escrow/stats", get(handlers::get_escrow_stats))
        .route("/api/escrow/:id", get(handlers::get_escrow))
        .route("/api/escrow/:id/release", post(handlers::release_escrow))
        .route("/api/escrow/:id/refund", post(handlers::refund_escrow))
        .route("/api/escrow/:id/dispute", post(handlers::dispute_escrow))
        .route("/api/escrow/:id/resolve", post(handlers::resolve_escrow))
        // Whale trades
        .route("/api/whale-trades", post(handlers::ingest_whale_trade))
        .merge(paid)
        // Add state and CORS
        .with_state(state)
        .layer(cors)
}
