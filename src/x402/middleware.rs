//! x402 payment gate
//!
//! axum middleware placed in front of the paid agent routes. A request for an
//! agent resource is rate limited, priced, and either answered with a 402
//! challenge or verified with the facilitator, executed, and settled.

use super::facilitator::Facilitator;
use super::types::{
    decode_payment_header, encode_settlement_header, PaymentRequiredResponse,
    PaymentRequirements, SettleResponse, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER,
    PAYMENT_SESSION_HEADER,
};
use crate::agents::registry::{AgentDescriptor, AgentRegistry};
use crate::config::X402Config;
use crate::payment::{
    ActionType, PaymentSession, PaymentSessionStore, PricingEngine, RateLimitDecision,
    RateLimiter, SessionStatus, TransactionTracker,
};
use crate::services::metrics::Metrics;
use crate::validation::is_valid_solana_address;
use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const WALLET_HEADER: &str = "x-wallet-address";

/// Attached to the request extensions of a verified paid call
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub session_id: String,
    pub agent_id: String,
    pub amount: Decimal,
    pub payer: Option<String>,
}

/// Collaborators of the payment gate
pub struct PaymentGate {
    pub config: X402Config,
    pub registry: Arc<AgentRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub pricing: Arc<PricingEngine>,
    pub sessions: Arc<PaymentSessionStore>,
    pub transactions: Arc<TransactionTracker>,
    pub facilitator: Arc<dyn Facilitator>,
    pub metrics: Arc<Metrics>,
}

/// Wallet named by the caller, if it is a well-formed address
fn wallet_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(WALLET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|w| is_valid_solana_address(w))
        .map(str::to_string)
}

/// Rate limit key: the wallet, else the forwarded client address
fn caller_key(headers: &HeaderMap) -> String {
    if let Some(wallet) = wallet_header(headers) {
        return wallet;
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn x402_middleware(
    State(gate): State<Arc<PaymentGate>>,
    req: Request,
    next: Next,
) -> Response {
    gate.process(req, next).await
}

impl PaymentGate {
    pub async fn process(&self, mut req: Request, next: Next) -> Response {
        let path = req.uri().path().to_string();
        let Some(agent) = self.registry.find_by_resource(&path).cloned() else {
            return next.run(req).await;
        };

        let caller = caller_key(req.headers());
        let wallet = wallet_header(req.headers());

        if let Some(denied) = self.check_rate(&caller, ActionType::Request).await {
            return denied;
        }

        let price = match self
            .pricing
            .calculate_price(&agent.id, wallet.as_deref(), 1)
            .await
        {
            Some(quote) => quote.final_price,
            None => agent.price_usd,
        };
        if price.is_zero() {
            self.metrics.inc_free_calls();
            return next.run(req).await;
        }

        let Some(header) = header_str(req.headers(), PAYMENT_HEADER) else {
            let session = self
                .sessions
                .create_session(wallet.as_deref(), &agent.id, &path, price)
                .await;
            self.metrics.inc_challenges();
            debug!("402 challenge for {} (session {})", agent.id, session.id);
            return self.payment_required(
                self.requirements(&agent, price, &session.id),
                "X-PAYMENT header is required".to_string(),
            );
        };

        if let Some(denied) = self.check_rate(&caller, ActionType::Payment).await {
            return denied;
        }

        let session = self
            .resolve_session(req.headers(), &agent, wallet.as_deref(), &path, price)
            .await;
        let requirements = self.requirements(&agent, price, &session.id);

        let payload = match decode_payment_header(&header) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.inc_payment_failures();
                return self.payment_required(requirements, format!("invalid X-PAYMENT header: {}", e));
            }
        };

        let verification = match self.facilitator.verify(&payload, &requirements).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Facilitator verify failed for {}: {}", agent.id, e);
                self.metrics.inc_payment_failures();
                return self.payment_required(requirements, format!("payment verification failed: {}", e));
            }
        };
        if !verification.is_valid {
            self.metrics.inc_payment_failures();
            let reason = verification
                .invalid_reason
                .unwrap_or_else(|| "payment rejected by facilitator".to_string());
            return self.payment_required(requirements, reason);
        }
        self.metrics.inc_verified();

        // A denied execution leaves the session pending for a retry
        if let Some(denied) = self.check_rate(&caller, ActionType::Execution).await {
            return denied;
        }

        if !self.sessions.mark_session_paid(&session.id, None).await {
            return self.payment_required(
                requirements,
                "payment session expired or already used".to_string(),
            );
        }
        self.transactions.track(&session.id).await;

        let payer = verification.payer.clone().or(wallet);
        req.extensions_mut().insert(PaymentContext {
            session_id: session.id.clone(),
            agent_id: agent.id.clone(),
            amount: price,
            payer: payer.clone(),
        });

        let mut response = next.run(req).await;
        if !response.status().is_success() {
            debug!(
                "Handler for {} returned {}, skipping settlement",
                agent.id,
                response.status()
            );
            return response;
        }

        match self.settle(&payload, &requirements, &session.id).await {
            Ok(settlement) => {
                self.sessions.mark_session_used(&session.id).await;
                if let Some(tx) = settlement.transaction.as_deref() {
                    self.sessions.set_transaction(&session.id, tx).await;
                }
                self.transactions
                    .confirm(&session.id, settlement.transaction.as_deref())
                    .await;
                self.pricing.record_request(&agent.id).await;
                if let Some(buyer) = settlement.payer.as_deref().or(payer.as_deref()) {
                    self.pricing.record_purchase(buyer).await;
                }
                self.metrics.inc_settled();
                info!("Settled {} for {} (session {})", price, agent.id, session.id);

                match encode_settlement_header(&settlement)
                    .ok()
                    .and_then(|h| HeaderValue::from_str(&h).ok())
                {
                    Some(value) => {
                        response.headers_mut().insert(PAYMENT_RESPONSE_HEADER, value);
                    }
                    None => warn!("Could not encode settlement header for {}", session.id),
                }
                response
            }
            Err(reason) => {
                self.metrics.inc_payment_failures();
                self.payment_required(requirements, reason)
            }
        }
    }

    /// Settle with the facilitator, retrying transient failures
    async fn settle(
        &self,
        payload: &Value,
        requirements: &PaymentRequirements,
        session_id: &str,
    ) -> std::result::Result<SettleResponse, String> {
        loop {
            match self.facilitator.settle(payload, requirements).await {
                Ok(settlement) if settlement.success => return Ok(settlement),
                Ok(settlement) => {
                    let reason = settlement
                        .error_reason
                        .unwrap_or_else(|| "settlement rejected by facilitator".to_string());
                    self.transactions.fail(session_id, &reason).await;
                    return Err(reason);
                }
                Err(e) => {
                    let reason = format!("settlement failed: {}", e);
                    self.transactions.fail(session_id, &reason).await;
                    if e.is_retryable() && self.transactions.retry(session_id).await {
                        warn!("Retrying settlement for session {}: {}", session_id, e);
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        continue;
                    }
                    return Err(reason);
                }
            }
        }
    }

    /// Reuse the pending session named by the client, else open a new one
    async fn resolve_session(
        &self,
        headers: &HeaderMap,
        agent: &AgentDescriptor,
        wallet: Option<&str>,
        resource: &str,
        price: Decimal,
    ) -> PaymentSession {
        if let Some(id) = header_str(headers, PAYMENT_SESSION_HEADER) {
            if let Some(existing) = self.sessions.get_session(&id).await {
                if existing.status == SessionStatus::Pending && existing.agent_id == agent.id {
                    return existing;
                }
                debug!("Ignoring session {} ({:?})", id, existing.status);
            }
        }
        self.sessions
            .create_session(wallet, &agent.id, resource, price)
            .await
    }

    fn requirements(
        &self,
        agent: &AgentDescriptor,
        price: Decimal,
        session_id: &str,
    ) -> PaymentRequirements {
        PaymentRequirements::new(
            &self.config,
            price,
            &agent.resource,
            &agent.description,
            Some(json!({ "input": agent.input_schema, "output": agent.output_schema })),
            session_id,
        )
    }

    async fn check_rate(&self, caller: &str, action: ActionType) -> Option<Response> {
        let decision = self.rate_limiter.check(caller, action).await;
        if decision.allowed {
            return None;
        }
        self.metrics.inc_rate_limited();
        Some(rate_limited_response(&decision))
    }

    fn payment_required(&self, requirements: PaymentRequirements, error: String) -> Response {
        let body = PaymentRequiredResponse {
            x402_version: self.config.x402_version,
            error,
            accepts: vec![requirements],
        };
        (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
    }
}

pub fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let retry_after = decision.retry_after_secs.max(1);
    let body = Json(json!({
        "error": format!("rate limit exceeded for {}", decision.action),
        "limit": decision.limit,
        "retryAfter": retry_after,
        "blockedUntil": decision.blocked_until,
    }));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::error::ModexoError;
    use crate::payment::TransactionStatus;
    use crate::x402::facilitator::MockFacilitator;
    use crate::x402::types::VerifyResponse;
    use axum::body::{to_bytes, Body};
    use axum::routing::{get, post};
    use axum::{middleware, Router};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use tower::ServiceExt;

    const PAYER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    async fn gate_with(facilitator: MockFacilitator, limits: RateLimitConfig) -> Arc<PaymentGate> {
        let registry = Arc::new(AgentRegistry::builtin());
        let pricing = Arc::new(PricingEngine::with_defaults());
        registry.register_pricing(&pricing).await;

        Arc::new(PaymentGate {
            config: X402Config::default(),
            registry,
            rate_limiter: Arc::new(RateLimiter::new(limits)),
            pricing,
            sessions: Arc::new(PaymentSessionStore::with_defaults()),
            transactions: Arc::new(TransactionTracker::with_defaults()),
            facilitator: Arc::new(facilitator),
            metrics: Arc::new(Metrics::new()),
        })
    }

    fn app(gate: Arc<PaymentGate>) -> Router {
        Router::new()
            .route(
                "/api/agents/token-safety",
                post(|| async { Json(json!({ "score": 80 })) }),
            )
            .route("/api/agents/network-status", get(|| async { "free" }))
            .route(
                "/api/agents/smart-entry",
                post(|| async { (StatusCode::BAD_REQUEST, "bad input") }),
            )
            .layer(middleware::from_fn_with_state(gate, x402_middleware))
    }

    fn payment_header() -> String {
        STANDARD.encode(br#"{"x402Version":1,"scheme":"exact","network":"solana","payload":{"transaction":"AQ=="}}"#)
    }

    fn valid() -> VerifyResponse {
        VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: Some(PAYER.to_string()),
        }
    }

    fn settled() -> SettleResponse {
        SettleResponse {
            success: true,
            transaction: Some("5settled".to_string()),
            network: Some("solana".to_string()),
            payer: Some(PAYER.to_string()),
            ..Default::default()
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn only_session(gate: &PaymentGate) -> PaymentSession {
        let sessions = gate.sessions.all().await;
        assert_eq!(sessions.len(), 1);
        sessions.into_iter().next().unwrap()
    }

    fn paid_request(uri: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(PAYMENT_HEADER, payment_header())
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_header_returns_challenge() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().never();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/agents/token-safety")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let body = json_body(response).await;
        assert_eq!(body["x402Version"], 1);
        let accepts = &body["accepts"][0];
        assert_eq!(accepts["maxAmountRequired"], "10000");
        assert_eq!(accepts["resource"], "/api/agents/token-safety");
        assert_eq!(accepts["payTo"], X402Config::default().pay_to);

        let session_id = accepts["extra"]["sessionId"].as_str().unwrap();
        let session = gate.sessions.get_session(session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(gate.metrics.snapshot().challenges_issued, 1);
    }

    #[tokio::test]
    async fn test_free_agent_passes_through() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().never();
        facilitator.expect_settle().never();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/agents/network-status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gate.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn test_verified_payment_is_settled() {
        let mut facilitator = MockFacilitator::new();
        facilitator
            .expect_verify()
            .times(1)
            .withf(|payload, req| payload["scheme"] == "exact" && req.max_amount_required == "10000")
            .returning(|_, _| Ok(valid()));
        facilitator
            .expect_settle()
            .times(1)
            .returning(|_, _| Ok(settled()));
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate.clone())
            .oneshot(paid_request("/api/agents/token-safety"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let header = response
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let settlement: SettleResponse =
            serde_json::from_slice(&STANDARD.decode(header).unwrap()).unwrap();
        assert_eq!(settlement.transaction.as_deref(), Some("5settled"));

        assert_eq!(gate.sessions.len().await, 1);
        assert_eq!(
            gate.transactions.count_by_status(TransactionStatus::Confirmed).await,
            1
        );
        assert_eq!(gate.pricing.wallet_stats(PAYER).await.unwrap().purchases, 1);
        assert_eq!(gate.metrics.snapshot().payments_settled, 1);
    }

    #[tokio::test]
    async fn test_invalid_payment_is_rejected() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().returning(|_, _| {
            Ok(VerifyResponse {
                is_valid: false,
                invalid_reason: Some("insufficient_funds".to_string()),
                payer: None,
            })
        });
        facilitator.expect_settle().never();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate)
            .oneshot(paid_request("/api/agents/token-safety"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json_body(response).await["error"], "insufficient_funds");
    }

    #[tokio::test]
    async fn test_malformed_header_is_rejected() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().never();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/agents/token-safety")
                    .header(PAYMENT_HEADER, "***")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("invalid X-PAYMENT header"));
    }

    #[tokio::test]
    async fn test_failed_handler_is_not_settled() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().returning(|_, _| Ok(valid()));
        facilitator.expect_settle().never();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate.clone())
            .oneshot(paid_request("/api/agents/smart-entry"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(PAYMENT_RESPONSE_HEADER).is_none());
        assert_eq!(
            gate.transactions.count_by_status(TransactionStatus::Pending).await,
            1
        );

        // The unsettled session is paid, then reaped once past retention
        let session = only_session(&gate).await;
        assert_eq!(session.status, SessionStatus::Paid);
        let later = chrono::Utc::now() + chrono::Duration::days(365);
        assert_eq!(gate.sessions.sweep_at(later).await, (0, 1));
        assert!(gate.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_execution_limit_keeps_session_pending() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().returning(|_, _| Ok(valid()));
        facilitator.expect_settle().never();
        let limits = RateLimitConfig {
            execution_limit: 1,
            ..RateLimitConfig::default()
        };
        let gate = gate_with(facilitator, limits).await;
        gate.rate_limiter.check("anonymous", ActionType::Execution).await;

        let response = app(gate.clone())
            .oneshot(paid_request("/api/agents/token-safety"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let session = only_session(&gate).await;
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(
            gate.transactions.count_by_status(TransactionStatus::Pending).await,
            0
        );

        // Lapsed pending sessions expire and are reaped in turn
        let later = chrono::Utc::now() + chrono::Duration::days(365);
        assert_eq!(gate.sessions.sweep_at(later).await, (1, 1));
    }

    #[tokio::test]
    async fn test_settle_rejection_returns_402() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().returning(|_, _| Ok(valid()));
        facilitator.expect_settle().times(1).returning(|_, _| {
            Ok(SettleResponse {
                success: false,
                error_reason: Some("transaction_failed".to_string()),
                ..Default::default()
            })
        });
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate.clone())
            .oneshot(paid_request("/api/agents/token-safety"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json_body(response).await["error"], "transaction_failed");
        assert_eq!(
            gate.transactions.count_by_status(TransactionStatus::Failed).await,
            1
        );

        let session = only_session(&gate).await;
        assert_eq!(session.status, SessionStatus::Paid);
        let later = chrono::Utc::now() + chrono::Duration::days(365);
        assert_eq!(gate.sessions.sweep_at(later).await, (0, 1));
    }

    #[tokio::test]
    async fn test_facilitator_outage_returns_402() {
        let mut facilitator = MockFacilitator::new();
        facilitator
            .expect_verify()
            .returning(|_, _| Err(ModexoError::Facilitator("connection refused".to_string())));
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let response = app(gate)
            .oneshot(paid_request("/api/agents/token-safety"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().never();
        let limits = RateLimitConfig {
            request_limit: 1,
            ..RateLimitConfig::default()
        };
        let gate = gate_with(facilitator, limits).await;
        let router = app(gate.clone());

        let request = || {
            Request::builder()
                .method("POST")
                .uri("/api/agents/token-safety")
                .header(WALLET_HEADER, PAYER)
                .body(Body::empty())
                .unwrap()
        };

        let first = router.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::PAYMENT_REQUIRED);

        let second = router.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get(RETRY_AFTER).is_some());
        assert_eq!(gate.metrics.snapshot().rate_limited, 1);
    }

    #[tokio::test]
    async fn test_client_session_is_reused() {
        let mut facilitator = MockFacilitator::new();
        facilitator.expect_verify().returning(|_, _| Ok(valid()));
        facilitator.expect_settle().returning(|_, _| Ok(settled()));
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;

        let session = gate
            .sessions
            .create_session(None, "token-safety", "/api/agents/token-safety", rust_decimal_macros::dec!(0.01))
            .await;

        let response = app(gate.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/agents/token-safety")
                    .header(PAYMENT_HEADER, payment_header())
                    .header(PAYMENT_SESSION_HEADER, session.id.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gate.sessions.len().await, 1);
        assert_eq!(
            gate.sessions.get_session(&session.id).await.unwrap().status,
            SessionStatus::Used
        );
    }

    #[tokio::test]
    async fn test_ungated_paths_pass_through() {
        let facilitator = MockFacilitator::new();
        let gate = gate_with(facilitator, RateLimitConfig::default()).await;
        let router = Router::new()
            .route("/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(gate, x402_middleware));

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
