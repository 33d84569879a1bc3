//! End-to-end checks of the HTTP surface: x402 challenge and settlement,
//! rate limiting, wallet sign-in, escrow, admin auth and the task queue.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use modexo::adapters::{
    BoostedToken, DexPair, GammaMarket, MarketDataSource, MemoryRepository, PredictionMarketSource,
};
use modexo::api::{create_router, AdminAuth, AppState};
use modexo::config::AppConfig;
use modexo::error::Result;
use modexo::x402::{
    Facilitator, PaymentRequirements, SettleResponse, VerifyResponse, PAYMENT_HEADER,
    PAYMENT_RESPONSE_HEADER, PAYMENT_SESSION_HEADER,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const TOKEN: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
const PAYER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const BENEFICIARY: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
const ADMIN_TOKEN: &str = "integration-admin-secret";

struct OnePairMarket {
    pair: DexPair,
}

#[async_trait]
impl MarketDataSource for OnePairMarket {
    async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>> {
        if token_address == self.pair.base_token.address {
            Ok(vec![self.pair.clone()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn pair(&self, pair_address: &str) -> Result<Option<DexPair>> {
        Ok(Some(self.pair.clone()).filter(|p| p.pair_address == pair_address))
    }

    async fn search(&self, _query: &str) -> Result<Vec<DexPair>> {
        Ok(vec![self.pair.clone()])
    }

    async fn boosted_tokens(&self) -> Result<Vec<BoostedToken>> {
        Ok(Vec::new())
    }
}

struct NoMarkets;

#[async_trait]
impl PredictionMarketSource for NoMarkets {
    async fn active_markets(&self, _limit: usize) -> Result<Vec<GammaMarket>> {
        Ok(Vec::new())
    }
}

/// Accepts every payment and settles it as `5settled`
struct AcceptingFacilitator;

#[async_trait]
impl Facilitator for AcceptingFacilitator {
    async fn verify(
        &self,
        _payload: &Value,
        _requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse> {
        Ok(VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: Some(PAYER.to_string()),
        })
    }

    async fn settle(
        &self,
        _payload: &Value,
        _requirements: &PaymentRequirements,
    ) -> Result<SettleResponse> {
        Ok(SettleResponse {
            success: true,
            error_reason: None,
            transaction: Some("5settled".to_string()),
            network: Some("solana".to_string()),
            payer: Some(PAYER.to_string()),
        })
    }
}

fn bonk_pair() -> DexPair {
    serde_json::from_value(json!({
        "chainId": "solana",
        "dexId": "raydium",
        "pairAddress": "BONK-pair",
        "baseToken": { "address": TOKEN, "name": "Bonk", "symbol": "BONK" },
        "quoteToken": { "address": "So11111111111111111111111111111111111111112", "symbol": "SOL" },
        "priceUsd": "0.00002",
        "volume": { "h1": 10000.0, "h6": 40000.0, "h24": 150000.0 },
        "liquidity": { "usd": 500000.0 },
        "pairCreatedAt": 0
    }))
    .unwrap()
}

async fn build_state(config: AppConfig) -> AppState {
    AppState::build(
        config,
        Arc::new(OnePairMarket { pair: bonk_pair() }),
        Arc::new(NoMarkets),
        Arc::new(MemoryRepository::new()),
        Arc::new(AcceptingFacilitator),
        AdminAuth::new(Some(ADMIN_TOKEN.to_string()), true),
    )
    .await
}

async fn app() -> (AppState, Router) {
    let state = build_state(AppConfig::default()).await;
    let router = create_router(state.clone());
    (state, router)
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

fn with_admin(mut request: Request<Body>) -> Request<Body> {
    request
        .headers_mut()
        .insert("x-modexo-admin-token", ADMIN_TOKEN.parse().unwrap());
    request
}

/// Sign in with a deterministic key; returns (wallet, bearer token)
async fn sign_in(router: &Router, seed: u8) -> (String, String) {
    let key = SigningKey::from_bytes(&[seed; 32]);
    let wallet = bs58::encode(key.verifying_key().as_bytes()).into_string();

    let challenge = send(router, post_json("/api/auth/challenge", json!({ "wallet": wallet }))).await;
    assert_eq!(challenge.status(), StatusCode::OK);
    let challenge = json_body(challenge).await;
    let message = challenge["message"].as_str().unwrap();
    assert!(message.contains(&wallet));

    let signature = bs58::encode(key.sign(message.as_bytes()).to_bytes()).into_string();
    let verified = send(
        router,
        post_json("/api/auth/verify", json!({ "wallet": wallet, "signature": signature })),
    )
    .await;
    assert_eq!(verified.status(), StatusCode::OK);
    let token = json_body(verified).await["token"].as_str().unwrap().to_string();
    (wallet, token)
}

#[tokio::test]
async fn health_reports_ok() {
    let (_, router) = app().await;
    let response = send(&router, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn agent_manifest_lists_paid_and_free_agents() {
    let (_, router) = app().await;
    let body = json_body(send(&router, get("/api/agents")).await).await;
    let text = body.to_string();
    assert!(text.contains("token-safety"));
    assert!(text.contains("network-status"));
}

#[tokio::test]
async fn paid_agent_without_payment_gets_challenge() {
    let (_, router) = app().await;
    let response = send(
        &router,
        post_json("/api/agents/token-safety", json!({ "address": TOKEN })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let body = json_body(response).await;
    assert_eq!(body["x402Version"], 1);
    let accepts = &body["accepts"][0];
    assert_eq!(accepts["scheme"], "exact");
    assert_eq!(accepts["maxAmountRequired"], "10000");
    assert_eq!(accepts["resource"], "/api/agents/token-safety");
    assert!(accepts["extra"]["sessionId"].as_str().is_some());
}

#[tokio::test]
async fn paid_agent_settles_and_consumes_session() {
    let (state, router) = app().await;

    let challenge = json_body(
        send(
            &router,
            post_json("/api/agents/token-safety", json!({ "address": TOKEN })),
        )
        .await,
    )
    .await;
    let session_id = challenge["accepts"][0]["extra"]["sessionId"]
        .as_str()
        .unwrap()
        .to_string();

    let payment = STANDARD.encode(
        json!({ "x402Version": 1, "scheme": "exact", "network": "solana", "payload": { "transaction": "AQ==" } })
            .to_string(),
    );
    let mut request = post_json("/api/agents/token-safety", json!({ "address": TOKEN }));
    request
        .headers_mut()
        .insert(PAYMENT_HEADER, payment.parse().unwrap());
    request
        .headers_mut()
        .insert(PAYMENT_SESSION_HEADER, session_id.parse().unwrap());

    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let settlement = response
        .headers()
        .get(PAYMENT_RESPONSE_HEADER)
        .expect("settlement header")
        .to_str()
        .unwrap()
        .to_string();
    let settlement: Value = serde_json::from_slice(&STANDARD.decode(settlement).unwrap()).unwrap();
    assert_eq!(settlement["success"], true);
    assert_eq!(settlement["transaction"], "5settled");

    let overview = json_body(response).await;
    assert_eq!(overview["pairAddress"], "BONK-pair");

    let session = json_body(send(&router, get(&format!("/api/sessions/{}", session_id))).await).await;
    assert_eq!(session["status"], "used");
    assert_eq!(session["transaction"], "5settled");

    let snapshot = state.metrics.snapshot();
    assert_eq!(snapshot.payments_settled, 1);
}

#[tokio::test]
async fn free_agent_skips_payment() {
    let (_, router) = app().await;
    let response = send(&router, get("/api/agents/network-status?urgency=high")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body.get("fees").is_some());
}

#[tokio::test]
async fn request_limit_answers_429() {
    let mut config = AppConfig::default();
    config.rate_limit.request_limit = 2;
    let router = create_router(build_state(config).await);

    let request = || {
        Request::builder()
            .uri("/api/agents/network-status")
            .header("x-forwarded-for", "203.0.113.9")
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&router, request()).await.status(), StatusCode::OK);
    assert_eq!(send(&router, request()).await.status(), StatusCode::OK);

    let limited = send(&router, request()).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().get("retry-after").is_some());

    // Other callers keep their own budget
    let other = Request::builder()
        .uri("/api/agents/network-status")
        .header("x-forwarded-for", "198.51.100.4")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn wallet_sign_in_unlocks_watchlist() {
    let (_, router) = app().await;

    assert_eq!(
        send(&router, get("/api/watchlist")).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let (wallet, token) = sign_in(&router, 7).await;

    let session = json_body(send(&router, with_bearer(get("/api/auth/session"), &token)).await).await;
    assert_eq!(session["wallet"], wallet);

    let added = send(
        &router,
        with_bearer(
            post_json("/api/watchlist", json!({ "tokenAddress": TOKEN, "note": "watch" })),
            &token,
        ),
    )
    .await;
    assert_eq!(added.status(), StatusCode::CREATED);

    let list = json_body(send(&router, with_bearer(get("/api/watchlist"), &token)).await).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let logout = send(&router, with_bearer(post_json("/api/auth/logout", json!({})), &token)).await;
    assert_eq!(logout.status(), StatusCode::OK);
    assert_eq!(
        send(&router, with_bearer(get("/api/watchlist"), &token))
            .await
            .status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn wrong_signature_is_rejected() {
    let (_, router) = app().await;
    let key = SigningKey::from_bytes(&[9; 32]);
    let wallet = bs58::encode(key.verifying_key().as_bytes()).into_string();

    send(&router, post_json("/api/auth/challenge", json!({ "wallet": wallet }))).await;
    let forged = bs58::encode(key.sign(b"something else").to_bytes()).into_string();
    let response = send(
        &router,
        post_json("/api/auth/verify", json!({ "wallet": wallet, "signature": forged })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn escrow_refund_by_depositor() {
    let (_, router) = app().await;
    let (wallet, token) = sign_in(&router, 11).await;

    let created = send(
        &router,
        with_bearer(
            post_json(
                "/api/escrow",
                json!({ "beneficiary": BENEFICIARY, "amount": "5", "condition": "deliver report" }),
            ),
            &token,
        ),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let escrow = json_body(created).await;
    assert_eq!(escrow["depositor"], wallet);
    assert_eq!(escrow["status"], "held");
    let id = escrow["id"].as_str().unwrap().to_string();

    let refunded = send(
        &router,
        with_bearer(post_json(&format!("/api/escrow/{}/refund", id), json!({})), &token),
    )
    .await;
    assert_eq!(refunded.status(), StatusCode::OK);
    assert_eq!(json_body(refunded).await["status"], "refunded");

    let again = send(
        &router,
        with_bearer(post_json(&format!("/api/escrow/{}/refund", id), json!({})), &token),
    )
    .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);

    // Outsiders cannot see it
    let (_, outsider) = sign_in(&router, 12).await;
    let hidden = send(
        &router,
        with_bearer(get(&format!("/api/escrow/{}", id)), &outsider),
    )
    .await;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let (_, router) = app().await;

    assert_eq!(
        send(&router, get("/api/escrow/stats")).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let request = Request::builder()
        .uri("/api/escrow/stats")
        .header("x-modexo-admin-token", ADMIN_TOKEN)
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&router, request).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_unavailable_without_configured_token() {
    let state = AppState::build(
        AppConfig::default(),
        Arc::new(OnePairMarket { pair: bonk_pair() }),
        Arc::new(NoMarkets),
        Arc::new(MemoryRepository::new()),
        Arc::new(AcceptingFacilitator),
        AdminAuth::new(None, true),
    )
    .await;
    let router = create_router(state);
    assert_eq!(
        send(&router, get("/api/escrow/stats")).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn submitted_task_runs_to_completion() {
    let (state, router) = app().await;

    let unknown = send(&router, post_json("/api/tasks", json!({ "agentId": "nope" }))).await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let submitted = send(
        &router,
        with_admin(post_json(
            "/api/tasks",
            json!({ "agentId": "token-safety", "input": { "address": TOKEN }, "priority": "high" }),
        )),
    )
    .await;
    assert_eq!(submitted.status(), StatusCode::ACCEPTED);
    let task = json_body(submitted).await;
    assert_eq!(task["status"], "queued");
    let id = task["id"].as_str().unwrap().to_string();

    let ran = state.orchestrator.run_next().await.expect("task ran");
    assert_eq!(ran.id.to_string(), id);

    let done = json_body(send(&router, get(&format!("/api/tasks/{}", id))).await).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"]["pairAddress"], "BONK-pair");

    let bad_id = send(&router, get("/api/tasks/not-a-uuid")).await;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queued_paid_agents_need_admin_token() {
    let (state, router) = app().await;

    let refused = send(
        &router,
        post_json(
            "/api/tasks",
            json!({ "agentId": "token-safety", "input": { "address": TOKEN } }),
        ),
    )
    .await;
    assert_eq!(refused.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.orchestrator.queue_stats().await.current_size, 0);
    assert!(state.orchestrator.run_next().await.is_none());

    // Free agents stay open to anyone
    let free = send(
        &router,
        post_json("/api/tasks", json!({ "agentId": "network-status" })),
    )
    .await;
    assert_eq!(free.status(), StatusCode::ACCEPTED);
    assert_eq!(state.orchestrator.queue_stats().await.current_size, 1);
}
