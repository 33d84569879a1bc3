use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapters::DexPair;
use crate::agents::{AgentDescriptor, QueueStats, TaskPriority};
use crate::analysis::Holding;
use crate::payment::{CongestionLevel, DelayRecommendation, DisputeResolution, FeeEstimate, RateLimitDecision};
use crate::services::MetricsSnapshot;

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettings {
    pub x402_version: u32,
    pub network: String,
    pub asset: String,
    pub pay_to: String,
    pub facilitator_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub agents: usize,
    pub active_escrows: usize,
    pub payment_sessions: usize,
    pub rate_limit_buckets: usize,
    pub congestion: CongestionLevel,
    pub queue: QueueStats,
    pub metrics: MetricsSnapshot,
    pub payments: PaymentSettings,
}

// ============================================================================
// Agent Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentManifest {
    pub x402_version: u32,
    pub network: String,
    pub agents: Vec<AgentDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleActivityRequest {
    pub address: String,
    #[serde(default)]
    pub min_usd: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<Holding>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UrgencyQuery {
    pub urgency: Option<String>,
}

// ============================================================================
// Pricing and Rate Limit Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct QuoteQuery {
    pub wallet: Option<String>,
    pub units: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub wallet: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatusResponse {
    pub wallet: String,
    pub limits: Vec<RateLimitDecision>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRateLimitRequest {
    pub wallet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRateLimitResponse {
    pub wallet: String,
    pub buckets_cleared: usize,
}

// ============================================================================
// Network Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesResponse {
    pub fees: FeeEstimate,
    pub recommendation: DelayRecommendation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSampleRequest {
    pub slot: u64,
    pub tps: f64,
    pub block_time_ms: f64,
}

// ============================================================================
// Token Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairsResponse {
    pub address: String,
    pub pairs: Vec<DexPair>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

// ============================================================================
// Auth Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub wallet: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub wallet: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
}

// ============================================================================
// Task Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskRequest {
    pub agent_id: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub priority: TaskPriority,
}

// ============================================================================
// Watchlist and Tracked Wallet Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistRequest {
    pub token_address: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackWalletRequest {
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

// ============================================================================
// Escrow Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateEscrowRequest {
    pub beneficiary: String,
    pub amount: Decimal,
    #[serde(default)]
    pub condition: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub resolution: DisputeResolution,
}

// ============================================================================
// Whale Trade Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTradeRequest {
    pub token_address: String,
    pub wallet: String,
    pub side: String,
    pub amount_usd: Decimal,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
