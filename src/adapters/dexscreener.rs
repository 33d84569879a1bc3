//! DexScreener REST adapter
//!
//! Read-only pair and boost data for Solana tokens, cached per endpoint.

use super::http::{fetch_with_retry, TtlCache};
use crate::config::MarketDataConfig;
use crate::error::{ModexoError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub const SOLANA_CHAIN_ID: &str = "solana";

// ==================== DexScreener Types ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRef {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxnCount {
    #[serde(default)]
    pub buys: u64,
    #[serde(default)]
    pub sells: u64,
}

impl TxnCount {
    pub fn total(&self) -> u64 {
        self.buys + self.sells
    }

    /// Share of buys in [0, 1]; 0.5 when there were no trades
    pub fn buy_ratio(&self) -> f64 {
        match self.total() {
            0 => 0.5,
            total => self.buys as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TxnWindows {
    #[serde(default)]
    pub m5: TxnCount,
    #[serde(default)]
    pub h1: TxnCount,
    #[serde(default)]
    pub h6: TxnCount,
    #[serde(default)]
    pub h24: TxnCount,
}

/// Per-window numbers (volume in USD, price change in percent)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WindowStats {
    #[serde(default)]
    pub m5: f64,
    #[serde(default)]
    pub h1: f64,
    #[serde(default)]
    pub h6: f64,
    #[serde(default)]
    pub h24: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Liquidity {
    #[serde(default)]
    pub usd: f64,
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub quote: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PairBoosts {
    #[serde(default)]
    pub active: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    pub chain_id: String,
    #[serde(default)]
    pub dex_id: String,
    #[serde(default)]
    pub url: String,
    pub pair_address: String,
    pub base_token: TokenRef,
    pub quote_token: TokenRef,
    #[serde(default)]
    pub price_native: Option<String>,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub txns: TxnWindows,
    #[serde(default)]
    pub volume: WindowStats,
    #[serde(default)]
    pub price_change: WindowStats,
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
    #[serde(default)]
    pub fdv: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// Creation time in unix milliseconds
    #[serde(default)]
    pub pair_created_at: Option<i64>,
    #[serde(default)]
    pub boosts: Option<PairBoosts>,
}

impl DexPair {
    pub fn price_usd(&self) -> f64 {
        self.price_usd
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn liquidity_usd(&self) -> f64 {
        self.liquidity.map(|l| l.usd).unwrap_or(0.0)
    }

    /// Pair age in hours at `now_ms`, if the creation time is known
    pub fn age_hours(&self, now_ms: i64) -> Option<f64> {
        self.pair_created_at
            .map(|created| ((now_ms - created).max(0) as f64) / 3_600_000.0)
    }

    pub fn active_boosts(&self) -> u32 {
        self.boosts.map(|b| b.active).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostedToken {
    pub chain_id: String,
    pub token_address: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub total_amount: f64,
}

// ==================== Source Trait ====================

/// Token market data used by the analysis endpoints
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Solana pairs for a token, most liquid first
    async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>>;

    async fn pair(&self, pair_address: &str) -> Result<Option<DexPair>>;

    async fn search(&self, query: &str) -> Result<Vec<DexPair>>;

    /// Currently boosted Solana tokens
    async fn boosted_tokens(&self) -> Result<Vec<BoostedToken>>;

    /// The most liquid pair of a token
    async fn best_pair(&self, token_address: &str) -> Result<Option<DexPair>> {
        Ok(self.token_pairs(token_address).await?.into_iter().next())
    }

    /// Drop expired cache entries; returns how many were removed
    fn purge_expired(&self) -> usize {
        0
    }
}

fn solana_by_liquidity(pairs: Option<Vec<DexPair>>) -> Vec<DexPair> {
    let mut pairs: Vec<DexPair> = pairs
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.chain_id == SOLANA_CHAIN_ID)
        .collect();
    pairs.sort_by(|a, b| b.liquidity_usd().total_cmp(&a.liquidity_usd()));
    pairs
}

// ==================== Implementation ====================

pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    pair_cache: TtlCache<Vec<DexPair>>,
    search_cache: TtlCache<Vec<DexPair>>,
    boosted_cache: TtlCache<Vec<BoostedToken>>,
}

impl DexScreenerClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModexoError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.dexscreener_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_base_delay_ms),
            pair_cache: TtlCache::new(Duration::from_secs(config.pair_cache_ttl_secs)),
            search_cache: TtlCache::new(Duration::from_secs(config.search_cache_ttl_secs)),
            boosted_cache: TtlCache::new(Duration::from_secs(config.boosted_cache_ttl_secs)),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        fetch_with_retry(&self.http, &url, self.max_retries, self.retry_delay).await
    }

    /// Drop expired cache entries
    pub fn purge_caches(&self) -> usize {
        self.pair_cache.purge_expired()
            + self.search_cache.purge_expired()
            + self.boosted_cache.purge_expired()
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerClient {
    #[instrument(skip(self))]
    async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>> {
        let key = format!("token:{}", token_address);
        if let Some(cached) = self.pair_cache.get(&key) {
            return Ok(cached);
        }

        let resp: PairsResponse = self
            .get(&format!("/latest/dex/tokens/{}", token_address))
            .await?;
        let pairs = solana_by_liquidity(resp.pairs);
        debug!("{} Solana pairs for {}", pairs.len(), token_address);
        self.pair_cache.insert(key, pairs.clone());
        Ok(pairs)
    }

    #[instrument(skip(self))]
    async fn pair(&self, pair_address: &str) -> Result<Option<DexPair>> {
        let key = format!("pair:{}", pair_address);
        if let Some(cached) = self.pair_cache.get(&key) {
            return Ok(cached.into_iter().next());
        }

        let resp: PairsResponse = self
            .get(&format!("/latest/dex/pairs/{}/{}", SOLANA_CHAIN_ID, pair_address))
            .await?;
        let pairs = solana_by_liquidity(resp.pairs);
        self.pair_cache.insert(key, pairs.clone());
        Ok(pairs.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> Result<Vec<DexPair>> {
        let query = query.trim().to_lowercase();
        if let Some(cached) = self.search_cache.get(&query) {
            return Ok(cached);
        }

        let mut url = url::Url::parse(&format!("{}/latest/dex/search", self.base_url))
            .map_err(|e| ModexoError::Internal(format!("invalid DexScreener URL: {}", e)))?;
        url.query_pairs_mut().append_pair("q", &query);

        let resp: PairsResponse =
            fetch_with_retry(&self.http, url.as_str(), self.max_retries, self.retry_delay).await?;
        let pairs = solana_by_liquidity(resp.pairs);
        self.search_cache.insert(query, pairs.clone());
        Ok(pairs)
    }

    #[instrument(skip(self))]
    async fn boosted_tokens(&self) -> Result<Vec<BoostedToken>> {
        if let Some(cached) = self.boosted_cache.get("latest") {
            return Ok(cached);
        }

        let tokens: Vec<BoostedToken> = self.get("/token-boosts/latest/v1").await?;
        let tokens: Vec<BoostedToken> = tokens
            .into_iter()
            .filter(|t| t.chain_id == SOLANA_CHAIN_ID)
            .collect();
        self.boosted_cache.insert("latest", tokens.clone());
        Ok(tokens)
    }

    fn purge_expired(&self) -> usize {
        self.purge_caches()
    }
}
