//! Polymarket Gamma REST adapter (market discovery only)

use super::http::{fetch_with_retry, TtlCache};
use crate::config::MarketDataConfig;
use crate::error::{ModexoError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

// ==================== Gamma API Types ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    /// JSON-encoded list, e.g. `["Yes","No"]`
    #[serde(default)]
    pub outcomes: Option<String>,
    /// JSON-encoded list of decimal strings, e.g. `["0.55","0.45"]`
    #[serde(default)]
    pub outcome_prices: Option<String>,
    #[serde(default)]
    pub volume_num: Option<f64>,
    #[serde(default)]
    pub liquidity_num: Option<f64>,
    #[serde(default, rename = "volume24hr")]
    pub volume_24hr: Option<f64>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
}

impl GammaMarket {
    pub fn outcome_names(&self) -> Vec<String> {
        self.outcomes
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    /// Outcome prices as floats; unparsable entries are dropped
    pub fn prices(&self) -> Vec<f64> {
        let raw: Vec<String> = self
            .outcome_prices
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        raw.iter().filter_map(|p| p.parse().ok()).collect()
    }
}

// ==================== Source Trait ====================

#[async_trait]
pub trait PredictionMarketSource: Send + Sync {
    /// Open markets ordered by 24h volume
    async fn active_markets(&self, limit: usize) -> Result<Vec<GammaMarket>>;

    fn purge_expired(&self) -> usize {
        0
    }
}

// ==================== Implementation ====================

pub struct GammaClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
    cache: TtlCache<Vec<GammaMarket>>,
}

impl GammaClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ModexoError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.polymarket_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_base_delay_ms),
            cache: TtlCache::new(Duration::from_secs(config.polymarket_cache_ttl_secs)),
        })
    }

    pub fn purge_cache(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[async_trait]
impl PredictionMarketSource for GammaClient {
    #[instrument(skip(self))]
    async fn active_markets(&self, limit: usize) -> Result<Vec<GammaMarket>> {
        let limit = limit.clamp(1, 100);
        let key = format!("active:{}", limit);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let url = format!(
            "{}/markets?active=true&closed=false&order=volume24hr&ascending=false&limit={}",
            self.base_url, limit
        );
        let markets: Vec<GammaMarket> =
            fetch_with_retry(&self.http, &url, self.max_retries, self.retry_delay).await?;
        let markets: Vec<GammaMarket> = markets.into_iter().filter(|m| !m.closed).collect();

        debug!("Fetched {} active Polymarket markets", markets.len());
        self.cache.insert(key, markets.clone());
        Ok(markets)
    }

    fn purge_expired(&self) -> usize {
        self.purge_cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gamma_market() {
        let markets: Vec<GammaMarket> = serde_json::from_str(
            r#"[{
                "id": "123",
                "question": "Will SOL close above $200?",
                "conditionId": "0xabc",
                "outcomes": "[\"Yes\", \"No\"]",
                "outcomePrices": "[\"0.62\", \"0.40\"]",
                "volumeNum": 150000.5,
                "liquidityNum": 20000,
                "volume24hr": 12000,
                "active": true,
                "closed": false
            }]"#,
        )
        .unwrap();

        let m = &markets[0];
        assert_eq!(m.outcome_names(), vec!["Yes", "No"]);
        assert_eq!(m.prices(), vec![0.62, 0.40]);
        assert_eq!(m.volume_24hr, Some(12000.0));
    }

    #[test]
    fn test_missing_prices() {
        let m = GammaMarket {
            outcome_prices: Some("not json".to_string()),
            ..Default::default()
        };
        assert!(m.prices().is_empty());
        assert!(GammaMarket::default().outcome_names().is_empty());
    }
}
