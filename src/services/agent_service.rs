//! Agent workloads shared by the paid HTTP handlers and the orchestrator
//!
//! Each operation pulls market data through the source traits, runs the pure
//! analysis functions and returns a serializable report.

use crate::adapters::{MarketDataSource, PredictionMarketSource, Repository};
use crate::agents::{AgentTask, TaskExecutor};
use crate::analysis::{
    analyze_entry, analyze_portfolio, safety_score, summarize_markets, trending_score,
    EntryAnalysis, Holding, PortfolioReport, PredictionSummary, SafetyReport, TrendingScore,
};
use crate::domain::{TokenSnapshot, TradeSide, WhaleTrade};
use crate::error::{ModexoError, Result};
use crate::payment::{CongestionMonitor, DelayRecommendation, FeeEstimate, NetworkStatus, Urgency};
use crate::validation::validate_solana_address;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TRENDING_LIMIT: usize = 10;
pub const MAX_TRENDING_LIMIT: usize = 30;
pub const DEFAULT_MARKET_LIMIT: usize = 20;
pub const MAX_MARKET_LIMIT: usize = 100;
pub const MAX_HOLDINGS: usize = 100;
pub const DEFAULT_WHALE_MIN_USD: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);
const WHALE_TRADE_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOverview {
    pub pair_address: String,
    pub dex_id: String,
    pub price_usd: f64,
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub market_cap: Option<f64>,
    pub safety: SafetyReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleActivity {
    pub token_address: String,
    pub min_usd: Decimal,
    pub trades: Vec<WhaleTrade>,
    pub buy_volume_usd: Decimal,
    pub sell_volume_usd: Decimal,
    pub net_flow_usd: Decimal,
    pub unique_wallets: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkReport {
    pub status: NetworkStatus,
    pub fees: FeeEstimate,
    pub recommendation: DelayRecommendation,
}

/// Inputs accepted by the orchestrator for each agent
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressInput {
    address: String,
    #[serde(default)]
    min_usd: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitInput {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    urgency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortfolioInput {
    holdings: Vec<Holding>,
}

pub struct AgentService {
    market: Arc<dyn MarketDataSource>,
    predictions: Arc<dyn PredictionMarketSource>,
    repository: Arc<dyn Repository>,
    network: Arc<CongestionMonitor>,
}

impl AgentService {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        predictions: Arc<dyn PredictionMarketSource>,
        repository: Arc<dyn Repository>,
        network: Arc<CongestionMonitor>,
    ) -> Self {
        Self {
            market,
            predictions,
            repository,
            network,
        }
    }

    pub fn market(&self) -> &Arc<dyn MarketDataSource> {
        &self.market
    }

    /// Safety report on the most liquid pair; a snapshot is stored best-effort
    pub async fn token_safety(&self, address: &str) -> Result<TokenOverview> {
        validate_solana_address(address)?;
        let pair = self
            .market
            .best_pair(address)
            .await?
            .ok_or_else(|| ModexoError::NotFound(format!("no Solana pairs for {}", address)))?;

        let safety = safety_score(&pair, Utc::now().timestamp_millis());
        let snapshot = TokenSnapshot {
            token_address: address.to_string(),
            symbol: pair.base_token.symbol.clone(),
            price_usd: pair.price_usd(),
            liquidity_usd: pair.liquidity_usd(),
            volume_24h: pair.volume.h24,
            safety_score: Some(safety.score),
            captured_at: Utc::now(),
        };
        if let Err(e) = self.repository.save_token_snapshot(&snapshot).await {
            warn!("Failed to store snapshot for {}: {}", address, e);
        }

        Ok(TokenOverview {
            pair_address: pair.pair_address.clone(),
            dex_id: pair.dex_id.clone(),
            price_usd: pair.price_usd(),
            volume_24h: pair.volume.h24,
            price_change_24h: pair.price_change.h24,
            market_cap: pair.market_cap,
            safety,
        })
    }

    /// Boosted tokens ranked by trending score. Tokens whose pair lookup
    /// fails are skipped.
    pub async fn trending(&self, limit: Option<usize>) -> Result<Vec<TrendingScore>> {
        let limit = limit
            .unwrap_or(DEFAULT_TRENDING_LIMIT)
            .clamp(1, MAX_TRENDING_LIMIT);
        let boosted = self.market.boosted_tokens().await?;

        let mut seen = HashSet::new();
        let candidates: Vec<_> = boosted
            .into_iter()
            .filter(|t| seen.insert(t.token_address.clone()))
            .take(limit * 2)
            .collect();

        let lookups = candidates.iter().map(|t| self.market.best_pair(&t.token_address));
        let pairs = join_all(lookups).await;

        let mut scores = Vec::new();
        for (token, pair) in candidates.iter().zip(pairs) {
            match pair {
                Ok(Some(pair)) => scores.push(trending_score(&pair, token.total_amount)),
                Ok(None) => debug!("No pair for boosted token {}", token.token_address),
                Err(e) => warn!("Pair lookup failed for {}: {}", token.token_address, e),
            }
        }

        scores.sort_by(|a, b| b.score.total_cmp(&a.score));
        scores.truncate(limit);
        Ok(scores)
    }

    pub async fn smart_entry(&self, address: &str) -> Result<EntryAnalysis> {
        validate_solana_address(address)?;
        let pair = self
            .market
            .best_pair(address)
            .await?
            .ok_or_else(|| ModexoError::NotFound(format!("no Solana pairs for {}", address)))?;
        Ok(analyze_entry(&pair))
    }

    pub fn portfolio(&self, holdings: &[Holding]) -> Result<PortfolioReport> {
        if holdings.len() > MAX_HOLDINGS {
            return Err(ModexoError::Validation(format!(
                "at most {} holdings are accepted",
                MAX_HOLDINGS
            )));
        }
        if let Some(bad) = holdings
            .iter()
            .find(|h| !h.amount.is_finite() || h.amount < 0.0 || !h.price_usd.is_finite() || h.price_usd < 0.0)
        {
            return Err(ModexoError::Validation(format!(
                "holding {} has a negative or non-finite amount or price",
                bad.symbol
            )));
        }
        Ok(analyze_portfolio(holdings))
    }

    pub async fn polymarket(&self, limit: Option<usize>) -> Result<PredictionSummary> {
        let limit = limit.unwrap_or(DEFAULT_MARKET_LIMIT).clamp(1, MAX_MARKET_LIMIT);
        let markets = self.predictions.active_markets(limit).await?;
        Ok(summarize_markets(&markets))
    }

    pub async fn whale_activity(
        &self,
        address: &str,
        min_usd: Option<Decimal>,
    ) -> Result<WhaleActivity> {
        validate_solana_address(address)?;
        let min_usd = min_usd.unwrap_or(DEFAULT_WHALE_MIN_USD).max(Decimal::ZERO);
        let trades = self
            .repository
            .whale_trades(address, min_usd, WHALE_TRADE_LIMIT)
            .await?;

        let (buy_volume_usd, sell_volume_usd) =
            trades
                .iter()
                .fold((Decimal::ZERO, Decimal::ZERO), |(buy, sell), t| match t.side {
                    TradeSide::Buy => (buy + t.amount_usd, sell),
                    TradeSide::Sell => (buy, sell + t.amount_usd),
                });
        let unique_wallets = trades
            .iter()
            .map(|t| t.wallet.as_str())
            .collect::<HashSet<_>>()
            .len();

        Ok(WhaleActivity {
            token_address: address.to_string(),
            min_usd,
            buy_volume_usd,
            sell_volume_usd,
            net_flow_usd: buy_volume_usd - sell_volume_usd,
            unique_wallets,
            trades,
        })
    }

    pub async fn network_status(&self, urgency: Urgency) -> NetworkReport {
        NetworkReport {
            status: self.network.status().await,
            fees: self.network.estimate_priority_fee(urgency).await,
            recommendation: self.network.should_delay(urgency).await,
        }
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T> {
    serde_json::from_value(input.clone())
        .map_err(|e| ModexoError::Validation(format!("invalid task input: {}", e)))
}

fn parse_urgency(raw: Option<&str>) -> Result<Urgency> {
    raw.map(str::parse)
        .transpose()
        .map_err(ModexoError::Validation)
        .map(Option::unwrap_or_default)
}

#[async_trait]
impl TaskExecutor for AgentService {
    async fn execute(&self, task: &AgentTask) -> Result<Value> {
        let value = match task.agent_id.as_str() {
            "token-safety" => {
                let input: AddressInput = parse_input(&task.input)?;
                serde_json::to_value(self.token_safety(&input.address).await?)?
            }
            "trending-radar" => {
                let input: LimitInput = parse_input(&task.input)?;
                serde_json::to_value(self.trending(input.limit).await?)?
            }
            "smart-entry" => {
                let input: AddressInput = parse_input(&task.input)?;
                serde_json::to_value(self.smart_entry(&input.address).await?)?
            }
            "portfolio-analyzer" => {
                let input: PortfolioInput = parse_input(&task.input)?;
                serde_json::to_value(self.portfolio(&input.holdings)?)?
            }
            "polymarket-insights" => {
                let input: LimitInput = parse_input(&task.input)?;
                serde_json::to_value(self.polymarket(input.limit).await?)?
            }
            "whale-tracker" => {
                let input: AddressInput = parse_input(&task.input)?;
                serde_json::to_value(self.whale_activity(&input.address, input.min_usd).await?)?
            }
            "network-status" => {
                let input: LimitInput = if task.input.is_null() {
                    LimitInput::default()
                } else {
                    parse_input(&task.input)?
                };
                let urgency = parse_urgency(input.urgency.as_deref())?;
                serde_json::to_value(self.network_status(urgency).await)?
            }
            other => return Err(ModexoError::NotFound(format!("unknown agent: {}", other))),
        };
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::dexscreener::{BoostedToken, DexPair, Liquidity, TokenRef};
    use crate::adapters::polymarket::GammaMarket;
    use crate::adapters::MemoryRepository;
    use crate::agents::TaskPriority;
    use rust_decimal_macros::dec;
    use serde_json::json;

    pub const TOKEN: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";
    pub const OTHER_TOKEN: &str = "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN";
    const WALLET_A: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const WALLET_B: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    /// Canned market data keyed by token address
    #[derive(Default)]
    pub struct StaticMarket {
        pub pairs: Vec<DexPair>,
        pub boosted: Vec<BoostedToken>,
    }

    #[async_trait]
    impl MarketDataSource for StaticMarket {
        async fn token_pairs(&self, token_address: &str) -> Result<Vec<DexPair>> {
            Ok(self
                .pairs
                .iter()
                .filter(|p| p.base_token.address == token_address)
                .cloned()
                .collect())
        }

        async fn pair(&self, pair_address: &str) -> Result<Option<DexPair>> {
            Ok(self
                .pairs
                .iter()
                .find(|p| p.pair_address == pair_address)
                .cloned())
        }

        async fn search(&self, query: &str) -> Result<Vec<DexPair>> {
            Ok(self
                .pairs
                .iter()
                .filter(|p| p.base_token.symbol.eq_ignore_ascii_case(query))
                .cloned()
                .collect())
        }

        async fn boosted_tokens(&self) -> Result<Vec<BoostedToken>> {
            Ok(self.boosted.clone())
        }
    }

    #[derive(Default)]
    pub struct StaticMarkets(pub Vec<GammaMarket>);

    #[async_trait]
    impl PredictionMarketSource for StaticMarkets {
        async fn active_markets(&self, limit: usize) -> Result<Vec<GammaMarket>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    pub fn sample_pair(token: &str, symbol: &str, liquidity: f64) -> DexPair {
        let mut pair = DexPair {
            chain_id: "solana".to_string(),
            dex_id: "raydium".to_string(),
            pair_address: format!("{}-pair", symbol),
            base_token: TokenRef {
                address: token.to_string(),
                name: symbol.to_string(),
                symbol: symbol.to_string(),
            },
            price_usd: Some("1.5".to_string()),
            liquidity: Some(Liquidity {
                usd: liquidity,
                ..Default::default()
            }),
            pair_created_at: Some(0),
            ..Default::default()
        };
        pair.volume.h1 = 10_000.0;
        pair.volume.h6 = 30_000.0;
        pair.volume.h24 = 100_000.0;
        pair
    }

    pub fn sample_market() -> StaticMarket {
        StaticMarket {
            pairs: vec![
                sample_pair(TOKEN, "BONK", 400_000.0),
                sample_pair(OTHER_TOKEN, "JUP", 900_000.0),
            ],
            boosted: vec![
                BoostedToken {
                    chain_id: "solana".to_string(),
                    token_address: TOKEN.to_string(),
                    total_amount: 500.0,
                    ..Default::default()
                },
                BoostedToken {
                    chain_id: "solana".to_string(),
                    token_address: OTHER_TOKEN.to_string(),
                    total_amount: 0.0,
                    ..Default::default()
                },
            ],
        }
    }

    pub fn service_with(repository: Arc<dyn Repository>) -> AgentService {
        AgentService::new(
            Arc::new(sample_market()),
            Arc::new(StaticMarkets(vec![GammaMarket {
                id: "m1".to_string(),
                question: "Will it happen?".to_string(),
                outcomes: Some(r#"["Yes","No"]"#.to_string()),
                outcome_prices: Some(r#"["0.7","0.3"]"#.to_string()),
                ..Default::default()
            }])),
            repository,
            Arc::new(CongestionMonitor::with_defaults()),
        )
    }

    fn trade(wallet: &str, side: TradeSide, amount: Decimal) -> WhaleTrade {
        WhaleTrade {
            id: uuid::Uuid::new_v4(),
            token_address: TOKEN.to_string(),
            wallet: wallet.to_string(),
            side,
            amount_usd: amount,
            signature: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_token_safety_stores_snapshot() {
        let repo = Arc::new(MemoryRepository::new());
        let service = service_with(repo.clone());

        let overview = service.token_safety(TOKEN).await.unwrap();
        assert_eq!(overview.safety.symbol, "BONK");
        assert_eq!(overview.price_usd, 1.5);

        let snapshots = repo.token_snapshots(TOKEN, 10).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].safety_score, Some(overview.safety.score));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let service = service_with(Arc::new(MemoryRepository::new()));
        let missing = "So11111111111111111111111111111111111111112";
        assert!(matches!(
            service.token_safety(missing).await,
            Err(ModexoError::NotFound(_))
        ));
        assert!(matches!(
            service.smart_entry("not-an-address").await,
            Err(ModexoError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_trending_ranks_boosted_tokens() {
        let service = service_with(Arc::new(MemoryRepository::new()));
        let ranked = service.trending(Some(5)).await.unwrap();
        assert_eq!(ranked.len(), 2);
        // Same pair shape, so the boost decides the order
        assert_eq!(ranked[0].symbol, "BONK");
        assert!(ranked[0].score > ranked[1].score);

        assert_eq!(service.trending(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_whale_activity_net_flow() {
        let repo = Arc::new(MemoryRepository::new());
        repo.record_whale_trade(&trade(WALLET_A, TradeSide::Buy, dec!(50000)))
            .await
            .unwrap();
        repo.record_whale_trade(&trade(WALLET_B, TradeSide::Sell, dec!(20000)))
            .await
            .unwrap();
        repo.record_whale_trade(&trade(WALLET_B, TradeSide::Buy, dec!(500)))
            .await
            .unwrap();
        let service = service_with(repo);

        let activity = service.whale_activity(TOKEN, None).await.unwrap();
        assert_eq!(activity.trades.len(), 2);
        assert_eq!(activity.buy_volume_usd, dec!(50000));
        assert_eq!(activity.net_flow_usd, dec!(30000));
        assert_eq!(activity.unique_wallets, 2);
    }

    #[tokio::test]
    async fn test_portfolio_rejects_negative_amounts() {
        let service = service_with(Arc::new(MemoryRepository::new()));
        let holdings = vec![Holding {
            token_address: TOKEN.to_string(),
            symbol: "BONK".to_string(),
            amount: -1.0,
            price_usd: 1.0,
            cost_basis_usd: None,
        }];
        assert!(matches!(
            service.portfolio(&holdings),
            Err(ModexoError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_executor_dispatch() {
        let service = service_with(Arc::new(MemoryRepository::new()));

        let task = AgentTask::new("polymarket-insights", json!({ "limit": 5 }), TaskPriority::Normal);
        let value = service.execute(&task).await.unwrap();
        assert_eq!(value["markets"][0]["marketId"], "m1");

        let task = AgentTask::new("network-status", Value::Null, TaskPriority::Normal);
        let value = service.execute(&task).await.unwrap();
        assert_eq!(value["fees"]["urgency"], "normal");

        let task = AgentTask::new("token-safety", json!({}), TaskPriority::Normal);
        assert!(matches!(
            service.execute(&task).await,
            Err(ModexoError::Validation(_))
        ));

        let task = AgentTask::new("nope", Value::Null, TaskPriority::Normal);
        assert!(matches!(
            service.execute(&task).await,
            Err(ModexoError::NotFound(_))
        ));
    }
}
