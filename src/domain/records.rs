use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A wallet that has signed in at least once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub wallet: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// A wallet another user follows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedWallet {
    pub id: Uuid,
    pub owner: String,
    pub address: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TrackedWallet {
    pub fn new(owner: &str, address: &str, label: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            address: address.to_string(),
            label,
            created_at: Utc::now(),
        }
    }
}

/// Point-in-time market data for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnapshot {
    pub token_address: String,
    pub symbol: String,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub safety_score: Option<u8>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub owner: String,
    pub token_address: String,
    pub note: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl TryFrom<&str> for TradeSide {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {}", other)),
        }
    }
}

/// A large trade observed for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhaleTrade {
    pub id: Uuid,
    pub token_address: String,
    pub wallet: String,
    pub side: TradeSide,
    pub amount_usd: Decimal,
    pub signature: Option<String>,
    pub timestamp: DateTime<Utc>,
}
