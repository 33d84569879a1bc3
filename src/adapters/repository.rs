//! Persistence interface and the in-memory implementation used by default
//! and in tests. [`super::postgres::PostgresStore`] implements the same trait.

use crate::domain::{TokenSnapshot, TrackedWallet, User, WatchlistEntry, WhaleTrade};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Token snapshots kept per token by the in-memory store
const MAX_SNAPSHOTS_PER_TOKEN: usize = 500;

#[async_trait]
pub trait Repository: Send + Sync {
    // Users
    async fn upsert_user(&self, wallet: &str) -> Result<User>;
    async fn get_user(&self, wallet: &str) -> Result<Option<User>>;

    // Tracked wallets
    async fn add_tracked_wallet(&self, wallet: &TrackedWallet) -> Result<()>;
    async fn tracked_wallets(&self, owner: &str) -> Result<Vec<TrackedWallet>>;
    async fn remove_tracked_wallet(&self, owner: &str, id: Uuid) -> Result<bool>;

    // Token snapshots
    async fn save_token_snapshot(&self, snapshot: &TokenSnapshot) -> Result<()>;
    async fn token_snapshots(&self, token_address: &str, limit: usize)
        -> Result<Vec<TokenSnapshot>>;

    // Watchlist
    /// Adding a token already on the list updates its note
    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<()>;
    async fn remove_from_watchlist(&self, owner: &str, token_address: &str) -> Result<bool>;
    async fn watchlist(&self, owner: &str) -> Result<Vec<WatchlistEntry>>;

    // Whale trades
    async fn record_whale_trade(&self, trade: &WhaleTrade) -> Result<()>;
    /// Trades for a token at or above `min_usd`, newest first
    async fn whale_trades(
        &self,
        token_address: &str,
        min_usd: Decimal,
        limit: usize,
    ) -> Result<Vec<WhaleTrade>>;
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    tracked: Vec<TrackedWallet>,
    snapshots: HashMap<String, Vec<TokenSnapshot>>,
    watchlist: Vec<WatchlistEntry>,
    whale_trades: Vec<WhaleTrade>,
}

/// Process-local repository; contents are lost on restart
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_user(&self, wallet: &str) -> Result<User> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let user = state
            .users
            .entry(wallet.to_string())
            .and_modify(|u| u.last_seen_at = now)
            .or_insert_with(|| User {
                wallet: wallet.to_string(),
                created_at: now,
                last_seen_at: now,
            });
        Ok(user.clone())
    }

    async fn get_user(&self, wallet: &str) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(wallet).cloned())
    }

    async fn add_tracked_wallet(&self, wallet: &TrackedWallet) -> Result<()> {
        let mut state = self.state.write().await;
        let duplicate = state
            .tracked
            .iter()
            .any(|t| t.owner == wallet.owner && t.address == wallet.address);
        if !duplicate {
            state.tracked.push(wallet.clone());
        }
        Ok(())
    }

    async fn tracked_wallets(&self, owner: &str) -> Result<Vec<TrackedWallet>> {
        Ok(self
            .state
            .read()
            .await
            .tracked
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect())
    }

    async fn remove_tracked_wallet(&self, owner: &str, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.tracked.len();
        state.tracked.retain(|t| !(t.owner == owner && t.id == id));
        Ok(state.tracked.len() < before)
    }

    async fn save_token_snapshot(&self, snapshot: &TokenSnapshot) -> Result<()> {
        let mut state = self.state.write().await;
        let history = state
            .snapshots
            .entry(snapshot.token_address.clone())
            .or_default();
        history.push(snapshot.clone());
        if history.len() > MAX_SNAPSHOTS_PER_TOKEN {
            let excess = history.len() - MAX_SNAPSHOTS_PER_TOKEN;
            history.drain(..excess);
        }
        Ok(())
    }

    async fn token_snapshots(
        &self,
        token_address: &str,
        limit: usize,
    ) -> Result<Vec<TokenSnapshot>> {
        let state = self.state.read().await;
        Ok(state
            .snapshots
            .get(token_address)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .watchlist
            .iter()
            .position(|w| w.owner == entry.owner && w.token_address == entry.token_address);
        match existing {
            Some(i) => state.watchlist[i].note = entry.note.clone(),
            None => state.watchlist.push(entry.clone()),
        }
        Ok(())
    }

    async fn remove_from_watchlist(&self, owner: &str, token_address: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.watchlist.len();
        state
            .watchlist
            .retain(|w| !(w.owner == owner && w.token_address == token_address));
        Ok(state.watchlist.len() < before)
    }

    async fn watchlist(&self, owner: &str) -> Result<Vec<WatchlistEntry>> {
        Ok(self
            .state
            .read()
            .await
            .watchlist
            .iter()
            .filter(|w| w.owner == owner)
            .cloned()
            .collect())
    }

    async fn record_whale_trade(&self, trade: &WhaleTrade) -> Result<()> {
        self.state.write().await.whale_trades.push(trade.clone());
        Ok(())
    }

    async fn whale_trades(
        &self,
        token_address: &str,
        min_usd: Decimal,
        limit: usize,
    ) -> Result<Vec<WhaleTrade>> {
        let state = self.state.read().await;
        let mut trades: Vec<WhaleTrade> = state
            .whale_trades
            .iter()
            .filter(|t| t.token_address == token_address && t.amount_usd >= min_usd)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.truncate(limit);
        Ok(trades)
    }
}
