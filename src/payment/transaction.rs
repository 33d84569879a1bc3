//! Transaction tracker for facilitator settlements

use crate::config::SessionConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub id: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub signature: Option<String>,
    pub last_error: Option<String>,
}

pub struct TransactionTracker {
    timeout: Duration,
    max_retries: u32,
    transactions: RwLock<HashMap<String, TransactionState>>,
}

impl TransactionTracker {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            timeout: Duration::seconds(config.transaction_timeout_secs),
            max_retries: config.transaction_max_retries,
            transactions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&SessionConfig::default())
    }

    /// Start tracking; an id already tracked is returned unchanged
    pub async fn track(&self, id: &str) -> TransactionState {
        self.track_at(id, Utc::now()).await
    }

    pub async fn track_at(&self, id: &str, now: DateTime<Utc>) -> TransactionState {
        let mut txs = self.transactions.write().await;
        txs.entry(id.to_string())
            .or_insert_with(|| TransactionState {
                id: id.to_string(),
                status: TransactionStatus::Pending,
                created_at: now,
                updated_at: now,
                retry_count: 0,
                signature: None,
                last_error: None,
            })
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<TransactionState> {
        self.transactions.read().await.get(id).cloned()
    }

    /// `pending → confirmed`
    pub async fn confirm(&self, id: &str, signature: Option<&str>) -> bool {
        let mut txs = self.transactions.write().await;
        match txs.get_mut(id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Confirmed;
                tx.updated_at = Utc::now();
                tx.signature = signature.map(str::to_string);
                tx.last_error = None;
                true
            }
            _ => false,
        }
    }

    /// `pending → failed`
    pub async fn fail(&self, id: &str, error: &str) -> bool {
        let mut txs = self.transactions.write().await;
        match txs.get_mut(id) {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                tx.status = TransactionStatus::Failed;
                tx.updated_at = Utc::now();
                tx.last_error = Some(error.to_string());
                warn!("Transaction {} failed: {}", id, error);
                true
            }
            _ => false,
        }
    }

    /// `failed → pending` while retries remain
    pub async fn retry(&self, id: &str) -> bool {
        let mut txs = self.transactions.write().await;
        match txs.get_mut(id) {
            Some(tx)
                if tx.status == TransactionStatus::Failed && tx.retry_count < self.max_retries =>
            {
                tx.status = TransactionStatus::Pending;
                tx.retry_count += 1;
                tx.updated_at = Utc::now();
                debug!("Transaction {} retry #{}", id, tx.retry_count);
                true
            }
            _ => false,
        }
    }

    /// Expire transactions left pending past the timeout
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut txs = self.transactions.write().await;
        let mut expired = 0;
        for tx in txs.values_mut() {
            if tx.status == TransactionStatus::Pending && now >= tx.updated_at + self.timeout {
                tx.status = TransactionStatus::Expired;
                tx.updated_at = now;
                expired += 1;
            }
        }
        expired
    }

    pub async fn count_by_status(&self, status: TransactionStatus) -> usize {
        self.transactions
            .read()
            .await
            .values()
            .filter(|tx| tx.status == status)
            .count()
    }
}
