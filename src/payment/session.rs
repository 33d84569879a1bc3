//! Payment Session Store
//!
//! Tracks the lifecycle of one x402 payment: a session is opened when a
//! challenge is issued, marked paid once the facilitator verifies the
//! payload, and marked used after settlement.
//!
//! Allowed transitions: `pending → paid`, `pending → expired`, `paid → used`.

use crate::config::SessionConfig;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Paid,
    Expired,
    Used,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Used)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub id: String,
    pub wallet_address: Option<String>,
    pub agent_id: String,
    pub resource: String,
    pub amount: Decimal,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
    pub transaction: Option<String>,
}

impl PaymentSession {
    /// Apply lazy expiry; returns true when the status flipped
    fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == SessionStatus::Pending && now >= self.expires_at {
            self.status = SessionStatus::Expired;
            return true;
        }
        false
    }

    /// Terminal, or paid but never settled
    fn is_reapable(&self) -> bool {
        self.status.is_terminal() || self.status == SessionStatus::Paid
    }

    fn finished_at(&self) -> DateTime<Utc> {
        self.used_at.or(self.paid_at).unwrap_or(self.expires_at)
    }
}

pub struct PaymentSessionStore {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, PaymentSession>>,
}

impl PaymentSessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(SessionConfig::default())
    }

    /// Open a pending session for one paid call
    pub async fn create_session(
        &self,
        wallet: Option<&str>,
        agent_id: &str,
        resource: &str,
        amount: Decimal,
    ) -> PaymentSession {
        self.create_session_at(wallet, agent_id, resource, amount, Utc::now())
            .await
    }

    pub async fn create_session_at(
        &self,
        wallet: Option<&str>,
        agent_id: &str,
        resource: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> PaymentSession {
        let session = PaymentSession {
            id: Uuid::new_v4().to_string(),
            wallet_address: wallet.map(str::to_string),
            agent_id: agent_id.to_string(),
            resource: resource.to_string(),
            amount,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + Duration::seconds(self.config.ttl_secs),
            paid_at: None,
            used_at: None,
            transaction: None,
        };

        debug!(
            "Payment session {} opened for {} ({})",
            session.id, agent_id, amount
        );
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Look up a session, applying lazy expiry
    pub async fn get_session(&self, id: &str) -> Option<PaymentSession> {
        self.get_session_at(id, Utc::now()).await
    }

    pub async fn get_session_at(&self, id: &str, now: DateTime<Utc>) -> Option<PaymentSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.expire_if_due(now);
        Some(session.clone())
    }

    /// `pending → paid`. Fails (and leaves `expired`) once the session lapsed.
    pub async fn mark_session_paid(&self, id: &str, transaction: Option<&str>) -> bool {
        self.mark_session_paid_at(id, transaction, Utc::now()).await
    }

    pub async fn mark_session_paid_at(
        &self,
        id: &str,
        transaction: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };
        if session.expire_if_due(now) {
            debug!("Payment session {} expired before payment", id);
            return false;
        }
        if session.status != SessionStatus::Pending {
            return false;
        }

        session.status = SessionStatus::Paid;
        session.paid_at = Some(now);
        session.transaction = transaction.map(str::to_string);
        true
    }

    /// `paid → used`
    pub async fn mark_session_used(&self, id: &str) -> bool {
        self.mark_session_used_at(id, Utc::now()).await
    }

    pub async fn mark_session_used_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };
        if session.status != SessionStatus::Paid {
            return false;
        }

        session.status = SessionStatus::Used;
        session.used_at = Some(now);
        true
    }

    /// Attach the settlement transaction to a paid or used session
    pub async fn set_transaction(&self, id: &str, transaction: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(s) if matches!(s.status, SessionStatus::Paid | SessionStatus::Used) => {
                s.transaction = Some(transaction.to_string());
                true
            }
            _ => false,
        }
    }

    pub async fn is_session_paid(&self, id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .is_some_and(|s| s.status == SessionStatus::Paid)
    }

    pub async fn sessions_for_wallet(&self, wallet: &str) -> Vec<PaymentSession> {
        let mut found: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.wallet_address.as_deref() == Some(wallet))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    /// Expire lapsed pending sessions; drop terminal sessions and paid
    /// sessions that were never settled once past retention.
    /// Returns (expired, removed).
    pub async fn sweep(&self) -> (usize, usize) {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> (usize, usize) {
        let retention = Duration::seconds(self.config.retention_secs);
        let mut sessions = self.sessions.write().await;

        let mut expired = 0;
        for session in sessions.values_mut() {
            if session.expire_if_due(now) {
                expired += 1;
            }
        }

        let before = sessions.len();
        sessions.retain(|_, s| !(s.is_reapable() && now >= s.finished_at() + retention));
        let removed = before - sessions.len();

        if expired > 0 || removed > 0 {
            debug!("Session sweep: {} expired, {} removed", expired, removed);
        }
        (expired, removed)
    }

    pub async fn all(&self) -> Vec<PaymentSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    #[tokio::test]
    async fn test_happy_path_lifecycle() {
        let store = PaymentSessionStore::with_defaults();
        let s = store
            .create_session(Some(WALLET), "token-safety", "/api/agents/token-safety", dec!(0.01))
            .await;
        assert_eq!(s.status, SessionStatus::Pending);

        assert!(!store.mark_session_used(&s.id).await);
        assert!(store.mark_session_paid(&s.id, None).await);
        assert!(store.is_session_paid(&s.id).await);
        assert!(!store.mark_session_paid(&s.id, None).await);
        assert!(store.set_transaction(&s.id, "5sig").await);
        assert!(store.mark_session_used(&s.id).await);
        assert!(!store.mark_session_used(&s.id).await);

        let stored = store.get_session(&s.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Used);
        assert_eq!(stored.transaction.as_deref(), Some("5sig"));
    }

    #[tokio::test]
    async fn test_mark_paid_after_expiry_fails() {
        let store = PaymentSessionStore::with_defaults();
        let now = Utc::now();
        let s = store
            .create_session_at(Some(WALLET), "smart-entry", "/api/agents/smart-entry", dec!(0.03), now)
            .await;

        let late = now + Duration::seconds(301);
        assert!(!store.mark_session_paid_at(&s.id, Some("tx"), late).await);

        let stored = store.get_session_at(&s.id, late).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Expired);
        assert!(stored.transaction.is_none());

        // Expired is terminal
        assert!(!store.mark_session_paid_at(&s.id, None, now).await);
        assert!(!store.mark_session_used_at(&s.id, late).await);
    }

    #[tokio::test]
    async fn test_paid_sessions_do_not_expire() {
        let store = PaymentSessionStore::with_defaults();
        let now = Utc::now();
        let s = store
            .create_session_at(None, "trending-radar", "/api/agents/trending", dec!(0.005), now)
            .await;
        assert!(store.mark_session_paid_at(&s.id, None, now).await);

        let late = now + Duration::seconds(600);
        assert_eq!(store.sweep_at(late).await, (0, 0));
        assert!(store.mark_session_used_at(&s.id, late).await);
    }

    #[tokio::test]
    async fn test_sweep_expires_and_evicts() {
        let store = PaymentSessionStore::with_defaults();
        let now = Utc::now();
        store
            .create_session_at(Some(WALLET), "a", "/a", dec!(1), now)
            .await;
        store
            .create_session_at(Some(WALLET), "b", "/b", dec!(1), now + Duration::seconds(200))
            .await;

        assert_eq!(store.sweep_at(now + Duration::seconds(301)).await, (1, 0));
        assert_eq!(store.sessions_for_wallet(WALLET).await.len(), 2);

        // Past retention the expired session is dropped
        let much_later = now + Duration::seconds(300 + 3600);
        assert_eq!(store.sweep_at(much_later).await, (1, 1));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unsettled_paid_session_is_dropped_after_retention() {
        let store = PaymentSessionStore::with_defaults();
        let now = Utc::now();
        let s = store
            .create_session_at(Some(WALLET), "token-safety", "/api/agents/token-safety", dec!(0.01), now)
            .await;
        assert!(store.mark_session_paid_at(&s.id, None, now).await);

        assert_eq!(store.sweep_at(now + Duration::seconds(3599)).await, (0, 0));
        assert_eq!(store.len().await, 1);

        assert_eq!(store.sweep_at(now + Duration::days(365)).await, (0, 1));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = PaymentSessionStore::with_defaults();
        assert!(store.get_session("nope").await.is_none());
        assert!(!store.mark_session_paid("nope", None).await);
        assert!(!store.is_session_paid("nope").await);
        assert!(store.is_empty().await);
    }
}
