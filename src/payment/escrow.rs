//! Escrow Ledger
//!
//! Held-funds records pending release, refund or dispute resolution.
//! State machine:
//!
//! ```text
//! held ──release──▶ released
//!  │ ├──refund───▶ refunded
//!  │ ├──dispute──▶ disputed ──resolve──▶ released | refunded
//!  │ └──expiry───▶ expired ──refund──▶ refunded
//! ```

use crate::config::EscrowConfig;
use crate::validation::{is_valid_solana_address, validate_text};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_CONDITION_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowStatus {
    Held,
    Released,
    Disputed,
    Refunded,
    Expired,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Disputed => "disputed",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Expired => "expired",
        }
    }
}

/// How a disputed escrow is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeResolution {
    Release,
    Refund,
    Split,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowAccount {
    pub id: String,
    pub depositor: String,
    pub beneficiary: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub condition: String,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub dispute_reason: Option<String>,
    pub disputed_by: Option<String>,
    pub resolution: Option<DisputeResolution>,
}

impl EscrowAccount {
    /// Amount the beneficiary receives on release
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.fee
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowStats {
    pub held: usize,
    pub released: usize,
    pub disputed: usize,
    pub refunded: usize,
    pub expired: usize,
    pub total_held_amount: Decimal,
    pub total_fees: Decimal,
}

/// In-memory escrow ledger
pub struct EscrowLedger {
    config: EscrowConfig,
    accounts: RwLock<HashMap<String, EscrowAccount>>,
}

impl EscrowLedger {
    pub fn new(config: EscrowConfig) -> Self {
        Self {
            config,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EscrowConfig::default())
    }

    /// Fee charged on an amount (fee_bps / 10_000)
    pub fn fee_for(&self, amount: Decimal) -> Decimal {
        amount * Decimal::from(self.config.fee_bps) / Decimal::from(10_000)
    }

    /// Hold funds from `depositor` for `beneficiary`.
    ///
    /// Returns `None` for invalid addresses, self-escrow or a non-positive amount.
    pub async fn create_escrow(
        &self,
        depositor: &str,
        beneficiary: &str,
        amount: Decimal,
        condition: &str,
    ) -> Option<EscrowAccount> {
        self.create_escrow_at(depositor, beneficiary, amount, condition, Utc::now())
            .await
    }

    pub async fn create_escrow_at(
        &self,
        depositor: &str,
        beneficiary: &str,
        amount: Decimal,
        condition: &str,
        now: DateTime<Utc>,
    ) -> Option<EscrowAccount> {
        if !is_valid_solana_address(depositor) || !is_valid_solana_address(beneficiary) {
            return None;
        }
        if depositor == beneficiary || amount <= Decimal::ZERO {
            return None;
        }
        if validate_text(condition, "condition", MAX_CONDITION_LEN).is_err() {
            return None;
        }

        let account = EscrowAccount {
            id: Uuid::new_v4().to_string(),
            depositor: depositor.to_string(),
            beneficiary: beneficiary.to_string(),
            amount,
            fee: self.fee_for(amount),
            condition: condition.trim().to_string(),
            status: EscrowStatus::Held,
            created_at: now,
            expires_at: now + Duration::seconds(self.config.default_expiry_secs),
            resolved_at: None,
            dispute_reason: None,
            disputed_by: None,
            resolution: None,
        };

        info!(
            "Escrow {} created: {} -> {} amount {} fee {}",
            account.id, depositor, beneficiary, amount, account.fee
        );
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account.clone());
        Some(account)
    }

    pub async fn get_escrow(&self, id: &str) -> Option<EscrowAccount> {
        self.accounts.read().await.get(id).cloned()
    }

    /// Release held funds to the beneficiary; only the depositor may release
    pub async fn release_escrow(&self, id: &str, caller: &str) -> bool {
        self.release_escrow_at(id, caller, Utc::now()).await
    }

    pub async fn release_escrow_at(&self, id: &str, caller: &str, now: DateTime<Utc>) -> bool {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(id) else {
            return false;
        };
        if account.depositor != caller {
            warn!("Escrow {} release rejected: caller is not the depositor", id);
            return false;
        }
        if account.status != EscrowStatus::Held {
            return false;
        }
        if now >= account.expires_at {
            account.status = EscrowStatus::Expired;
            return false;
        }

        account.status = EscrowStatus::Released;
        account.resolved_at = Some(now);
        info!("Escrow {} released to {}", id, account.beneficiary);
        true
    }

    /// Return funds to the depositor
    pub async fn refund_escrow(&self, id: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(id) else {
            return false;
        };
        if !matches!(account.status, EscrowStatus::Held | EscrowStatus::Expired) {
            return false;
        }

        account.status = EscrowStatus::Refunded;
        account.resolved_at = Some(Utc::now());
        info!("Escrow {} refunded to {}", id, account.depositor);
        true
    }

    /// Freeze a held escrow; either party may dispute
    pub async fn dispute_escrow(&self, id: &str, caller: &str, reason: &str) -> bool {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(id) else {
            return false;
        };
        if caller != account.depositor && caller != account.beneficiary {
            return false;
        }
        if account.status != EscrowStatus::Held {
            return false;
        }

        account.status = EscrowStatus::Disputed;
        account.dispute_reason = Some(reason.trim().to_string());
        account.disputed_by = Some(caller.to_string());
        warn!("Escrow {} disputed by {}: {}", id, caller, reason);
        true
    }

    /// Settle a disputed escrow.
    ///
    /// `Split` settles as a release: funds go to the beneficiary in full.
    pub async fn resolve_dispute(&self, id: &str, resolution: DisputeResolution) -> bool {
        let mut accounts = self.accounts.write().await;
        let Some(account) = accounts.get_mut(id) else {
            return false;
        };
        if account.status != EscrowStatus::Disputed {
            return false;
        }

        account.status = match resolution {
            DisputeResolution::Release => EscrowStatus::Released,
            DisputeResolution::Refund => EscrowStatus::Refunded,
            DisputeResolution::Split => {
                warn!(
                    "Escrow {}: split resolution has no partial payout, releasing in full",
                    id
                );
                EscrowStatus::Released
            }
        };
        account.resolution = Some(resolution);
        account.resolved_at = Some(Utc::now());
        info!("Escrow {} dispute resolved: {}", id, account.status.as_str());
        true
    }

    /// Mark stale held escrows as expired
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut accounts = self.accounts.write().await;
        let mut expired = 0;
        for account in accounts.values_mut() {
            if account.status == EscrowStatus::Held && now >= account.expires_at {
                account.status = EscrowStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            info!("Expired {} stale escrows", expired);
        }
        expired
    }

    /// Number of escrows currently holding funds
    pub async fn active_escrow_count(&self) -> usize {
        self.active_escrow_count_at(Utc::now()).await
    }

    /// Held escrows past expiry no longer count, swept or not
    pub async fn active_escrow_count_at(&self, now: DateTime<Utc>) -> usize {
        self.accounts
            .read()
            .await
            .values()
            .filter(|a| a.status == EscrowStatus::Held && now < a.expires_at)
            .count()
    }

    pub async fn escrows_for_wallet(&self, wallet: &str) -> Vec<EscrowAccount> {
        let mut found: Vec<_> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|a| a.depositor == wallet || a.beneficiary == wallet)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }

    pub async fn stats(&self) -> EscrowStats {
        let accounts = self.accounts.read().await;
        let mut stats = EscrowStats::default();
        for account in accounts.values() {
            match account.status {
                EscrowStatus::Held => {
                    stats.held += 1;
                    stats.total_held_amount += account.amount;
                }
                EscrowStatus::Released => stats.released += 1,
                EscrowStatus::Disputed => stats.disputed += 1,
                EscrowStatus::Refunded => stats.refunded += 1,
                EscrowStatus::Expired => stats.expired += 1,
            }
            if account.status == EscrowStatus::Released {
                stats.total_fees += account.fee;
            }
        }
        stats
    }
}
