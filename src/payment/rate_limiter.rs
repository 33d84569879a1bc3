//! Wallet Rate Limiter
//!
//! Fixed-window counters per (wallet, action type) with escalating lockout.
//! Windows reset lazily on the next access; repeated violations block the
//! bucket for a fixed cooldown.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Kind of action being rate limited, each with its own ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Request,
    Payment,
    Execution,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::Request, ActionType::Payment, ActionType::Execution];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Request => "request",
            ActionType::Payment => "payment",
            ActionType::Execution => "execution",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "request" => Ok(ActionType::Request),
            "payment" => Ok(ActionType::Payment),
            "execution" => Ok(ActionType::Execution),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// Counter state for one (wallet, action type) key
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBucket {
    pub wallet: String,
    pub action: ActionType,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub violations: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitBucket {
    fn new(wallet: &str, action: ActionType, now: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.to_string(),
            action,
            window_start: now,
            count: 0,
            violations: 0,
            blocked_until: None,
        }
    }

    fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub action: ActionType,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub blocked_until: Option<DateTime<Utc>>,
    /// Seconds until a retry can succeed (0 when allowed)
    pub retry_after_secs: u64,
    pub violations: u32,
}

/// Fixed-window rate limiter keyed by wallet and action type
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<(String, ActionType), RateLimitBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    /// Ceiling for an action type within one window
    pub fn limit_for(&self, action: ActionType) -> u32 {
        match action {
            ActionType::Request => self.config.request_limit,
            ActionType::Payment => self.config.payment_limit,
            ActionType::Execution => self.config.execution_limit,
        }
    }

    fn window(&self) -> Duration {
        Duration::seconds(self.config.window_secs as i64)
    }

    /// Count one action for the wallet, rejecting it when over the ceiling
    pub async fn check(&self, wallet: &str, action: ActionType) -> RateLimitDecision {
        self.check_at(wallet, action, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        wallet: &str,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let limit = self.limit_for(action);
        let window = self.window();
        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .entry((wallet.to_string(), action))
            .or_insert_with(|| RateLimitBucket::new(wallet, action, now));

        if bucket.is_blocked(now) {
            return self.decision(bucket, false, limit, now);
        }
        if bucket.blocked_until.is_some() {
            bucket.blocked_until = None;
            bucket.window_start = now;
            bucket.count = 0;
        }

        if now >= bucket.window_start + window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= limit {
            bucket.violations += 1;
            if bucket.violations >= self.config.max_violations {
                let until = now + Duration::seconds(self.config.block_secs as i64);
                bucket.blocked_until = Some(until);
                bucket.violations = 0;
                warn!(
                    "Rate limit lockout for {} ({}) until {}",
                    wallet, action, until
                );
            } else {
                debug!(
                    "Rate limit violation #{} for {} ({})",
                    bucket.violations, wallet, action
                );
            }
            return self.decision(bucket, false, limit, now);
        }

        bucket.count += 1;
        self.decision(bucket, true, limit, now)
    }

    fn decision(
        &self,
        bucket: &RateLimitBucket,
        allowed: bool,
        limit: u32,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let reset_at = bucket.window_start + self.window();
        let retry_after_secs = if allowed {
            0
        } else if let Some(until) = bucket.blocked_until.filter(|until| now < *until) {
            seconds_until(now, until)
        } else {
            seconds_until(now, reset_at)
        };

        RateLimitDecision {
            allowed,
            action: bucket.action,
            limit,
            remaining: limit.saturating_sub(bucket.count),
            reset_at,
            blocked_until: bucket.blocked_until.filter(|until| now < *until),
            retry_after_secs,
            violations: bucket.violations,
        }
    }

    /// Read-only view of a bucket; never counts
    pub async fn status(&self, wallet: &str, action: ActionType) -> RateLimitDecision {
        self.status_at(wallet, action, Utc::now()).await
    }

    pub async fn status_at(
        &self,
        wallet: &str,
        action: ActionType,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let limit = self.limit_for(action);
        let buckets = self.buckets.read().await;
        match buckets.get(&(wallet.to_string(), action)) {
            Some(bucket) => {
                let mut view = bucket.clone();
                if !view.is_blocked(now) && now >= view.window_start + self.window() {
                    view.count = 0;
                    view.window_start = now;
                }
                let allowed = !view.is_blocked(now) && view.count < limit;
                self.decision(&view, allowed, limit, now)
            }
            None => RateLimitDecision {
                allowed: true,
                action,
                limit,
                remaining: limit,
                reset_at: now + self.window(),
                blocked_until: None,
                retry_after_secs: 0,
                violations: 0,
            },
        }
    }

    /// Drop every bucket of a wallet
    pub async fn reset(&self, wallet: &str) -> usize {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|(owner, _), _| owner != wallet);
        before - buckets.len()
    }

    /// Remove buckets whose window and block have both lapsed
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let window = self.window();
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, b| b.is_blocked(now) || now < b.window_start + window);
        let removed = before - buckets.len();
        if removed > 0 {
            debug!("Swept {} idle rate limit buckets", removed);
        }
        removed
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

fn seconds_until(now: DateTime<Utc>, then: DateTime<Utc>) -> u64 {
    let millis = (then - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}
