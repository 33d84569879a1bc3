use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Metrics collector for the payment gate and background services
pub struct Metrics {
    /// 402 challenges issued
    pub challenges_issued: AtomicU64,
    /// Payments the facilitator verified
    pub payments_verified: AtomicU64,
    /// Payments settled successfully
    pub payments_settled: AtomicU64,
    /// Verify or settle failures
    pub payment_failures: AtomicU64,
    /// Requests rejected by the rate limiter
    pub rate_limited: AtomicU64,
    /// Free agent calls served
    pub free_calls: AtomicU64,
    /// Orchestrator tasks finished (any outcome)
    pub tasks_finished: AtomicU64,
    started_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub challenges_issued: u64,
    pub payments_verified: u64,
    pub payments_settled: u64,
    pub payment_failures: u64,
    pub rate_limited: u64,
    pub free_calls: u64,
    pub tasks_finished: u64,
    pub uptime_secs: i64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            challenges_issued: AtomicU64::new(0),
            payments_verified: AtomicU64::new(0),
            payments_settled: AtomicU64::new(0),
            payment_failures: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            free_calls: AtomicU64::new(0),
            tasks_finished: AtomicU64::new(0),
            started_at: Utc::now().timestamp(),
        }
    }

    pub fn inc_challenges(&self) {
        self.challenges_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_verified(&self) {
        self.payments_verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_settled(&self) {
        self.payments_settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payment_failures(&self) {
        self.payment_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_free_calls(&self) {
        self.free_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_finished(&self) {
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            challenges_issued: self.challenges_issued.load(Ordering::Relaxed),
            payments_verified: self.payments_verified.load(Ordering::Relaxed),
            payments_settled: self.payments_settled.load(Ordering::Relaxed),
            payment_failures: self.payment_failures.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            free_calls: self.free_calls.load(Ordering::Relaxed),
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
            uptime_secs: Utc::now().timestamp() - self.started_at,
        }
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP modexo_challenges_issued_total 402 challenges issued
# TYPE modexo_challenges_issued_total counter
modexo_challenges_issued_total {}

# HELP modexo_payments_verified_total Payments verified by the facilitator
# TYPE modexo_payments_verified_total counter
modexo_payments_verified_total {}

# HELP modexo_payments_settled_total Payments settled
# TYPE modexo_payments_settled_total counter
modexo_payments_settled_total {}

# HELP modexo_payment_failures_total Verify or settle failures
# TYPE modexo_payment_failures_total counter
modexo_payment_failures_total {}

# HELP modexo_rate_limited_total Requests rejected by the rate limiter
# TYPE modexo_rate_limited_total counter
modexo_rate_limited_total {}

# HELP modexo_free_calls_total Free agent calls served
# TYPE modexo_free_calls_total counter
modexo_free_calls_total {}

# HELP modexo_tasks_finished_total Orchestrator tasks finished
# TYPE modexo_tasks_finished_total counter
modexo_tasks_finished_total {}

# HELP modexo_uptime_seconds Process uptime
# TYPE modexo_uptime_seconds gauge
modexo_uptime_seconds {}
"#,
            s.challenges_issued,
            s.payments_verified,
            s.payments_settled,
            s.payment_failures,
            s.rate_limited,
            s.free_calls,
            s.tasks_finished,
            s.uptime_secs,
        )
    }

    /// Log periodic status
    pub fn log_status(&self) {
        let s = self.snapshot();
        info!(
            "Gate: {} challenges, {} verified, {} settled, {} failures, {} rate limited",
            s.challenges_issued,
            s.payments_verified,
            s.payments_settled,
            s.payment_failures,
            s.rate_limited
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_export() {
        let metrics = Metrics::new();
        metrics.inc_challenges();
        metrics.inc_challenges();
        metrics.inc_settled();

        let snap = metrics.snapshot();
        assert_eq!(snap.challenges_issued, 2);
        assert_eq!(snap.payments_settled, 1);
        assert_eq!(snap.rate_limited, 0);

        let text = metrics.prometheus();
        assert!(text.contains("modexo_challenges_issued_total 2"));
        assert!(text.contains("modexo_payments_settled_total 1"));
    }
}
