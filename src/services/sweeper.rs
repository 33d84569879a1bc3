//! Background maintenance loops
//!
//! The sweeper expires stale records across every in-memory store and rolls
//! the pricing demand windows. The network sampler feeds the congestion
//! monitor. Both stop when the shutdown watch flips to `true`.

use crate::adapters::{MarketDataSource, PredictionMarketSource};
use crate::payment::{
    CongestionMonitor, EscrowLedger, PaymentSessionStore, PricingEngine, RateLimiter,
    TransactionTracker, WalletAuthenticator,
};
use crate::services::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rate_limit_buckets: usize,
    pub sessions_expired: usize,
    pub sessions_removed: usize,
    pub transactions_expired: usize,
    pub escrows_expired: usize,
    pub auth_tokens_removed: usize,
    pub auth_sessions_removed: usize,
    pub demand_windows_rolled: usize,
    pub cache_entries_purged: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.rate_limit_buckets
            + self.sessions_expired
            + self.sessions_removed
            + self.transactions_expired
            + self.escrows_expired
            + self.auth_tokens_removed
            + self.auth_sessions_removed
            + self.demand_windows_rolled
            + self.cache_entries_purged
    }
}

pub struct Sweeper {
    pub rate_limiter: Arc<RateLimiter>,
    pub sessions: Arc<PaymentSessionStore>,
    pub transactions: Arc<TransactionTracker>,
    pub escrow: Arc<EscrowLedger>,
    pub wallet_auth: Arc<WalletAuthenticator>,
    pub pricing: Arc<PricingEngine>,
    pub market: Arc<dyn MarketDataSource>,
    pub predictions: Arc<dyn PredictionMarketSource>,
    pub metrics: Arc<Metrics>,
}

impl Sweeper {
    pub async fn sweep_once(&self) -> SweepReport {
        let (sessions_expired, sessions_removed) = self.sessions.sweep().await;
        let (auth_tokens_removed, auth_sessions_removed) = self.wallet_auth.sweep().await;

        let report = SweepReport {
            rate_limit_buckets: self.rate_limiter.sweep().await,
            sessions_expired,
            sessions_removed,
            transactions_expired: self.transactions.sweep().await,
            escrows_expired: self.escrow.sweep_expired().await,
            auth_tokens_removed,
            auth_sessions_removed,
            demand_windows_rolled: self.pricing.roll_demand_windows().await,
            cache_entries_purged: self.market.purge_expired() + self.predictions.purge_expired(),
        };

        if report.total() > 0 {
            debug!("Sweep: {:?}", report);
        }
        report
    }

    pub async fn run(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        info!("Sweeper started (interval: {}s)", interval_secs);
        let mut timer = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // Skip the immediate first tick
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.sweep_once().await;
                    self.metrics.log_status();
                }
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("Sweeper stopped");
    }
}

/// Feed synthetic telemetry into the congestion monitor
pub async fn run_network_sampler(
    monitor: Arc<CongestionMonitor>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Network sampler started (interval: {}s)", interval_secs);
    let mut timer = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = timer.tick() => {
                let sample = monitor.sample().await;
                debug!(
                    "Network sample slot={} tps={:.0} block={:.0}ms ({})",
                    sample.slot, sample.tps, sample.block_time_ms, sample.congestion
                );
            }
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }
    }
    info!("Network sampler stopped");
}
