//! Network congestion estimator
//!
//! Keeps a bounded rolling window of chain telemetry and derives the
//! congestion level, a 0-100 score, priority fee estimates, confirmation
//! time estimates and a "send now or wait" recommendation from it.
//!
//! Telemetry is synthesized by a random walk around a configured baseline;
//! externally observed samples can be fed in through [`CongestionMonitor::record_sample`].

use crate::config::NetworkConfig;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::debug;

/// Base signature fee in lamports
pub const BASE_FEE_LAMPORTS: u64 = 5_000;
/// Fixed processing overhead added to confirmation estimates
pub const PROCESSING_OVERHEAD_MS: f64 = 400.0;

const TPS_CEILING: f64 = 4_000.0;
const BLOCK_TIME_FLOOR_MS: f64 = 400.0;
const BLOCK_TIME_SPAN_MS: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl CongestionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "low",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::High => "high",
            CongestionLevel::Severe => "severe",
        }
    }

    /// Typical priority fee in micro-lamports per compute unit
    pub fn priority_fee(&self) -> u64 {
        match self {
            CongestionLevel::Low => 1_000,
            CongestionLevel::Moderate => 10_000,
            CongestionLevel::High => 100_000,
            CongestionLevel::Severe => 1_000_000,
        }
    }

    pub fn slots_to_confirm(&self) -> u32 {
        match self {
            CongestionLevel::Low => 1,
            CongestionLevel::Moderate => 2,
            CongestionLevel::High => 4,
            CongestionLevel::Severe => 8,
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

impl Urgency {
    pub fn fee_multiplier(&self) -> f64 {
        match self {
            Urgency::Low => 0.5,
            Urgency::Normal => 1.0,
            Urgency::High => 2.0,
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "normal" | "medium" => Ok(Urgency::Normal),
            "high" | "urgent" => Ok(Urgency::High),
            other => Err(format!("unknown urgency: {}", other)),
        }
    }
}

fn tps_tier(tps: f64) -> CongestionLevel {
    if tps < 1_500.0 {
        CongestionLevel::Low
    } else if tps < 2_500.0 {
        CongestionLevel::Moderate
    } else if tps < 4_000.0 {
        CongestionLevel::High
    } else {
        CongestionLevel::Severe
    }
}

fn block_time_tier(block_time_ms: f64) -> CongestionLevel {
    if block_time_ms <= 400.0 {
        CongestionLevel::Low
    } else if block_time_ms <= 550.0 {
        CongestionLevel::Moderate
    } else if block_time_ms <= 700.0 {
        CongestionLevel::High
    } else {
        CongestionLevel::Severe
    }
}

/// The worse of the TPS tier and the block time tier
pub fn determine_congestion_level(tps: f64, block_time_ms: f64) -> CongestionLevel {
    tps_tier(tps).max(block_time_tier(block_time_ms))
}

/// 0-100; 60% weight on throughput, 40% on block time
pub fn congestion_score(tps: f64, block_time_ms: f64) -> f64 {
    let tps_norm = (tps / TPS_CEILING).clamp(0.0, 1.0);
    let block_norm = ((block_time_ms - BLOCK_TIME_FLOOR_MS) / BLOCK_TIME_SPAN_MS).clamp(0.0, 1.0);
    ((0.6 * tps_norm + 0.4 * block_norm) * 100.0 * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub slot: u64,
    pub tps: f64,
    pub block_time_ms: f64,
    pub congestion: CongestionLevel,
    pub timestamp: DateTime<Utc>,
}

impl NetworkState {
    pub fn new(slot: u64, tps: f64, block_time_ms: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            slot,
            tps,
            block_time_ms,
            congestion: determine_congestion_level(tps, block_time_ms),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub urgency: Urgency,
    pub congestion: CongestionLevel,
    pub priority_fee_micro_lamports: u64,
    pub base_fee_lamports: u64,
    pub estimated_confirmation_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayRecommendation {
    pub should_delay: bool,
    pub delay_secs: u64,
    pub congestion: CongestionLevel,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub current: Option<NetworkState>,
    pub congestion: CongestionLevel,
    pub score: f64,
    pub average_tps: f64,
    pub average_block_time_ms: f64,
    pub samples: usize,
}

/// Next random-walk sample, pulled back toward the baseline
pub fn synthesize_sample<R: Rng + ?Sized>(
    previous: Option<&NetworkState>,
    config: &NetworkConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> NetworkState {
    let (slot, tps, block_time) = match previous {
        Some(prev) => (prev.slot, prev.tps, prev.block_time_ms),
        None => (250_000_000, config.baseline_tps, config.baseline_block_time_ms),
    };

    let tps = tps + rng.gen_range(-250.0..=250.0) + (config.baseline_tps - tps) * 0.1;
    let tps = tps.clamp(500.0, 6_000.0);
    let block_time = block_time
        + rng.gen_range(-40.0..=40.0)
        + (config.baseline_block_time_ms - block_time) * 0.1;
    let block_time = block_time.clamp(350.0, 900.0);

    let elapsed_ms = config.sample_interval_secs.max(1) as f64 * 1_000.0;
    let slots_advanced = (elapsed_ms / block_time).round().max(1.0) as u64;

    NetworkState::new(slot + slots_advanced, tps, block_time, now)
}

pub struct CongestionMonitor {
    config: NetworkConfig,
    history: RwLock<VecDeque<NetworkState>>,
}

impl CongestionMonitor {
    pub fn new(config: NetworkConfig) -> Self {
        let capacity = config.history_size.max(1);
        Self {
            config,
            history: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(NetworkConfig::default())
    }

    /// Append an observed sample, dropping the oldest beyond the window
    pub async fn record_sample(&self, state: NetworkState) {
        let mut history = self.history.write().await;
        history.push_back(state);
        while history.len() > self.config.history_size.max(1) {
            history.pop_front();
        }
    }

    /// Synthesize and record the next sample
    pub async fn sample(&self) -> NetworkState {
        let mut history = self.history.write().await;
        let next = {
            let mut rng = rand::thread_rng();
            synthesize_sample(history.back(), &self.config, Utc::now(), &mut rng)
        };
        history.push_back(next.clone());
        while history.len() > self.config.history_size.max(1) {
            history.pop_front();
        }
        debug!(
            "Network sample slot={} tps={:.0} block_time={:.0}ms ({})",
            next.slot, next.tps, next.block_time_ms, next.congestion
        );
        next
    }

    pub async fn current(&self) -> Option<NetworkState> {
        self.history.read().await.back().cloned()
    }

    pub async fn history(&self) -> Vec<NetworkState> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Averages over the window, falling back to the baseline when empty
    async fn averages(&self) -> (f64, f64) {
        let history = self.history.read().await;
        if history.is_empty() {
            return (self.config.baseline_tps, self.config.baseline_block_time_ms);
        }
        let n = history.len() as f64;
        let tps = history.iter().map(|s| s.tps).sum::<f64>() / n;
        let block = history.iter().map(|s| s.block_time_ms).sum::<f64>() / n;
        (tps, block)
    }

    async fn current_level(&self) -> CongestionLevel {
        match self.current().await {
            Some(state) => state.congestion,
            None => determine_congestion_level(
                self.config.baseline_tps,
                self.config.baseline_block_time_ms,
            ),
        }
    }

    pub async fn status(&self) -> NetworkStatus {
        let current = self.current().await;
        let (average_tps, average_block_time_ms) = self.averages().await;
        let (congestion, score) = match &current {
            Some(s) => (s.congestion, congestion_score(s.tps, s.block_time_ms)),
            None => (
                determine_congestion_level(average_tps, average_block_time_ms),
                congestion_score(average_tps, average_block_time_ms),
            ),
        };

        NetworkStatus {
            current,
            congestion,
            score,
            average_tps,
            average_block_time_ms,
            samples: self.history.read().await.len(),
        }
    }

    /// Recency-weighted priority fee over the window, scaled by urgency
    pub async fn estimate_priority_fee(&self, urgency: Urgency) -> FeeEstimate {
        let congestion = self.current_level().await;
        let weighted = {
            let history = self.history.read().await;
            if history.is_empty() {
                congestion.priority_fee() as f64
            } else {
                let (sum, weights) = history.iter().enumerate().fold(
                    (0.0, 0.0),
                    |(sum, weights), (i, s)| {
                        let w = (i + 1) as f64;
                        (sum + w * s.congestion.priority_fee() as f64, weights + w)
                    },
                );
                sum / weights
            }
        };

        FeeEstimate {
            urgency,
            congestion,
            priority_fee_micro_lamports: (weighted * urgency.fee_multiplier()).round() as u64,
            base_fee_lamports: BASE_FEE_LAMPORTS,
            estimated_confirmation_ms: self.estimate_confirmation_ms().await,
        }
    }

    /// Average block time x slots-to-confirm for the current tier + overhead
    pub async fn estimate_confirmation_ms(&self) -> u64 {
        let (_, avg_block) = self.averages().await;
        let slots = self.current_level().await.slots_to_confirm() as f64;
        (avg_block * slots + PROCESSING_OVERHEAD_MS).round() as u64
    }

    pub async fn should_delay(&self, urgency: Urgency) -> DelayRecommendation {
        let congestion = self.current_level().await;
        let (should_delay, delay_secs, reason) = match (congestion, urgency) {
            (CongestionLevel::Severe, Urgency::High) => {
                (false, 0, "severe congestion, proceeding due to high urgency")
            }
            (CongestionLevel::Severe, _) => (true, 30, "severe congestion, wait for the network to recover"),
            (CongestionLevel::High, Urgency::Low) => (true, 10, "high congestion, low urgency can wait"),
            _ => (false, 0, "network conditions acceptable"),
        };

        DelayRecommendation {
            should_delay,
            delay_secs,
            congestion,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state(tps: f64, block: f64) -> NetworkState {
        NetworkState::new(1, tps, block, Utc::now())
    }

    #[test]
    fn test_determine_congestion_level() {
        assert_eq!(determine_congestion_level(1000.0, 300.0), CongestionLevel::Low);
        assert_eq!(determine_congestion_level(5000.0, 800.0), CongestionLevel::Severe);
        assert_eq!(determine_congestion_level(2000.0, 380.0), CongestionLevel::Moderate);
        // Block time dominates when worse
        assert_eq!(determine_congestion_level(1000.0, 650.0), CongestionLevel::High);
        assert_eq!(determine_congestion_level(1499.0, 400.0), CongestionLevel::Low);
        assert_eq!(determine_congestion_level(1500.0, 400.0), CongestionLevel::Moderate);
    }

    #[test]
    fn test_congestion_score_bounds() {
        assert_eq!(congestion_score(0.0, 300.0), 0.0);
        assert_eq!(congestion_score(10_000.0, 2_000.0), 100.0);
        assert_eq!(congestion_score(2000.0, 600.0), 50.0);
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let monitor = CongestionMonitor::new(NetworkConfig {
            history_size: 3,
            ..NetworkConfig::default()
        });
        for i in 0..5 {
            monitor.record_sample(NetworkState::new(i, 1000.0, 400.0, Utc::now())).await;
        }
        let history = monitor.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].slot, 2);
        assert_eq!(monitor.current().await.unwrap().slot, 4);
    }

    #[tokio::test]
    async fn test_fee_estimate_scales_with_urgency() {
        let monitor = CongestionMonitor::with_defaults();
        monitor.record_sample(state(1000.0, 380.0)).await;

        let normal = monitor.estimate_priority_fee(Urgency::Normal).await;
        assert_eq!(normal.priority_fee_micro_lamports, 1_000);
        assert_eq!(normal.base_fee_lamports, 5_000);
        assert_eq!(monitor.estimate_priority_fee(Urgency::Low).await.priority_fee_micro_lamports, 500);
        assert_eq!(monitor.estimate_priority_fee(Urgency::High).await.priority_fee_micro_lamports, 2_000);
    }

    #[tokio::test]
    async fn test_fee_estimate_weights_recent_samples() {
        let monitor = CongestionMonitor::with_defaults();
        monitor.record_sample(state(1000.0, 380.0)).await;
        monitor.record_sample(state(5000.0, 800.0)).await;

        // (1 * 1_000 + 2 * 1_000_000) / 3
        let fee = monitor.estimate_priority_fee(Urgency::Normal).await;
        assert_eq!(fee.priority_fee_micro_lamports, 667_000);
        assert_eq!(fee.congestion, CongestionLevel::Severe);
    }

    #[tokio::test]
    async fn test_confirmation_estimate() {
        let monitor = CongestionMonitor::with_defaults();
        monitor.record_sample(state(1000.0, 400.0)).await;
        assert_eq!(monitor.estimate_confirmation_ms().await, 800);

        monitor.record_sample(state(3000.0, 600.0)).await;
        // avg block 500ms x 4 slots + 400ms
        assert_eq!(monitor.estimate_confirmation_ms().await, 2_400);
    }

    #[tokio::test]
    async fn test_delay_recommendation() {
        let monitor = CongestionMonitor::with_defaults();
        monitor.record_sample(state(5000.0, 800.0)).await;
        assert!(monitor.should_delay(Urgency::Normal).await.should_delay);
        assert_eq!(monitor.should_delay(Urgency::Low).await.delay_secs, 30);
        assert!(!monitor.should_delay(Urgency::High).await.should_delay);

        monitor.record_sample(state(3000.0, 400.0)).await;
        assert_eq!(monitor.should_delay(Urgency::Low).await.delay_secs, 10);
        assert!(!monitor.should_delay(Urgency::Normal).await.should_delay);
    }

    #[test]
    fn test_synthetic_samples_stay_in_range() {
        let config = NetworkConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut prev: Option<NetworkState> = None;
        for _ in 0..500 {
            let next = synthesize_sample(prev.as_ref(), &config, Utc::now(), &mut rng);
            assert!((500.0..=6000.0).contains(&next.tps));
            assert!((350.0..=900.0).contains(&next.block_time_ms));
            if let Some(p) = &prev {
                assert!(next.slot > p.slot);
            }
            prev = Some(next);
        }
    }

    #[tokio::test]
    async fn test_empty_monitor_uses_baseline() {
        let monitor = CongestionMonitor::with_defaults();
        let status = monitor.status().await;
        assert!(status.current.is_none());
        assert_eq!(status.samples, 0);
        assert_eq!(status.congestion, CongestionLevel::Moderate);
        monitor.sample().await;
        assert_eq!(monitor.status().await.samples, 1);
    }

    #[test]
    fn test_urgency_parse() {
        assert_eq!("HIGH".parse::<Urgency>().unwrap(), Urgency::High);
        assert!("whenever".parse::<Urgency>().is_err());
    }
}
