//! Dynamic Pricing Engine
//!
//! Per-agent price = base × tier multiplier × dynamic multiplier × units,
//! less the single best discount that applies to the paying wallet.
//! The dynamic multiplier drifts with demand measured over wall-clock windows.

use crate::config::PricingConfig;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// USDC carries 6 decimals; quotes are rounded to that precision
pub const PRICE_SCALE: u32 = 6;

/// Pricing tier of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingTier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl PricingTier {
    pub fn multiplier(&self) -> Decimal {
        match self {
            PricingTier::Free => Decimal::ZERO,
            PricingTier::Basic => Decimal::ONE,
            PricingTier::Premium => dec!(1.5),
            PricingTier::Enterprise => dec!(2.5),
        }
    }
}

/// Current pricing state of one agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPricing {
    pub agent_id: String,
    pub base_price: Decimal,
    pub tier: PricingTier,
    pub tier_multiplier: Decimal,
    pub dynamic_multiplier: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Demand counters of one agent
#[derive(Debug, Clone)]
struct DemandWindow {
    window_start: DateTime<Utc>,
    current: u64,
    history: VecDeque<u64>,
}

impl DemandWindow {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            current: 0,
            history: VecDeque::new(),
        }
    }

    fn average(&self) -> Option<Decimal> {
        if self.history.is_empty() {
            return None;
        }
        let total: u64 = self.history.iter().sum();
        Some(Decimal::from(total) / Decimal::from(self.history.len() as u64))
    }
}

/// Discount rule kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountKind {
    /// Wallet has at least `min_purchases` settled purchases
    Volume { min_purchases: u64 },
    /// Wallet's first purchase is at least `min_days` old
    Loyalty { min_days: i64 },
    /// Valid for everyone between two instants
    Promotional {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    /// Applies to one wallet only
    WalletSpecific { wallet: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountRule {
    pub id: String,
    #[serde(flatten)]
    pub kind: DiscountKind,
    /// Fraction off the price (0.10 = 10%)
    pub percent: Decimal,
    /// Restrict the rule to one agent
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl DiscountRule {
    pub fn new(id: impl Into<String>, kind: DiscountKind, percent: Decimal) -> Self {
        Self {
            id: id.into(),
            kind,
            percent,
            agent_id: None,
        }
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    fn applies(
        &self,
        agent_id: &str,
        wallet: &str,
        stats: Option<&WalletPurchaseStats>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.agent_id.as_deref().is_some_and(|a| a != agent_id) {
            return false;
        }
        match &self.kind {
            DiscountKind::Volume { min_purchases } => {
                stats.is_some_and(|s| s.purchases >= *min_purchases)
            }
            DiscountKind::Loyalty { min_days } => {
                stats.is_some_and(|s| (now - s.first_purchase).num_days() >= *min_days)
            }
            DiscountKind::Promotional { starts_at, ends_at } => {
                now >= *starts_at && now < *ends_at
            }
            DiscountKind::WalletSpecific { wallet: target } => target == wallet,
        }
    }
}

/// Purchase history used by volume/loyalty rules
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPurchaseStats {
    pub purchases: u64,
    pub first_purchase: DateTime<Utc>,
    pub last_purchase: DateTime<Utc>,
}

/// A computed price for one call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub agent_id: String,
    pub units: u32,
    pub base_price: Decimal,
    pub tier: PricingTier,
    pub tier_multiplier: Decimal,
    pub dynamic_multiplier: Decimal,
    pub discount_percent: Decimal,
    pub discount_rule: Option<String>,
    pub final_price: Decimal,
}

impl PriceQuote {
    pub fn is_free(&self) -> bool {
        self.final_price.is_zero()
    }
}

struct PricingState {
    agents: HashMap<String, AgentPricing>,
    demand: HashMap<String, DemandWindow>,
    wallets: HashMap<String, WalletPurchaseStats>,
    rules: Vec<DiscountRule>,
}

/// Dynamic pricing engine
pub struct PricingEngine {
    config: PricingConfig,
    state: RwLock<PricingState>,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            config,
            state: RwLock::new(PricingState {
                agents: HashMap::new(),
                demand: HashMap::new(),
                wallets: HashMap::new(),
                rules: Self::default_rules(),
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PricingConfig::default())
    }

    fn default_rules() -> Vec<DiscountRule> {
        vec![
            DiscountRule::new("volume-10", DiscountKind::Volume { min_purchases: 10 }, dec!(0.10)),
            DiscountRule::new("volume-50", DiscountKind::Volume { min_purchases: 50 }, dec!(0.20)),
            DiscountRule::new("loyalty-30d", DiscountKind::Loyalty { min_days: 30 }, dec!(0.05)),
        ]
    }

    /// Register (or replace) an agent's base price and tier
    pub async fn register_agent(&self, agent_id: &str, base_price: Decimal, tier: PricingTier) {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.agents.insert(
            agent_id.to_string(),
            AgentPricing {
                agent_id: agent_id.to_string(),
                base_price,
                tier,
                tier_multiplier: tier.multiplier(),
                dynamic_multiplier: Decimal::ONE,
                last_updated: now,
            },
        );
        state
            .demand
            .entry(agent_id.to_string())
            .or_insert_with(|| DemandWindow::new(now));
    }

    pub async fn pricing(&self, agent_id: &str) -> Option<AgentPricing> {
        self.state.read().await.agents.get(agent_id).cloned()
    }

    pub async fn all_pricing(&self) -> Vec<AgentPricing> {
        let mut all: Vec<_> = self.state.read().await.agents.values().cloned().collect();
        all.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        all
    }

    /// Count one paid request toward the agent's current demand window
    pub async fn record_request(&self, agent_id: &str) {
        self.record_request_at(agent_id, Utc::now()).await
    }

    pub async fn record_request_at(&self, agent_id: &str, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        self.roll_agent(&mut state, agent_id, now);
        if let Some(window) = state.demand.get_mut(agent_id) {
            window.current += 1;
        }
    }

    /// Roll every agent whose demand window has elapsed
    pub async fn roll_demand_windows(&self) -> usize {
        self.roll_demand_windows_at(Utc::now()).await
    }

    pub async fn roll_demand_windows_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        let ids: Vec<String> = state.agents.keys().cloned().collect();
        ids.iter()
            .filter(|id| self.roll_agent(&mut state, id, now))
            .count()
    }

    /// Close elapsed windows for one agent and nudge its multiplier.
    /// Returns true when at least one window was closed.
    fn roll_agent(&self, state: &mut PricingState, agent_id: &str, now: DateTime<Utc>) -> bool {
        let window_len = Duration::seconds(self.config.demand_window_secs as i64);
        let Some(window) = state.demand.get_mut(agent_id) else {
            return false;
        };
        if now < window.window_start + window_len {
            return false;
        }

        let finished = window.current;
        let average = window.average();

        window.history.push_back(finished);
        while window.history.len() > self.config.demand_history.max(1) {
            window.history.pop_front();
        }
        window.current = 0;

        // Windows with no traffic at all are skipped in one step so a long idle
        // period does not replay dozens of empty windows.
        let elapsed = (now - window.window_start).num_seconds();
        let skipped = elapsed / window_len.num_seconds().max(1);
        window.window_start = window.window_start + window_len * skipped as i32;

        let Some(average) = average else {
            return true;
        };
        let Some(pricing) = state.agents.get_mut(agent_id) else {
            return true;
        };

        let current = Decimal::from(finished);
        let before = pricing.dynamic_multiplier;
        let mut next = before;
        if current > average * self.config.surge_ratio {
            next = before * self.config.step_up;
        } else if current < average * self.config.lull_ratio {
            next = before * self.config.step_down;
        }
        next = next
            .max(self.config.min_multiplier)
            .min(self.config.max_multiplier)
            .round_dp(4);

        if next != before {
            pricing.dynamic_multiplier = next;
            pricing.last_updated = now;
            info!(
                "Demand for {}: {} vs avg {:.2}, multiplier {} -> {}",
                agent_id, finished, average, before, next
            );
        }
        true
    }

    /// Record a settled purchase for discount eligibility
    pub async fn record_purchase(&self, wallet: &str) {
        self.record_purchase_at(wallet, Utc::now()).await
    }

    pub async fn record_purchase_at(&self, wallet: &str, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        let stats = state
            .wallets
            .entry(wallet.to_string())
            .or_insert_with(|| WalletPurchaseStats {
                purchases: 0,
                first_purchase: now,
                last_purchase: now,
            });
        stats.purchases += 1;
        stats.last_purchase = now;
    }

    pub async fn wallet_stats(&self, wallet: &str) -> Option<WalletPurchaseStats> {
        self.state.read().await.wallets.get(wallet).cloned()
    }

    pub async fn add_discount_rule(&self, rule: DiscountRule) {
        let mut state = self.state.write().await;
        state.rules.retain(|r| r.id != rule.id);
        debug!("Discount rule {} registered", rule.id);
        state.rules.push(rule);
    }

    pub async fn remove_discount_rule(&self, rule_id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.rules.len();
        state.rules.retain(|r| r.id != rule_id);
        before != state.rules.len()
    }

    pub async fn discount_rules(&self) -> Vec<DiscountRule> {
        self.state.read().await.rules.clone()
    }

    /// Price `units` calls of an agent for an optional wallet
    pub async fn calculate_price(
        &self,
        agent_id: &str,
        wallet: Option<&str>,
        units: u32,
    ) -> Option<PriceQuote> {
        self.calculate_price_at(agent_id, wallet, units, Utc::now()).await
    }

    pub async fn calculate_price_at(
        &self,
        agent_id: &str,
        wallet: Option<&str>,
        units: u32,
        now: DateTime<Utc>,
    ) -> Option<PriceQuote> {
        let mut state = self.state.write().await;
        self.roll_agent(&mut state, agent_id, now);
        let pricing = state.agents.get(agent_id)?.clone();
        let units = units.max(1);

        if pricing.tier == PricingTier::Free {
            return Some(PriceQuote {
                agent_id: pricing.agent_id,
                units,
                base_price: pricing.base_price,
                tier: pricing.tier,
                tier_multiplier: pricing.tier_multiplier,
                dynamic_multiplier: pricing.dynamic_multiplier,
                discount_percent: Decimal::ZERO,
                discount_rule: None,
                final_price: Decimal::ZERO,
            });
        }

        let (discount_percent, discount_rule) = wallet
            .map(|w| {
                let stats = state.wallets.get(w);
                state
                    .rules
                    .iter()
                    .filter(|r| r.applies(agent_id, w, stats, now))
                    .max_by(|a, b| a.percent.cmp(&b.percent))
                    .map(|r| (r.percent.min(Decimal::ONE), Some(r.id.clone())))
                    .unwrap_or((Decimal::ZERO, None))
            })
            .unwrap_or((Decimal::ZERO, None));

        let gross = pricing.base_price
            * pricing.tier_multiplier
            * pricing.dynamic_multiplier
            * Decimal::from(units);
        let final_price = (gross * (Decimal::ONE - discount_percent))
            .round_dp(PRICE_SCALE)
            .max(Decimal::ZERO);

        Some(PriceQuote {
            agent_id: pricing.agent_id,
            units,
            base_price: pricing.base_price,
            tier: pricing.tier,
            tier_multiplier: pricing.tier_multiplier,
            dynamic_multiplier: pricing.dynamic_multiplier,
            discount_percent,
            discount_rule,
            final_price,
        })
    }
}
