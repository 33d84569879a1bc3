use crate::adapters::{MarketDataSource, PredictionMarketSource, Repository};
use crate::agents::{AgentRegistry, Orchestrator};
use crate::api::auth::AdminAuth;
use crate::config::AppConfig;
use crate::payment::{
    CongestionMonitor, EscrowLedger, PaymentSessionStore, PricingEngine, RateLimiter,
    TransactionTracker, WalletAuthenticator,
};
use crate::services::{AgentService, Metrics, Sweeper};
use crate::x402::{Facilitator, PaymentGate};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Agent manifest
    pub registry: Arc<AgentRegistry>,

    // Coordination stores, one per process
    pub rate_limiter: Arc<RateLimiter>,
    pub pricing: Arc<PricingEngine>,
    pub escrow: Arc<EscrowLedger>,
    pub sessions: Arc<PaymentSessionStore>,
    pub transactions: Arc<TransactionTracker>,
    pub wallet_auth: Arc<WalletAuthenticator>,
    pub network: Arc<CongestionMonitor>,

    pub market: Arc<dyn MarketDataSource>,
    pub predictions: Arc<dyn PredictionMarketSource>,
    pub repository: Arc<dyn Repository>,

    pub agents: Arc<AgentService>,
    pub orchestrator: Arc<Orchestrator>,

    /// x402 gate in front of the paid agent routes
    pub gate: Arc<PaymentGate>,

    pub metrics: Arc<Metrics>,
    pub admin: AdminAuth,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every store and service from configuration and the external
    /// collaborators
    pub async fn build(
        config: AppConfig,
        market: Arc<dyn MarketDataSource>,
        predictions: Arc<dyn PredictionMarketSource>,
        repository: Arc<dyn Repository>,
        facilitator: Arc<dyn Facilitator>,
        admin: AdminAuth,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new());

        let registry = Arc::new(AgentRegistry::builtin());
        let pricing = Arc::new(PricingEngine::new(config.pricing.clone()));
        registry.register_pricing(&pricing).await;

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let sessions = Arc::new(PaymentSessionStore::new(config.session.clone()));
        let transactions = Arc::new(TransactionTracker::new(&config.session));
        let network = Arc::new(CongestionMonitor::new(config.network.clone()));

        let agents = Arc::new(AgentService::new(
            market.clone(),
            predictions.clone(),
            repository.clone(),
            network.clone(),
        ));
        let orchestrator = Arc::new(
            Orchestrator::new(config.orchestrator.clone(), agents.clone())
                .with_metrics(metrics.clone()),
        );

        let gate = Arc::new(PaymentGate {
            config: config.x402.clone(),
            registry: registry.clone(),
            rate_limiter: rate_limiter.clone(),
            pricing: pricing.clone(),
            sessions: sessions.clone(),
            transactions: transactions.clone(),
            facilitator,
            metrics: metrics.clone(),
        });

        Self {
            registry,
            rate_limiter,
            pricing,
            escrow: Arc::new(EscrowLedger::new(config.escrow.clone())),
            sessions,
            transactions,
            wallet_auth: Arc::new(WalletAuthenticator::new(config.auth.clone())),
            network,
            market,
            predictions,
            repository,
            agents,
            orchestrator,
            gate,
            metrics,
            admin,
            start_time: Utc::now(),
            config,
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }

    /// Background sweeper over this state's stores
    pub fn sweeper(&self) -> Sweeper {
        Sweeper {
            rate_limiter: self.rate_limiter.clone(),
            sessions: self.sessions.clone(),
            transactions: self.transactions.clone(),
            escrow: self.escrow.clone(),
            wallet_auth: self.wallet_auth.clone(),
            pricing: self.pricing.clone(),
            market: self.market.clone(),
            predictions: self.predictions.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
