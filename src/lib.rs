pub mod adapters;
pub mod agents;
pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod payment;
pub mod services;
pub mod validation;
pub mod x402;

pub use agents::{AgentRegistry, Orchestrator};
pub use config::AppConfig;
pub use error::{ModexoError, Result};
pub use payment::{
    CongestionMonitor, EscrowLedger, PaymentSessionStore, PricingEngine, RateLimiter,
    TransactionTracker, WalletAuthenticator,
};
pub use x402::{Facilitator, HttpFacilitator, PaymentGate};
