pub mod congestion;
pub mod escrow;
pub mod pricing;
pub mod rate_limiter;
pub mod session;
pub mod transaction;
pub mod wallet_auth;

pub use congestion::{
    determine_congestion_level, CongestionLevel, CongestionMonitor, DelayRecommendation,
    FeeEstimate, NetworkState, NetworkStatus, Urgency,
};
pub use escrow::{DisputeResolution, EscrowAccount, EscrowLedger, EscrowStats, EscrowStatus};
pub use pricing::{
    AgentPricing, DiscountKind, DiscountRule, PriceQuote, PricingEngine, PricingTier,
    WalletPurchaseStats,
};
pub use rate_limiter::{ActionType, RateLimitBucket, RateLimitDecision, RateLimiter};
pub use session::{PaymentSession, PaymentSessionStore, SessionStatus};
pub use transaction::{TransactionState, TransactionStatus, TransactionTracker};
pub use wallet_auth::{AuthChallenge, AuthToken, WalletAuthSession, WalletAuthenticator};
