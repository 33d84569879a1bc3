//! x402 payment protocol glue: wire types, the facilitator client and the
//! axum gate in front of paid agent routes.

pub mod facilitator;
pub mod middleware;
pub mod types;

pub use facilitator::{Facilitator, HttpFacilitator};
pub use middleware::{x402_middleware, PaymentContext, PaymentGate, WALLET_HEADER};
pub use types::{
    PaymentRequiredResponse, PaymentRequirements, SettleResponse, VerifyResponse,
    PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER, PAYMENT_SESSION_HEADER,
};
