pub mod account;
pub mod agents;
pub mod escrow;
pub mod network;
pub mod payments;
pub mod pricing;
pub mod system;
pub mod tasks;
pub mod tokens;
pub mod wallet;
pub mod whales;

pub use account::*;
pub use agents::*;
pub use escrow::*;
pub use network::*;
pub use payments::*;
pub use pricing::*;
pub use system::*;
pub use tasks::*;
pub use tokens::*;
pub use wallet::*;
pub use whales::*;

use axum::http::StatusCode;
use tracing::warn;

use crate::error::ModexoError;

pub type ApiResult<T> = std::result::Result<T, (StatusCode, String)>;

/// Map a crate error onto the handler error pair
pub fn api_error(e: ModexoError) -> (StatusCode, String) {
    let status = e.status_code();
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (status, e.to_string())
}

pub fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

pub fn not_found(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}
