use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::{
    handlers::{not_found, ApiResult},
    state::AppState,
};
use crate::payment::{PaymentSession, TransactionState};

/// GET /api/sessions/:id
pub async fn get_payment_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PaymentSession>> {
    state
        .sessions
        .get_session(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("payment session not found: {}", id)))
}

/// GET /api/transactions/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TransactionState>> {
    state
        .transactions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("transaction not found: {}", id)))
}
