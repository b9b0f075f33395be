use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::dto::{
    BalanceResponse, PostTransactionRequest, SetBalanceRequest, TransactionCreatedResponse,
    TransactionItem,
};
use crate::{
    auth::extractors::AuthUser,
    error::{method_not_allowed, AppError},
    extract::ApiJson,
    state::AppState,
};

pub fn balance_routes() -> Router<AppState> {
    Router::new().route(
        "/balance",
        get(get_balance)
            .post(set_balance)
            .fallback(method_not_allowed),
    )
}

pub fn transaction_routes() -> Router<AppState> {
    Router::new().route(
        "/transactions",
        get(list_transactions)
            .post(post_transaction)
            .fallback(method_not_allowed),
    )
}

#[instrument(skip(state))]
pub async fn get_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.ledger.get_balance(user_id).await?;
    Ok(Json(BalanceResponse { balance }))
}

/// Administrative override of the caller's own balance. Writes no ledger
/// entry, so the balance stops matching the transaction history.
#[instrument(skip(state, payload))]
pub async fn set_balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<SetBalanceRequest>,
) -> Result<StatusCode, AppError> {
    state.ledger.set_balance(user_id, payload.balance).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<TransactionItem>>, AppError> {
    let items = state
        .ledger
        .list_transactions(user_id)
        .await?
        .into_iter()
        .map(TransactionItem::from)
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state, payload))]
pub async fn post_transaction(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<PostTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionCreatedResponse>), AppError> {
    let transaction = state
        .ledger
        .post_transaction(
            user_id,
            &payload.kind,
            payload.category.as_deref(),
            payload.amount,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TransactionCreatedResponse {
            status: "Transaction completed",
            transaction: transaction.into(),
        }),
    ))
}
