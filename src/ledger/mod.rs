mod dto;
mod engine;
pub mod handlers;
mod repo_types;
mod store;

use crate::state::AppState;
use axum::Router;

pub use engine::{LedgerEngine, LedgerError};
pub use repo_types::{NewTransaction, Transaction, TransactionRow};
pub use store::{BalanceScope, LedgerStore};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::balance_routes())
        .merge(handlers::transaction_routes())
}
