//! Storage backends.
//!
//! `PgStore` is the production backend. `MemoryStore` keeps everything in
//! process and can be told to fail at a chosen step, which is how the
//! rollback paths get tested.

mod memory;
mod pg;

pub use memory::{FailPoint, MemoryStore};
pub use pg::PgStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("balance out of range")]
    OutOfRange,

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("injected failure at {0:?}")]
    Injected(FailPoint),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    #[cfg(test)]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
