use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the persistence gateway.
///
/// Callers treat these as diagnostics, not control flow: the monitor drops
/// or retains in-memory state depending on which operation failed, and only
/// the startup probe escalates a store error to a fatal exit.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store error: {0}")]
    Internal(String),
}
