//! Error types for the missive-store crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A row that must exist for the operation does not.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The memory backend is at its configured key limit.
    #[error("Store capacity exceeded: {used}/{capacity} keys")]
    CapacityExceeded { used: usize, capacity: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
