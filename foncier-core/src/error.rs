//! Error taxonomy for the registry engines.
//!
//! Every rejected operation maps to exactly one variant, with enough
//! context to render a meaningful message. Guard violations are detected
//! before any write; `Conflict` and `Storage` surface after the commit
//! attempt and are the caller's retry decision — the engines never retry
//! on their own (a blind retry could double-apply an ownership transfer).

use thiserror::Error;

use crate::model::{EntityKind, ParcelStatus};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Malformed or out-of-range input (negative amount, self-transfer, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A workflow state machine guard rejected the transition.
    #[error("invalid {kind} transition: {detail}")]
    InvalidTransition { kind: EntityKind, detail: String },

    /// The parcel's current status does not admit the requested hold.
    #[error("parcel {numero} is {current} and cannot become {requested}")]
    InvalidParcelState {
        numero: String,
        current: ParcelStatus,
        requested: ParcelStatus,
    },

    /// The actor lacks the role or status the operation requires.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// A concurrent mutation won the commit race; the caller may retry.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    /// Repository failure. Fatal to the operation, not to the process.
    #[error("storage failure: {0}")]
    Storage(StoreError),
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(kind: EntityKind, detail: impl Into<String>) -> Self {
        RegistryError::InvalidTransition {
            kind,
            detail: detail.into(),
        }
    }
}

/// Commit-time conflicts become [`RegistryError::Conflict`]; everything
/// else from the store is a storage failure.
impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } | StoreError::Duplicate { .. } => {
                RegistryError::Conflict(err.to_string())
            }
            other => RegistryError::Storage(other),
        }
    }
}

/// Convenience alias used across the engines.
pub type RegistryResult<T> = Result<T, RegistryError>;
