// ABOUTME: Domain error taxonomy for the consent engine
// ABOUTME: Storage internals are wrapped so raw driver errors never reach callers

use thiserror::Error;

use sammati_purposes::PurposeStoreError;
use sammati_storage::StorageError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Expired: {0}")]
    ExpiredState(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PurposeStoreError> for EngineError {
    fn from(err: PurposeStoreError) -> Self {
        match err {
            PurposeStoreError::Storage(e) => EngineError::Storage(e),
            PurposeStoreError::NotFound(id) => EngineError::NotFound(format!("purpose {}", id)),
            PurposeStoreError::CategoryNotOwned { .. } => EngineError::Validation(err.to_string()),
            PurposeStoreError::RenewalPolicy(msg) => EngineError::Validation(msg),
            PurposeStoreError::VersionsReferenced(_) => EngineError::Conflict(err.to_string()),
        }
    }
}
