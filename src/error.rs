use thiserror::Error;

use crate::storage::StorageError;

/// Coarse classification the request boundary maps to transport responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Access,
    Validation,
    NotFound,
    Conflict,
    Timeout,
    Storage,
}

/// Messages never carry ids or rows belonging to another tenant.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Access(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Unauthenticated => ErrorKind::Unauthenticated,
            CoreError::Access(_) => ErrorKind::Access,
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        CoreError::NotFound { entity }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
