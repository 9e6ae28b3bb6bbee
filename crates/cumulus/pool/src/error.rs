//! Pool error types

use cumulus_types::{ImageId, ObjectKind};
use thiserror::Error;

/// Pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("{kind} [{id}] does not exist")]
    NotFound { kind: ObjectKind, id: u32 },

    #[error("{kind} [{id}] already exists")]
    AlreadyExists { kind: ObjectKind, id: u32 },

    #[error("NAME is already taken by IMAGE {existing}.")]
    NameTaken { name: String, existing: ImageId },

    #[error("{0}")]
    InvalidTemplate(String),

    #[error("{0}")]
    Incompatible(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("No free {} ids left", .0.name())]
    IdsExhausted(ObjectKind),
}

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;
