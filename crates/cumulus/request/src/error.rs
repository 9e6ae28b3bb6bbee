//! Request error taxonomy

use cumulus_auth::AuthError;
use cumulus_pool::PoolError;
use cumulus_quota::QuotaError;
use cumulus_types::{ObjectKind, UnknownImageType, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Referenced object absent at lock time
    NoExists,
    /// Well-formed request violating a business rule
    Action,
    /// Caller lacks a grant or quota
    Authorization,
    /// A collaborator failed
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::NoExists => "NO_EXISTS",
            ErrorCategory::Action => "ACTION",
            ErrorCategory::Authorization => "AUTHORIZATION",
            ErrorCategory::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Request errors
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Error getting {} [{id}].", .kind.name())]
    NoExists { kind: ObjectKind, id: u32 },

    #[error("KERNEL, RAMDISK and CONTEXT files must be non-persistent")]
    NotPersistable,

    #[error("KERNEL, RAMDISK and CONTEXT files cannot be cloned.")]
    NotClonable,

    #[error("Cannot change image type to an incompatible type for the current datastore.")]
    IncompatibleType,

    #[error("Clone not supported for FILE_DS Datastores")]
    FileDatastore,

    #[error("Not enough space in datastore")]
    NotEnoughSpace { requested: u64, available: u64 },

    #[error(transparent)]
    UnknownType(#[from] UnknownImageType),

    #[error("User [{uid}] : {reason}")]
    Authorization { uid: UserId, reason: String },

    #[error("{0}")]
    Quota(#[from] QuotaError),

    #[error("Could not {action} image: {reason}")]
    Enable { action: &'static str, reason: String },

    #[error("Could not make image {target}: {reason}")]
    Persistent { target: &'static str, reason: String },

    #[error("Error allocating a new image. {0}")]
    Allocation(PoolError),

    #[error("Authorization engine error: {0}")]
    AuthEngine(#[from] AuthError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl RequestError {
    pub fn no_exists(kind: ObjectKind, id: u32) -> Self {
        RequestError::NoExists { kind, id }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RequestError::NoExists { .. } => ErrorCategory::NoExists,
            RequestError::NotPersistable
            | RequestError::NotClonable
            | RequestError::IncompatibleType
            | RequestError::FileDatastore
            | RequestError::NotEnoughSpace { .. } => ErrorCategory::Action,
            RequestError::Authorization { .. } => ErrorCategory::Authorization,
            RequestError::Quota(QuotaError::Exceeded { .. }) => ErrorCategory::Authorization,
            RequestError::Quota(_)
            | RequestError::UnknownType(_)
            | RequestError::Enable { .. }
            | RequestError::Persistent { .. }
            | RequestError::Allocation(_)
            | RequestError::AuthEngine(_)
            | RequestError::Pool(_) => ErrorCategory::Internal,
        }
    }

    /// The missing object, for NO_EXISTS failures
    pub fn object(&self) -> Option<(ObjectKind, u32)> {
        match self {
            RequestError::NoExists { kind, id } => Some((*kind, *id)),
            _ => None,
        }
    }
}

/// Result type for request workflows
pub type RequestResult<T> = std::result::Result<T, RequestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_types::ImageId;

    #[test]
    fn test_no_exists_message() {
        let err = RequestError::no_exists(ObjectKind::Datastore, 3);
        assert_eq!(err.to_string(), "Error getting datastore [3].");
        assert_eq!(err.category(), ErrorCategory::NoExists);
        assert_eq!(err.object(), Some((ObjectKind::Datastore, 3)));
    }

    #[test]
    fn test_categories() {
        assert_eq!(RequestError::NotClonable.category(), ErrorCategory::Action);
        assert_eq!(
            RequestError::UnknownType(UnknownImageType("DISK".into())).category(),
            ErrorCategory::Internal
        );
        assert_eq!(
            RequestError::Allocation(PoolError::NameTaken {
                name: "a".into(),
                existing: ImageId(1),
            })
            .to_string(),
            "Error allocating a new image. NAME is already taken by IMAGE 1."
        );
        assert_eq!(
            RequestError::Quota(QuotaError::LockError).category(),
            ErrorCategory::Internal
        );
    }
}
