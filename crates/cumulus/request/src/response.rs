//! Caller-visible results of a workflow

use crate::error::{ErrorCategory, RequestError, RequestResult};
use cumulus_types::{DatastoreId, ImageId, ObjectKind};
use serde::{Deserialize, Serialize};

/// Whether a new clone made it into its datastore's image list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DatastoreLink {
    Linked,
    /// The datastore disappeared before the image could be registered
    Unlinked { datastore_id: DatastoreId },
}

/// Result of a successful clone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub image_id: ImageId,
    pub link: DatastoreLink,
}

impl CloneOutcome {
    pub fn is_linked(&self) -> bool {
        self.link == DatastoreLink::Linked
    }
}

/// A workflow success value that can be reported
pub trait Reportable {
    fn id(&self) -> ImageId;

    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Reportable for ImageId {
    fn id(&self) -> ImageId {
        *self
    }
}

impl Reportable for CloneOutcome {
    fn id(&self) -> ImageId {
        self.image_id
    }

    fn warnings(&self) -> Vec<String> {
        match self.link {
            DatastoreLink::Linked => Vec::new(),
            DatastoreLink::Unlinked { datastore_id } => vec![format!(
                "Image {} was created but could not be added to datastore {}.",
                self.image_id, datastore_id
            )],
        }
    }
}

/// Object a NO_EXISTS failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedObject {
    pub kind: ObjectKind,
    pub id: u32,
}

/// Failure half of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<FailedObject>,
}

/// What the caller receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub method: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ImageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl Response {
    pub fn success(method: &str, value: &impl Reportable) -> Self {
        Self {
            method: method.to_string(),
            success: true,
            id: Some(value.id()),
            warnings: value.warnings(),
            error: None,
        }
    }

    pub fn failure(method: &str, error: &RequestError) -> Self {
        Self {
            method: method.to_string(),
            success: false,
            id: None,
            warnings: Vec::new(),
            error: Some(Failure {
                category: error.category(),
                message: format!("[{}] {}", method, error),
                object: error.object().map(|(kind, id)| FailedObject { kind, id }),
            }),
        }
    }

    pub fn report<T: Reportable>(method: &str, result: &RequestResult<T>) -> Self {
        match result {
            Ok(value) => Self::success(method, value),
            Err(error) => Self::failure(method, error),
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.error.as_ref().map(|e| e.category)
    }
}
