//! Cumulus Request - mutating image requests
//!
//! Four workflows act on images:
//!
//! - **enable**: make an image available or unavailable
//! - **persistent**: toggle the persistence flag of a data image
//! - **chtype**: change the type of an image within its type class
//! - **clone**: copy an image into a new one in the same datastore,
//!   subject to capacity, authorization and quota
//!
//! Every collaborator (pools, authorization engine, quota ledger, image
//! manager) is injected into [`ImageRequestManager`]. Objects are locked
//! through scoped guards, so a workflow never leaks a lock whatever path
//! it returns by, and never holds more than one lock at a time.

#![deny(unsafe_code)]

mod change_type;
mod clone;
pub mod config;
mod enable;
pub mod error;
pub mod manager;
mod persistent;
pub mod response;

pub use config::CumulusConfig;
pub use error::{ErrorCategory, RequestError, RequestResult};
pub use manager::{ImageManager, PoolImageManager};
pub use response::{CloneOutcome, DatastoreLink, Reportable, Response};

use cumulus_auth::{AuthDecision, AuthOp, AuthRequest, AuthorizationEngine};
use cumulus_pool::{DatastorePool, ImagePool, UserPool};
use cumulus_quota::QuotaLedger;
use cumulus_types::{Identity, ImageId, ObjectKind};
use std::sync::Arc;
use tracing::{info, warn};

pub const METHOD_ENABLE: &str = "image.enable";
pub const METHOD_PERSISTENT: &str = "image.persistent";
pub const METHOD_CHTYPE: &str = "image.chtype";
pub const METHOD_CLONE: &str = "image.clone";

/// Entry point for image requests
pub struct ImageRequestManager {
    images: Arc<dyn ImagePool>,
    datastores: Arc<dyn DatastorePool>,
    users: Arc<dyn UserPool>,
    auth: Arc<dyn AuthorizationEngine>,
    quotas: Arc<dyn QuotaLedger>,
    image_manager: Arc<dyn ImageManager>,
}

impl ImageRequestManager {
    pub fn new(
        images: Arc<dyn ImagePool>,
        datastores: Arc<dyn DatastorePool>,
        users: Arc<dyn UserPool>,
        auth: Arc<dyn AuthorizationEngine>,
        quotas: Arc<dyn QuotaLedger>,
        image_manager: Arc<dyn ImageManager>,
    ) -> Self {
        Self {
            images,
            datastores,
            users,
            auth,
            quotas,
            image_manager,
        }
    }

    /// Check that `identity` may perform `op` on image `id`.
    ///
    /// The image lock is only held while its permissions are read. The
    /// superuser skips the permission check but not the existence check.
    pub async fn basic_authorization(
        &self,
        identity: &Identity,
        id: ImageId,
        op: AuthOp,
    ) -> RequestResult<()> {
        let object = {
            let image = self
                .images
                .get(id)
                .await?
                .ok_or(RequestError::no_exists(ObjectKind::Image, id.0))?;
            image.auth()
        };

        if identity.is_superuser() {
            return Ok(());
        }

        let mut request = AuthRequest::new(identity.uid, identity.gid);
        request.add_auth(op, object);
        self.authorize(identity, &request)
    }

    fn authorize(&self, identity: &Identity, request: &AuthRequest) -> RequestResult<()> {
        match self.auth.authorize(request)? {
            AuthDecision::Allowed => Ok(()),
            AuthDecision::Denied(reason) => Err(RequestError::Authorization {
                uid: identity.uid,
                reason,
            }),
        }
    }
}

/// Log the outcome of a workflow and hand it back
fn logged<T: Reportable>(
    method: &str,
    identity: &Identity,
    result: RequestResult<T>,
) -> RequestResult<T> {
    match &result {
        Ok(value) => info!(
            method,
            caller = %identity,
            image_id = %value.id(),
            "Request succeeded"
        ),
        Err(e) => warn!(
            method,
            caller = %identity,
            category = %e.category(),
            error = %e,
            "Request failed"
        ),
    }
    result
}
