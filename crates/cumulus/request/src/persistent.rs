use crate::error::{RequestError, RequestResult};
use crate::{logged, ImageRequestManager, METHOD_PERSISTENT};
use cumulus_auth::AuthOp;
use cumulus_types::{Identity, ImageId, ObjectKind};
use tracing::debug;

impl ImageRequestManager {
    /// Make an image persistent or non-persistent.
    ///
    /// Boot/context images are always non-persistent, so the request is
    /// refused for them whatever the flag.
    pub async fn set_persistent(
        &self,
        identity: &Identity,
        id: ImageId,
        persistent: bool,
    ) -> RequestResult<ImageId> {
        let result = self.try_set_persistent(identity, id, persistent).await;
        logged(METHOD_PERSISTENT, identity, result)
    }

    async fn try_set_persistent(
        &self,
        identity: &Identity,
        id: ImageId,
        persistent: bool,
    ) -> RequestResult<ImageId> {
        self.basic_authorization(identity, id, AuthOp::Manage).await?;

        let mut image = self
            .images
            .get(id)
            .await?
            .ok_or(RequestError::no_exists(ObjectKind::Image, id.0))?;

        if !image.type_class().allows_persistent() {
            return Err(RequestError::NotPersistable);
        }

        image
            .set_persistent(persistent)
            .map_err(|reason| RequestError::Persistent {
                target: if persistent {
                    "persistent"
                } else {
                    "non-persistent"
                },
                reason,
            })?;

        self.images.update(&mut image).await?;
        debug!(image_id = %id, persistent, "Persistence flag updated");
        Ok(id)
    }
}
