use crate::error::{RequestError, RequestResult};
use crate::{logged, ImageRequestManager, METHOD_ENABLE};
use cumulus_auth::AuthOp;
use cumulus_types::{Identity, ImageId};

impl ImageRequestManager {
    /// Enable or disable an image. The state change itself is delegated
    /// to the image manager, which does its own locking.
    pub async fn enable(
        &self,
        identity: &Identity,
        id: ImageId,
        enable: bool,
    ) -> RequestResult<ImageId> {
        let result = self.try_enable(identity, id, enable).await;
        logged(METHOD_ENABLE, identity, result)
    }

    async fn try_enable(
        &self,
        identity: &Identity,
        id: ImageId,
        enable: bool,
    ) -> RequestResult<ImageId> {
        self.basic_authorization(identity, id, AuthOp::Manage).await?;

        self.image_manager
            .enable_image(id, enable)
            .await
            .map_err(|e| RequestError::Enable {
                action: if enable { "enable" } else { "disable" },
                reason: e.to_string(),
            })?;

        Ok(id)
    }
}
