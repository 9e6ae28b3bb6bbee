use crate::error::{RequestError, RequestResult};
use crate::{logged, ImageRequestManager, METHOD_CHTYPE};
use cumulus_auth::AuthOp;
use cumulus_types::{Identity, ImageId, ImageType, ObjectKind};
use tracing::debug;

impl ImageRequestManager {
    /// Change the type of an image.
    ///
    /// The new type must belong to the same class as the current one: the
    /// datastore holding the image only accepts that class. The name is
    /// parsed once; an unknown name fails before the class check.
    pub async fn change_type(
        &self,
        identity: &Identity,
        id: ImageId,
        type_name: &str,
    ) -> RequestResult<ImageId> {
        let result = self.try_change_type(identity, id, type_name).await;
        logged(METHOD_CHTYPE, identity, result)
    }

    async fn try_change_type(
        &self,
        identity: &Identity,
        id: ImageId,
        type_name: &str,
    ) -> RequestResult<ImageId> {
        self.basic_authorization(identity, id, AuthOp::Manage).await?;

        let mut image = self
            .images
            .get(id)
            .await?
            .ok_or(RequestError::no_exists(ObjectKind::Image, id.0))?;

        let target: ImageType = type_name.parse()?;

        if target.class() != image.type_class() {
            return Err(RequestError::IncompatibleType);
        }

        debug!(image_id = %id, from = %image.image_type, to = %target, "Changing image type");
        image.set_type(target);
        self.images.update(&mut image).await?;
        Ok(id)
    }
}
