use crate::error::{RequestError, RequestResult};
use crate::response::{CloneOutcome, DatastoreLink};
use crate::{logged, ImageRequestManager, METHOD_CLONE};
use cumulus_auth::{AuthOp, AuthRequest};
use cumulus_pool::ImageAllocation;
use cumulus_quota::{QuotaOwner, ResourceUsage};
use cumulus_types::{DatastoreId, Identity, ImageId, ObjectKind};
use tracing::{debug, warn};

impl ImageRequestManager {
    /// Clone `source_id` into a new image called `name` in the source's
    /// datastore.
    ///
    /// Locks are taken one at a time (user, source image, datastore) and
    /// released before the next one. Nothing is charged until capacity and
    /// permissions are checked; a quota charge is rolled back if the
    /// allocation fails. Once the image exists the clone succeeds, even if
    /// it cannot be added to the datastore's image list.
    pub async fn clone_image(
        &self,
        identity: &Identity,
        source_id: ImageId,
        name: &str,
    ) -> RequestResult<CloneOutcome> {
        let result = self.try_clone_image(identity, source_id, name).await;
        logged(METHOD_CLONE, identity, result)
    }

    async fn try_clone_image(
        &self,
        identity: &Identity,
        source_id: ImageId,
        name: &str,
    ) -> RequestResult<CloneOutcome> {
        let umask = {
            let user = self
                .users
                .get(identity.uid)
                .await?
                .ok_or(RequestError::no_exists(ObjectKind::User, identity.uid.0))?;
            user.umask
        };

        let (template, datastore_id, datastore_name, size) = {
            let source = self
                .images
                .get(source_id)
                .await?
                .ok_or(RequestError::no_exists(ObjectKind::Image, source_id.0))?;

            if !source.type_class().allows_clone() {
                return Err(RequestError::NotClonable);
            }

            (
                source.clone_template(name),
                source.datastore_id,
                source.datastore_name.clone(),
                source.size,
            )
        };
        debug!(
            source_id = %source_id,
            datastore_id = %datastore_id,
            size,
            "Clone source resolved"
        );

        let (ds_auth, disk_type, descriptor, class, available) = {
            let datastore = self
                .datastores
                .get(datastore_id)
                .await?
                .ok_or(RequestError::no_exists(
                    ObjectKind::Datastore,
                    datastore_id.0,
                ))?;

            if !datastore.class.supports_clone() {
                return Err(RequestError::FileDatastore);
            }

            (
                datastore.auth(),
                datastore.disk_type,
                datastore.to_descriptor(),
                datastore.class,
                datastore.available_capacity(),
            )
        };

        // Unknown capacity is not enforced.
        if let Some(available) = available {
            if size > available {
                return Err(RequestError::NotEnoughSpace {
                    requested: size,
                    available,
                });
            }
        }

        let usage = ResourceUsage::datastore(datastore_id, size);
        let owner = QuotaOwner {
            uid: identity.uid,
            gid: identity.gid,
        };

        let charged = if identity.is_superuser() {
            false
        } else {
            let mut request = AuthRequest::new(identity.uid, identity.gid);
            request.add_create_auth(ObjectKind::Image, template.to_json());
            request.add_auth(AuthOp::Use, ds_auth);
            self.authorize(identity, &request)?;

            self.quotas.authorize(owner, &usage)?;
            debug!(
                uid = %identity.uid,
                datastore_id = %datastore_id,
                size,
                "Clone quota reserved"
            );
            true
        };

        let allocation = ImageAllocation {
            owner: identity.clone(),
            umask,
            template,
            datastore_id,
            datastore_name,
            disk_type,
            datastore_descriptor: descriptor,
            datastore_class: class,
            cloning_id: Some(source_id),
        };

        let image_id = match self.images.allocate(allocation).await {
            Ok(id) => id,
            Err(e) => {
                if charged {
                    if let Err(rollback) = self.quotas.rollback(owner, &usage) {
                        warn!(uid = %identity.uid, error = %rollback, "Quota rollback failed");
                    }
                }
                return Err(RequestError::Allocation(e));
            }
        };

        let link = self.link_to_datastore(image_id, datastore_id).await;

        Ok(CloneOutcome { image_id, link })
    }

    /// Add a freshly allocated image to its datastore's image list
    async fn link_to_datastore(
        &self,
        image_id: ImageId,
        datastore_id: DatastoreId,
    ) -> DatastoreLink {
        let unlinked = DatastoreLink::Unlinked { datastore_id };

        let mut datastore = match self.datastores.get(datastore_id).await {
            Ok(Some(datastore)) => datastore,
            Ok(None) => {
                warn!(
                    image_id = %image_id,
                    datastore_id = %datastore_id,
                    "Datastore vanished, image left unlinked"
                );
                return unlinked;
            }
            Err(e) => {
                warn!(
                    image_id = %image_id,
                    datastore_id = %datastore_id,
                    error = %e,
                    "Datastore lookup failed, image left unlinked"
                );
                return unlinked;
            }
        };

        datastore.add_image(image_id);
        match self.datastores.update(&mut datastore).await {
            Ok(()) => DatastoreLink::Linked,
            Err(e) => {
                warn!(
                    image_id = %image_id,
                    datastore_id = %datastore_id,
                    error = %e,
                    "Datastore update failed, image left unlinked"
                );
                unlinked
            }
        }
    }
}
