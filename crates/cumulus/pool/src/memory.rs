//! In-memory implementations of the pool traits
//!
//! These are suitable for development and testing. Production deployments
//! should use persistent backends.

use crate::error::{PoolError, PoolResult};
use crate::lock::{LockStats, Locked};
use crate::table::Table;
use crate::traits::{DatastorePool, ImageAllocation, ImagePool, UserPool};
use async_trait::async_trait;
use cumulus_types::{
    Datastore, DatastoreId, Image, ImageId, ImageState, ImageType, ObjectKind, Permissions, User,
    UserId,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A clone whose contents are still being copied by the datastore driver
#[derive(Clone, Debug)]
pub struct CopyJob {
    pub image_id: ImageId,
    pub source_id: ImageId,
    pub datastore_descriptor: String,
}

/// In-memory image pool
pub struct InMemoryImagePool {
    images: Table<Image>,
    by_name: DashMap<(UserId, String), ImageId>,
    copies: DashMap<ImageId, CopyJob>,
    next_id: AtomicU32,
    enable_other_permissions: bool,
}

impl InMemoryImagePool {
    pub fn new() -> Self {
        Self::with_other_permissions(true)
    }

    /// Whether new images may grant rights to users outside their group
    pub fn with_other_permissions(enable_other_permissions: bool) -> Self {
        Self {
            images: Table::new(),
            by_name: DashMap::new(),
            copies: DashMap::new(),
            next_id: AtomicU32::new(0),
            enable_other_permissions,
        }
    }

    /// Seed an existing image
    pub fn insert(&self, image: Image) -> PoolResult<()> {
        let id = image.id;
        let key = (image.owner, image.name.clone());

        if !self.images.insert(id.0, image) {
            return Err(PoolError::AlreadyExists {
                kind: ObjectKind::Image,
                id: id.0,
            });
        }

        self.by_name.insert(key, id);
        self.next_id
            .fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
        Ok(())
    }

    /// Snapshot of every image, in id order
    pub async fn list(&self) -> Vec<Image> {
        let mut result = Vec::new();
        for id in self.images.ids() {
            if let Some(image) = self.images.lock(id).await {
                result.push((*image).clone());
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies still in flight
    pub fn pending_copies(&self) -> Vec<CopyJob> {
        let mut jobs: Vec<CopyJob> = self.copies.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by_key(|j| j.image_id);
        jobs
    }

    /// Driver callback: the copy for `image_id` finished.
    ///
    /// The clone becomes READY (or ERROR on failure) and the source drops
    /// one outstanding copy, returning to READY when none are left. Running
    /// VMs are not tracked here, so USED sources are released too.
    pub async fn finish_copy(&self, image_id: ImageId, success: bool) -> PoolResult<()> {
        let (_, job) = self
            .copies
            .remove(&image_id)
            .ok_or(PoolError::NotFound {
                kind: ObjectKind::Image,
                id: image_id.0,
            })?;

        if let Some(mut image) = self.images.lock(image_id.0).await {
            image.state = if success {
                ImageState::Ready
            } else {
                ImageState::Error
            };
            image.commit();
        }

        self.end_copy(job.source_id).await;

        info!(image_id = %image_id, source_id = %job.source_id, success, "Image copy finished");
        Ok(())
    }

    /// Hand out the next free id. Ids are never reused, so the pool runs
    /// dry instead of wrapping around onto existing images.
    fn next_image_id(&self) -> PoolResult<ImageId> {
        self.next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map(ImageId)
            .map_err(|_| PoolError::IdsExhausted(ObjectKind::Image))
    }

    /// Reserve `(owner, name)` for `id`
    fn reserve_name(&self, owner: UserId, name: &str, id: ImageId) -> PoolResult<()> {
        match self.by_name.entry((owner, name.to_string())) {
            Entry::Occupied(entry) => Err(PoolError::NameTaken {
                name: name.to_string(),
                existing: *entry.get(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    /// Register one more outstanding copy on the clone source
    async fn start_copy(&self, source_id: ImageId) -> PoolResult<()> {
        let mut source = self
            .images
            .lock(source_id.0)
            .await
            .ok_or(PoolError::NotFound {
                kind: ObjectKind::Image,
                id: source_id.0,
            })?;

        match source.state {
            ImageState::Ready => {
                source.state = if source.persistent {
                    ImageState::Clone
                } else {
                    ImageState::Used
                };
            }
            ImageState::Used | ImageState::Clone => {}
            state => {
                return Err(PoolError::InvalidState(format!(
                    "Cannot clone image in state {}.",
                    state
                )));
            }
        }

        source.cloning_ops += 1;
        source.commit();
        Ok(())
    }

    /// Drop one outstanding copy from the clone source. The source returns
    /// to READY once no copies are left.
    async fn end_copy(&self, source_id: ImageId) {
        if let Some(mut source) = self.images.lock(source_id.0).await {
            source.cloning_ops = source.cloning_ops.saturating_sub(1);
            if source.cloning_ops == 0
                && matches!(source.state, ImageState::Used | ImageState::Clone)
            {
                source.state = ImageState::Ready;
            }
            source.commit();
        }
    }
}

impl Default for InMemoryImagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImagePool for InMemoryImagePool {
    async fn get(&self, id: ImageId) -> PoolResult<Option<Locked<Image>>> {
        Ok(self.images.lock(id.0).await)
    }

    async fn update(&self, image: &mut Locked<Image>) -> PoolResult<()> {
        image.commit();
        debug!(image_id = %image.id, "Image updated");
        Ok(())
    }

    async fn allocate(&self, request: ImageAllocation) -> PoolResult<ImageId> {
        let template = request.template;

        let name = template.get("NAME").unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(PoolError::InvalidTemplate("No NAME in template".to_string()));
        }

        let image_type = match template.get("TYPE") {
            Some(t) => t
                .parse::<ImageType>()
                .map_err(|e| PoolError::InvalidTemplate(e.to_string()))?,
            None => ImageType::Os,
        };

        if !request.datastore_class.accepts(image_type.class()) {
            return Err(PoolError::Incompatible(format!(
                "{} images cannot be registered in {} datastores",
                image_type, request.datastore_class
            )));
        }

        let size = match template.get("SIZE") {
            Some(s) => s.trim().parse::<u64>().map_err(|_| {
                PoolError::InvalidTemplate(format!("Invalid SIZE {}", s))
            })?,
            None => 0,
        };

        let persistent = image_type.class().allows_persistent()
            && template
                .get("PERSISTENT")
                .is_some_and(|p| p.eq_ignore_ascii_case("yes"));

        let id = self.next_image_id()?;
        self.reserve_name(request.owner.uid, &name, id)?;

        if let Some(source_id) = request.cloning_id {
            if let Err(e) = self.start_copy(source_id).await {
                self.by_name.remove(&(request.owner.uid, name));
                return Err(e);
            }
        }

        let base = request.owner.default_mode(self.enable_other_permissions);
        let image = Image {
            id,
            name: name.clone(),
            owner: request.owner.uid,
            group: request.owner.gid,
            uname: request.owner.uname.clone(),
            gname: request.owner.gname.clone(),
            permissions: Permissions::from_umask(base, request.umask),
            image_type,
            persistent,
            state: if request.cloning_id.is_some() {
                ImageState::Locked
            } else {
                ImageState::Ready
            },
            size,
            source: template.get("SOURCE").unwrap_or_default().to_string(),
            datastore_id: request.datastore_id,
            datastore_name: request.datastore_name,
            disk_type: request.disk_type,
            template,
            cloning_id: request.cloning_id,
            cloning_ops: 0,
            regtime: chrono::Utc::now(),
        };

        if !self.images.insert(id.0, image) {
            self.by_name.remove(&(request.owner.uid, name));
            if let Some(source_id) = request.cloning_id {
                self.end_copy(source_id).await;
            }
            return Err(PoolError::AlreadyExists {
                kind: ObjectKind::Image,
                id: id.0,
            });
        }

        if let Some(source_id) = request.cloning_id {
            self.copies.insert(
                id,
                CopyJob {
                    image_id: id,
                    source_id,
                    datastore_descriptor: request.datastore_descriptor,
                },
            );
        }

        info!(
            image_id = %id,
            name = %name,
            owner = %request.owner.uid,
            datastore_id = %request.datastore_id,
            "Image allocated"
        );

        Ok(id)
    }

    fn lock_stats(&self) -> Arc<LockStats> {
        self.images.stats()
    }
}

/// In-memory datastore pool
pub struct InMemoryDatastorePool {
    datastores: Table<Datastore>,
}

impl InMemoryDatastorePool {
    pub fn new() -> Self {
        Self {
            datastores: Table::new(),
        }
    }

    /// Seed a datastore
    pub fn insert(&self, datastore: Datastore) -> PoolResult<()> {
        let id = datastore.id;
        if !self.datastores.insert(id.0, datastore) {
            return Err(PoolError::AlreadyExists {
                kind: ObjectKind::Datastore,
                id: id.0,
            });
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<Datastore> {
        let mut result = Vec::new();
        for id in self.datastores.ids() {
            if let Some(ds) = self.datastores.lock(id).await {
                result.push((*ds).clone());
            }
        }
        result
    }
}

impl Default for InMemoryDatastorePool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatastorePool for InMemoryDatastorePool {
    async fn get(&self, id: DatastoreId) -> PoolResult<Option<Locked<Datastore>>> {
        Ok(self.datastores.lock(id.0).await)
    }

    async fn update(&self, datastore: &mut Locked<Datastore>) -> PoolResult<()> {
        datastore.commit();
        debug!(datastore_id = %datastore.id, "Datastore updated");
        Ok(())
    }

    fn lock_stats(&self) -> Arc<LockStats> {
        self.datastores.stats()
    }
}

/// In-memory user pool
pub struct InMemoryUserPool {
    users: Table<User>,
}

impl InMemoryUserPool {
    pub fn new() -> Self {
        Self {
            users: Table::new(),
        }
    }

    /// Seed a user
    pub fn insert(&self, user: User) -> PoolResult<()> {
        let id = user.id;
        if !self.users.insert(id.0, user) {
            return Err(PoolError::AlreadyExists {
                kind: ObjectKind::User,
                id: id.0,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryUserPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserPool for InMemoryUserPool {
    async fn get(&self, id: UserId) -> PoolResult<Option<Locked<User>>> {
        Ok(self.users.lock(id.0).await)
    }

    fn lock_stats(&self) -> Arc<LockStats> {
        self.users.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_types::{DatastoreClass, DiskType, GroupId, Identity, ImageTemplate};
    use std::time::Duration;

    fn owner() -> Identity {
        Identity::new(UserId(2), GroupId(1), "alice", "users")
    }

    fn image(id: u32, name: &str) -> Image {
        Image {
            id: ImageId(id),
            name: name.to_string(),
            owner: UserId(2),
            group: GroupId(1),
            uname: "alice".to_string(),
            gname: "users".to_string(),
            permissions: Permissions::from_octal(0o600),
            image_type: ImageType::Os,
            persistent: false,
            state: ImageState::Ready,
            size: 100,
            source: format!("/images/{}", id),
            datastore_id: DatastoreId(1),
            datastore_name: "default".to_string(),
            disk_type: DiskType::File,
            template: ImageTemplate::new().with("NAME", name),
            cloning_id: None,
            cloning_ops: 0,
            regtime: chrono::Utc::now(),
        }
    }

    fn allocation(name: &str, cloning_id: Option<ImageId>) -> ImageAllocation {
        ImageAllocation {
            owner: owner(),
            umask: 0o177,
            template: ImageTemplate::new()
                .with("NAME", name)
                .with("TYPE", "DATABLOCK")
                .with("SIZE", "100"),
            datastore_id: DatastoreId(1),
            datastore_name: "default".to_string(),
            disk_type: DiskType::File,
            datastore_descriptor: "{}".to_string(),
            datastore_class: DatastoreClass::Image,
            cloning_id,
        }
    }

    #[tokio::test]
    async fn test_update_persists_changes() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(0, "base")).unwrap();

        {
            let mut locked = pool.get(ImageId(0)).await.unwrap().unwrap();
            locked.persistent = true;
        }
        assert!(!pool.get(ImageId(0)).await.unwrap().unwrap().persistent);

        {
            let mut locked = pool.get(ImageId(0)).await.unwrap().unwrap();
            locked.persistent = true;
            pool.update(&mut locked).await.unwrap();
        }
        assert!(pool.get(ImageId(0)).await.unwrap().unwrap().persistent);

        let stats = pool.lock_stats();
        assert_eq!(stats.acquired(), stats.released());
    }

    #[tokio::test]
    async fn test_missing_object_is_none() {
        let pool = InMemoryImagePool::new();
        assert!(pool.get(ImageId(42)).await.unwrap().is_none());
        assert_eq!(pool.lock_stats().acquired(), 0);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let pool = Arc::new(InMemoryImagePool::new());
        pool.insert(image(0, "base")).unwrap();

        let held = pool.get(ImageId(0)).await.unwrap().unwrap();
        let contender = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get(ImageId(0)).await.map(|l| l.is_some()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        assert!(contender.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_allocate_applies_umask() {
        let pool = InMemoryImagePool::new();
        let id = pool.allocate(allocation("disk", None)).await.unwrap();

        let created = pool.get(id).await.unwrap().unwrap();
        assert_eq!(created.permissions.to_octal(), 0o600);
        assert_eq!(created.image_type, ImageType::Datablock);
        assert_eq!(created.size, 100);
        assert_eq!(created.state, ImageState::Ready);
    }

    #[tokio::test]
    async fn test_allocate_rejects_taken_name() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(7, "disk")).unwrap();

        let err = pool.allocate(allocation("disk", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "NAME is already taken by IMAGE 7.");
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_allocate_rejects_incompatible_class() {
        let pool = InMemoryImagePool::new();
        let mut request = allocation("kernel", None);
        request.template.replace("TYPE", "KERNEL");

        let err = pool.allocate(request).await.unwrap_err();
        assert!(matches!(err, PoolError::Incompatible(_)));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn test_clone_lifecycle() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(0, "base")).unwrap();

        let id = pool
            .allocate(allocation("copy", Some(ImageId(0))))
            .await
            .unwrap();

        {
            let clone = pool.get(id).await.unwrap().unwrap();
            assert_eq!(clone.state, ImageState::Locked);
            assert_eq!(clone.cloning_id, Some(ImageId(0)));

            let source = pool.get(ImageId(0)).await.unwrap().unwrap();
            assert_eq!(source.state, ImageState::Used);
            assert_eq!(source.cloning_ops, 1);
        }
        assert_eq!(pool.pending_copies().len(), 1);

        pool.finish_copy(id, true).await.unwrap();

        assert_eq!(pool.get(id).await.unwrap().unwrap().state, ImageState::Ready);
        let source = pool.get(ImageId(0)).await.unwrap().unwrap();
        assert_eq!(source.state, ImageState::Ready);
        assert_eq!(source.cloning_ops, 0);
        assert!(pool.pending_copies().is_empty());
    }

    #[tokio::test]
    async fn test_clone_of_disabled_source_fails() {
        let pool = InMemoryImagePool::new();
        let mut source = image(0, "base");
        source.state = ImageState::Disabled;
        pool.insert(source).unwrap();

        let err = pool
            .allocate(allocation("copy", Some(ImageId(0))))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot clone image in state DISABLED.");
        assert_eq!(pool.len(), 1);

        // the name reservation was released
        assert!(pool.allocate(allocation("copy", None)).await.is_ok());
    }

    #[tokio::test]
    async fn test_allocate_stops_at_last_id() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(0, "first")).unwrap();
        pool.next_id.store(u32::MAX - 1, Ordering::SeqCst);

        let last = pool.allocate(allocation("last", None)).await.unwrap();
        assert_eq!(last, ImageId(u32::MAX - 1));

        let err = pool
            .allocate(allocation("wrapped", Some(ImageId(0))))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::IdsExhausted(ObjectKind::Image)));

        assert_eq!(pool.len(), 2);
        let first = pool.get(ImageId(0)).await.unwrap().unwrap();
        assert_eq!(first.name, "first");
        assert_eq!(first.cloning_ops, 0);
    }

    #[tokio::test]
    async fn test_allocate_onto_taken_id_is_undone() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(0, "base")).unwrap();
        pool.insert(image(1, "other")).unwrap();
        pool.next_id.store(1, Ordering::SeqCst);

        let err = pool
            .allocate(allocation("copy", Some(ImageId(0))))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::AlreadyExists {
                kind: ObjectKind::Image,
                id: 1
            }
        ));

        assert_eq!(pool.get(ImageId(1)).await.unwrap().unwrap().name, "other");
        {
            let source = pool.get(ImageId(0)).await.unwrap().unwrap();
            assert_eq!(source.state, ImageState::Ready);
            assert_eq!(source.cloning_ops, 0);
        }
        assert!(pool.pending_copies().is_empty());

        // the name went back to the pool along with the id
        let id = pool.allocate(allocation("copy", None)).await.unwrap();
        assert_eq!(id, ImageId(2));
    }

    #[tokio::test]
    async fn test_seeding_last_id_exhausts_allocation() {
        let pool = InMemoryImagePool::new();
        pool.insert(image(u32::MAX, "top")).unwrap();

        let err = pool.allocate(allocation("disk", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "No free image ids left");
    }

    #[tokio::test]
    async fn test_datastore_membership_persisted() {
        let pool = InMemoryDatastorePool::new();
        pool.insert(Datastore {
            id: DatastoreId(1),
            name: "default".to_string(),
            owner: UserId(0),
            group: GroupId(0),
            permissions: Permissions::from_octal(0o640),
            class: DatastoreClass::Image,
            disk_type: DiskType::File,
            free_mb: 1024,
            used_mb: 0,
            limit_mb: None,
            capacity_check: true,
            images: Default::default(),
        })
        .unwrap();

        {
            let mut ds = pool.get(DatastoreId(1)).await.unwrap().unwrap();
            ds.add_image(ImageId(4));
            pool.update(&mut ds).await.unwrap();
        }

        let listed = pool.list().await;
        assert!(listed[0].images.contains(&ImageId(4)));
        assert!(pool.insert(listed[0].clone()).is_err());
    }
}
