//! Pool traits

use crate::error::PoolResult;
use crate::lock::{LockStats, Locked};
use async_trait::async_trait;
use cumulus_types::{
    Datastore, DatastoreClass, DatastoreId, DiskType, Identity, Image, ImageId, ImageTemplate,
    User, UserId,
};
use std::sync::Arc;

/// Everything the allocator needs to create a new image
#[derive(Clone, Debug)]
pub struct ImageAllocation {
    pub owner: Identity,
    pub umask: u32,
    pub template: ImageTemplate,
    pub datastore_id: DatastoreId,
    pub datastore_name: String,
    pub disk_type: DiskType,
    /// Serialized datastore, handed to the copy driver
    pub datastore_descriptor: String,
    pub datastore_class: DatastoreClass,
    /// Source image when the new image is a clone
    pub cloning_id: Option<ImageId>,
}

/// Pool of images
#[async_trait]
pub trait ImagePool: Send + Sync {
    /// Lock an image. `None` if it does not exist.
    async fn get(&self, id: ImageId) -> PoolResult<Option<Locked<Image>>>;

    /// Persist the changes made through a locked image
    async fn update(&self, image: &mut Locked<Image>) -> PoolResult<()>;

    /// Create a new image and return its id
    async fn allocate(&self, request: ImageAllocation) -> PoolResult<ImageId>;

    /// Lock acquisition counters
    fn lock_stats(&self) -> Arc<LockStats>;
}

/// Pool of datastores
#[async_trait]
pub trait DatastorePool: Send + Sync {
    /// Lock a datastore. `None` if it does not exist.
    async fn get(&self, id: DatastoreId) -> PoolResult<Option<Locked<Datastore>>>;

    /// Persist the changes made through a locked datastore
    async fn update(&self, datastore: &mut Locked<Datastore>) -> PoolResult<()>;

    /// Lock acquisition counters
    fn lock_stats(&self) -> Arc<LockStats>;
}

/// Pool of user accounts
#[async_trait]
pub trait UserPool: Send + Sync {
    /// Lock a user. `None` if it does not exist.
    async fn get(&self, id: UserId) -> PoolResult<Option<Locked<User>>>;

    /// Lock acquisition counters
    fn lock_stats(&self) -> Arc<LockStats>;
}
