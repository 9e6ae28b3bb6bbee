//! Shared fixture for the workflow integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cumulus_auth::{AclEngine, AuthDecision, AuthError, AuthRequest, AuthorizationEngine};
use cumulus_pool::{
    DatastorePool, ImagePool, InMemoryDatastorePool, InMemoryImagePool, InMemoryUserPool,
    LockStats, Locked, PoolResult, UserPool,
};
use cumulus_quota::{
    DatastoreUsage, InMemoryQuotaLedger, QuotaError, QuotaLedger, QuotaOwner, QuotaSubject,
    ResourceUsage,
};
use cumulus_request::{ImageRequestManager, PoolImageManager};
use cumulus_types::{
    Datastore, DatastoreClass, DatastoreId, DiskType, GroupId, Identity, Image, ImageId,
    ImageState, ImageTemplate, ImageType, Permissions, User, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const IMAGE_DS: DatastoreId = DatastoreId(3);
pub const FILE_DS: DatastoreId = DatastoreId(4);
pub const UNCHECKED_DS: DatastoreId = DatastoreId(6);

pub const OS_IMAGE: ImageId = ImageId(5);
pub const KERNEL_IMAGE: ImageId = ImageId(7);
pub const CONTEXT_IMAGE: ImageId = ImageId(8);
pub const LARGE_IMAGE: ImageId = ImageId(9);
pub const UNCHECKED_IMAGE: ImageId = ImageId(10);
pub const MISPLACED_IMAGE: ImageId = ImageId(11);
pub const DISABLED_IMAGE: ImageId = ImageId(12);
pub const ORPHAN_IMAGE: ImageId = ImageId(13);
pub const USED_IMAGE: ImageId = ImageId(14);

pub fn alice() -> Identity {
    Identity::new(UserId(2), GroupId(1), "alice", "users")
}

pub fn bob() -> Identity {
    Identity::new(UserId(3), GroupId(2), "bob", "guests")
}

/// Authorization engine that counts its calls
pub struct CountingAuth {
    inner: AclEngine,
    calls: AtomicUsize,
}

impl CountingAuth {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthorizationEngine for CountingAuth {
    fn authorize(&self, request: &AuthRequest) -> Result<AuthDecision, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize(request)
    }
}

/// Quota ledger that counts its calls
pub struct CountingQuota {
    pub inner: InMemoryQuotaLedger,
    authorizations: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl CountingQuota {
    pub fn authorizations(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn user_usage(&self, uid: UserId, ds: DatastoreId) -> DatastoreUsage {
        self.inner.usage(QuotaSubject::User(uid), ds).unwrap()
    }
}

impl QuotaLedger for CountingQuota {
    fn authorize(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        self.inner.authorize(owner, usage)
    }

    fn rollback(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback(owner, usage)
    }

    fn usage(
        &self,
        subject: QuotaSubject,
        datastore_id: DatastoreId,
    ) -> Result<DatastoreUsage, QuotaError> {
        self.inner.usage(subject, datastore_id)
    }
}

/// Datastore pool whose datastores disappear after `visible` lookups
pub struct VanishingDatastorePool {
    inner: Arc<InMemoryDatastorePool>,
    visible: usize,
    lookups: AtomicUsize,
}

#[async_trait]
impl DatastorePool for VanishingDatastorePool {
    async fn get(&self, id: DatastoreId) -> PoolResult<Option<Locked<Datastore>>> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) >= self.visible {
            return Ok(None);
        }
        self.inner.get(id).await
    }

    async fn update(&self, datastore: &mut Locked<Datastore>) -> PoolResult<()> {
        self.inner.update(datastore).await
    }

    fn lock_stats(&self) -> Arc<LockStats> {
        self.inner.lock_stats()
    }
}

pub fn image(
    id: ImageId,
    name: &str,
    image_type: ImageType,
    size: u64,
    ds: DatastoreId,
) -> Image {
    Image {
        id,
        name: name.to_string(),
        owner: UserId(2),
        group: GroupId(1),
        uname: "alice".to_string(),
        gname: "users".to_string(),
        permissions: Permissions::from_octal(0o600),
        image_type,
        persistent: false,
        state: ImageState::Ready,
        size,
        source: format!("/var/lib/cumulus/images/{}", id),
        datastore_id: ds,
        datastore_name: format!("ds-{}", ds),
        disk_type: DiskType::File,
        template: ImageTemplate::new()
            .with("NAME", name)
            .with("TYPE", image_type.as_str())
            .with("DESCRIPTION", "fixture"),
        cloning_id: None,
        cloning_ops: 0,
        regtime: chrono::Utc::now(),
    }
}

fn with_state(mut image: Image, state: ImageState) -> Image {
    image.state = state;
    image
}

fn datastore(id: DatastoreId, class: DatastoreClass, capacity_check: bool) -> Datastore {
    Datastore {
        id,
        name: format!("ds-{}", id),
        owner: UserId(0),
        group: GroupId(1),
        permissions: Permissions::from_octal(0o640),
        class,
        disk_type: DiskType::File,
        free_mb: 2048,
        used_mb: 0,
        limit_mb: None,
        capacity_check,
        images: Default::default(),
    }
}

/// A small cluster:
///
/// - datastore 3: image datastore with 2048 MB available, usable by group 1
/// - datastore 4: file datastore
/// - datastore 6: image datastore without capacity tracking
/// - alice (uid 2, group 1) owns every image; bob (uid 3, group 2) owns none
pub struct Harness {
    pub manager: Arc<ImageRequestManager>,
    pub images: Arc<InMemoryImagePool>,
    pub datastores: Arc<InMemoryDatastorePool>,
    pub users: Arc<InMemoryUserPool>,
    pub auth: Arc<CountingAuth>,
    pub quotas: Arc<CountingQuota>,
    datastore_stats: Arc<LockStats>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Datastores are only found by the first `visible` lookups
    pub fn with_vanishing_datastores(visible: usize) -> Self {
        Self::build(Some(visible))
    }

    fn build(vanish_after: Option<usize>) -> Self {
        let images = Arc::new(InMemoryImagePool::with_other_permissions(false));
        for img in [
            image(OS_IMAGE, "base", ImageType::Os, 1024, IMAGE_DS),
            image(KERNEL_IMAGE, "vmlinuz", ImageType::Kernel, 10, FILE_DS),
            image(CONTEXT_IMAGE, "context", ImageType::Context, 1, FILE_DS),
            image(LARGE_IMAGE, "large", ImageType::Datablock, 4096, IMAGE_DS),
            image(UNCHECKED_IMAGE, "huge", ImageType::Datablock, 100_000, UNCHECKED_DS),
            image(MISPLACED_IMAGE, "misplaced", ImageType::Os, 10, FILE_DS),
            with_state(
                image(DISABLED_IMAGE, "disabled", ImageType::Os, 10, IMAGE_DS),
                ImageState::Disabled,
            ),
            image(ORPHAN_IMAGE, "orphan", ImageType::Os, 10, DatastoreId(99)),
            with_state(
                image(USED_IMAGE, "attached", ImageType::Os, 10, IMAGE_DS),
                ImageState::Used,
            ),
        ] {
            images.insert(img).unwrap();
        }
        let datastores = Arc::new(InMemoryDatastorePool::new());
        datastores
            .insert(datastore(IMAGE_DS, DatastoreClass::Image, true))
            .unwrap();
        datastores
            .insert(datastore(FILE_DS, DatastoreClass::File, true))
            .unwrap();
        datastores
            .insert(datastore(UNCHECKED_DS, DatastoreClass::Image, false))
            .unwrap();

        let users = Arc::new(InMemoryUserPool::new());
        for user in [
            User {
                id: UserId(0),
                name: "admin".to_string(),
                group: GroupId(0),
                umask: 0o177,
            },
            User {
                id: UserId(2),
                name: "alice".to_string(),
                group: GroupId(1),
                umask: 0o177,
            },
            User {
                id: UserId(3),
                name: "bob".to_string(),
                group: GroupId(2),
                umask: 0o117,
            },
        ] {
            users.insert(user).unwrap();
        }

        let auth = Arc::new(CountingAuth {
            inner: AclEngine::with_defaults(),
            calls: AtomicUsize::new(0),
        });
        let quotas = Arc::new(CountingQuota {
            inner: InMemoryQuotaLedger::new(),
            authorizations: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        });

        let datastore_stats = datastores.lock_stats();
        let datastore_pool: Arc<dyn DatastorePool> = match vanish_after {
            Some(visible) => Arc::new(VanishingDatastorePool {
                inner: datastores.clone(),
                visible,
                lookups: AtomicUsize::new(0),
            }),
            None => datastores.clone(),
        };

        let manager = Arc::new(ImageRequestManager::new(
            images.clone(),
            datastore_pool,
            users.clone(),
            auth.clone(),
            quotas.clone(),
            Arc::new(PoolImageManager::new(images.clone())),
        ));

        Self {
            manager,
            images,
            datastores,
            users,
            auth,
            quotas,
            datastore_stats,
        }
    }

    pub async fn image(&self, id: ImageId) -> Image {
        let locked = self.images.get(id).await.unwrap().unwrap();
        (*locked).clone()
    }

    pub async fn datastore(&self, id: DatastoreId) -> Datastore {
        let locked = self.datastores.get(id).await.unwrap().unwrap();
        (*locked).clone()
    }

    /// Every lock taken on every pool has been released exactly once
    pub fn assert_locks_balanced(&self) {
        for stats in [
            self.images.lock_stats(),
            self.datastore_stats.clone(),
            self.users.lock_stats(),
        ] {
            assert_eq!(stats.acquired(), stats.released());
            assert_eq!(stats.held(), 0);
        }
    }
}
