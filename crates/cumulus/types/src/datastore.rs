use crate::ids::{DatastoreId, GroupId, ImageId, ObjectKind, UserId};
use crate::image::TypeClass;
use crate::permissions::{ObjectAuth, Permissions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role a datastore plays in the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatastoreClass {
    /// Disk images (OS, DATABLOCK, CDROM)
    Image,
    /// Running VM disks; holds no registered images
    System,
    /// Plain files (KERNEL, RAMDISK, CONTEXT)
    File,
}

impl DatastoreClass {
    /// Whether images of `class` may be registered here
    pub fn accepts(&self, class: TypeClass) -> bool {
        match self {
            DatastoreClass::Image => class == TypeClass::Data,
            DatastoreClass::File => class == TypeClass::BootContext,
            DatastoreClass::System => false,
        }
    }

    /// Clone-created images can only land in image datastores
    pub fn supports_clone(&self) -> bool {
        !matches!(self, DatastoreClass::File)
    }
}

impl std::fmt::Display for DatastoreClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DatastoreClass::Image => "IMAGE_DS",
            DatastoreClass::System => "SYSTEM_DS",
            DatastoreClass::File => "FILE_DS",
        };
        f.write_str(s)
    }
}

/// How images in a datastore are exposed to hosts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiskType {
    #[default]
    File,
    Block,
    Rbd,
}

/// A storage backend holding images
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Datastore {
    pub id: DatastoreId,
    pub name: String,
    pub owner: UserId,
    pub group: GroupId,
    pub permissions: Permissions,
    pub class: DatastoreClass,
    #[serde(default)]
    pub disk_type: DiskType,
    #[serde(default)]
    pub free_mb: u64,
    #[serde(default)]
    pub used_mb: u64,
    /// Administrative cap on `used_mb`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_mb: Option<u64>,
    /// When false the free space is not trusted and never enforced
    #[serde(default)]
    pub capacity_check: bool,
    #[serde(default)]
    pub images: BTreeSet<ImageId>,
}

impl Datastore {
    pub fn auth(&self) -> ObjectAuth {
        ObjectAuth {
            kind: ObjectKind::Datastore,
            oid: self.id.0,
            owner: self.owner,
            group: self.group,
            permissions: self.permissions,
        }
    }

    /// Space available for new images, or `None` when capacity is unknown
    pub fn available_capacity(&self) -> Option<u64> {
        if !self.capacity_check {
            return None;
        }

        let avail = match self.limit_mb {
            Some(limit) => self.free_mb.min(limit.saturating_sub(self.used_mb)),
            None => self.free_mb,
        };

        Some(avail)
    }

    /// Register an image as backed by this datastore. Returns false if it
    /// was already a member.
    pub fn add_image(&mut self, id: ImageId) -> bool {
        self.images.insert(id)
    }

    /// Serialized descriptor handed to the allocator for driver actions
    pub fn to_descriptor(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
