use crate::datastore::DiskType;
use crate::ids::{DatastoreId, GroupId, ImageId, ObjectKind, UserId};
use crate::permissions::{ObjectAuth, Permissions};
use crate::template::ImageTemplate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Logical type of an image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageType {
    Os,
    Datablock,
    Cdrom,
    Kernel,
    Ramdisk,
    Context,
}

impl ImageType {
    pub const ALL: [ImageType; 6] = [
        ImageType::Os,
        ImageType::Datablock,
        ImageType::Cdrom,
        ImageType::Kernel,
        ImageType::Ramdisk,
        ImageType::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Os => "OS",
            ImageType::Datablock => "DATABLOCK",
            ImageType::Cdrom => "CDROM",
            ImageType::Kernel => "KERNEL",
            ImageType::Ramdisk => "RAMDISK",
            ImageType::Context => "CONTEXT",
        }
    }

    pub fn class(&self) -> TypeClass {
        TypeClass::of(*self)
    }
}

impl std::fmt::Display for ImageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name did not match any image type
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Unknown type {0}")]
pub struct UnknownImageType(pub String);

impl FromStr for ImageType {
    type Err = UnknownImageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ImageType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownImageType(s.to_string()))
    }
}

/// Compatibility class of an image type.
///
/// A type change never crosses classes, and each datastore class only
/// stores images of one class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    /// OS, DATABLOCK, CDROM
    Data,
    /// KERNEL, RAMDISK, CONTEXT
    BootContext,
}

impl TypeClass {
    pub fn of(image_type: ImageType) -> Self {
        match image_type {
            ImageType::Os | ImageType::Datablock | ImageType::Cdrom => TypeClass::Data,
            ImageType::Kernel | ImageType::Ramdisk | ImageType::Context => TypeClass::BootContext,
        }
    }

    /// Boot-context images are never persistent
    pub fn allows_persistent(&self) -> bool {
        matches!(self, TypeClass::Data)
    }

    /// Boot-context images are never cloned
    pub fn allows_clone(&self) -> bool {
        matches!(self, TypeClass::Data)
    }
}

/// Lifecycle state of an image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageState {
    Ready,
    Used,
    Disabled,
    /// Contents are being written (new clone, upload)
    Locked,
    Error,
    /// Persistent image with copies in flight
    Clone,
}

impl std::fmt::Display for ImageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageState::Ready => "READY",
            ImageState::Used => "USED",
            ImageState::Disabled => "DISABLED",
            ImageState::Locked => "LOCKED",
            ImageState::Error => "ERROR",
            ImageState::Clone => "CLONE",
        };
        f.write_str(s)
    }
}

/// A virtual disk image
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub name: String,
    pub owner: UserId,
    pub group: GroupId,
    pub uname: String,
    pub gname: String,
    pub permissions: Permissions,
    #[serde(rename = "type")]
    pub image_type: ImageType,
    pub persistent: bool,
    pub state: ImageState,
    /// Size in MB
    pub size: u64,
    pub source: String,
    pub datastore_id: DatastoreId,
    pub datastore_name: String,
    pub disk_type: DiskType,
    pub template: ImageTemplate,
    /// Image this one was cloned from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloning_id: Option<ImageId>,
    /// Copies of this image still in flight
    #[serde(default)]
    pub cloning_ops: u32,
    #[serde(default = "Utc::now")]
    pub regtime: DateTime<Utc>,
}

impl Image {
    pub fn type_class(&self) -> TypeClass {
        self.image_type.class()
    }

    pub fn is_enabled(&self) -> bool {
        self.state != ImageState::Disabled
    }

    pub fn auth(&self) -> ObjectAuth {
        ObjectAuth {
            kind: ObjectKind::Image,
            oid: self.id.0,
            owner: self.owner,
            group: self.group,
            permissions: self.permissions,
        }
    }

    /// Flip the persistence flag in place.
    ///
    /// Refused while the image is in use or being copied. Type-class rules
    /// are checked by the caller.
    pub fn set_persistent(&mut self, persistent: bool) -> Result<(), String> {
        match self.state {
            ImageState::Used | ImageState::Clone => {
                Err(format!("Image cannot be in {} state.", self.state))
            }
            _ => {
                self.persistent = persistent;
                self.template
                    .replace("PERSISTENT", if persistent { "YES" } else { "NO" });
                Ok(())
            }
        }
    }

    pub fn set_type(&mut self, image_type: ImageType) {
        self.image_type = image_type;
        self.template.replace("TYPE", image_type.as_str());
    }

    /// Template for a copy of this image named `name`
    pub fn clone_template(&self, name: &str) -> ImageTemplate {
        let mut template = self.template.clone();

        template.replace("NAME", name);
        template.replace("TYPE", self.image_type.as_str());
        template.replace("SIZE", self.size.to_string());
        template.replace("SOURCE", self.source.clone());

        if self.persistent {
            template.replace("PERSISTENT", "YES");
        } else {
            template.remove("PERSISTENT");
        }

        template
    }
}
