//! Cumulus Types - the shared data model for image requests
//!
//! Every collaborator of the request layer (object store, authorization
//! engine, quota ledger) speaks in these types:
//!
//! - **Image**: a virtual disk image with a type, a persistence flag and a
//!   home datastore
//! - **Datastore**: the storage backend that holds images
//! - **User** / **Identity**: who owns objects and who is asking
//! - **Permissions** / **ObjectAuth**: the permission snapshot handed to the
//!   authorization engine

#![deny(unsafe_code)]

mod datastore;
mod ids;
mod image;
mod permissions;
mod template;
mod user;

pub use datastore::{Datastore, DatastoreClass, DiskType};
pub use ids::{DatastoreId, GroupId, ImageId, ObjectKind, UserId};
pub use image::{Image, ImageState, ImageType, TypeClass, UnknownImageType};
pub use permissions::{ObjectAuth, PermissionBits, Permissions};
pub use template::ImageTemplate;
pub use user::{Identity, User, SUPERUSER_GID, SUPERUSER_UID};
