//! Cumulus Pool - the object store behind image requests
//!
//! This crate provides the pool infrastructure used by the request layer:
//!
//! - **ImagePool**: images, plus allocation of new ones (including clones)
//! - **DatastorePool**: datastores and their image membership
//! - **UserPool**: user accounts (umask lookup)
//!
//! Every `get` takes the object's exclusive lock and returns a [`Locked`]
//! guard. The lock is released when the guard is dropped, on every path.
//! Changes made through the guard are only persisted by `update`.
//!
//! ## In-Memory vs Persistent
//!
//! The in-memory implementations are suitable for development and testing.
//! Persistent backends implement the same traits.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod lock;
pub mod memory;
mod table;
pub mod traits;

pub use error::{PoolError, PoolResult};
pub use lock::{LockStats, Locked};
pub use memory::{CopyJob, InMemoryDatastorePool, InMemoryImagePool, InMemoryUserPool};
pub use traits::{DatastorePool, ImageAllocation, ImagePool, UserPool};
