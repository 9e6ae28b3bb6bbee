//! Cumulus Quota - datastore usage ledger
//!
//! Usage is charged against both the acting user and the user's group.
//! A charge is all-or-nothing: if either subject would exceed a limit,
//! nothing is recorded. `rollback` undoes a previous charge.

#![deny(unsafe_code)]

use cumulus_types::{DatastoreId, GroupId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Resource class a usage request is charged to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotaClass {
    Datastore,
}

/// A usage request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceUsage {
    Datastore {
        datastore_id: DatastoreId,
        size: u64,
        images: u64,
    },
}

impl ResourceUsage {
    /// One new image of `size` in `datastore_id`
    pub fn datastore(datastore_id: DatastoreId, size: u64) -> Self {
        ResourceUsage::Datastore {
            datastore_id,
            size,
            images: 1,
        }
    }

    pub fn class(&self) -> QuotaClass {
        match self {
            ResourceUsage::Datastore { .. } => QuotaClass::Datastore,
        }
    }
}

/// Identity a usage request is charged against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaOwner {
    pub uid: UserId,
    pub gid: GroupId,
}

/// A ledger account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QuotaSubject {
    User(UserId),
    Group(GroupId),
}

impl std::fmt::Display for QuotaSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaSubject::User(id) => write!(f, "User [{}]", id),
            QuotaSubject::Group(id) => write!(f, "Group [{}]", id),
        }
    }
}

/// Datastore limits of one subject. `None` means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreQuota {
    pub images: Option<u64>,
    pub size: Option<u64>,
}

impl DatastoreQuota {
    pub fn unlimited() -> Self {
        Self::default()
    }
}

/// Charged datastore usage of one subject
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreUsage {
    pub images: u64,
    pub size: u64,
}

/// Which counter hit its limit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaMetric {
    Images,
    Size,
}

impl std::fmt::Display for QuotaMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaMetric::Images => f.write_str("IMAGES"),
            QuotaMetric::Size => f.write_str("SIZE"),
        }
    }
}

/// Charges and releases resource usage
pub trait QuotaLedger: Send + Sync {
    /// Check the limits and charge `usage` to the owner and its group
    fn authorize(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError>;

    /// Undo a previous successful `authorize`
    fn rollback(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError>;

    /// Current charged usage of `subject` in a datastore
    fn usage(
        &self,
        subject: QuotaSubject,
        datastore_id: DatastoreId,
    ) -> Result<DatastoreUsage, QuotaError>;
}

#[derive(Default)]
struct LedgerState {
    limits: HashMap<(QuotaSubject, DatastoreId), DatastoreQuota>,
    usage: HashMap<(QuotaSubject, DatastoreId), DatastoreUsage>,
}

impl LedgerState {
    fn limit(&self, subject: QuotaSubject, ds: DatastoreId, defaults: &Defaults) -> DatastoreQuota {
        self.limits
            .get(&(subject, ds))
            .copied()
            .unwrap_or(match subject {
                QuotaSubject::User(_) => defaults.user,
                QuotaSubject::Group(_) => defaults.group,
            })
    }

    /// Usage of `subject` after adding the charge, if the charge fits
    fn charged(
        &self,
        subject: QuotaSubject,
        ds: DatastoreId,
        size: u64,
        images: u64,
        defaults: &Defaults,
    ) -> Result<DatastoreUsage, QuotaError> {
        let limit = self.limit(subject, ds, defaults);
        let current = self.usage.get(&(subject, ds)).copied().unwrap_or_default();

        let overflow = |metric| QuotaError::Overflow {
            subject,
            metric,
            datastore_id: ds,
        };
        let next = DatastoreUsage {
            images: current
                .images
                .checked_add(images)
                .ok_or_else(|| overflow(QuotaMetric::Images))?,
            size: current
                .size
                .checked_add(size)
                .ok_or_else(|| overflow(QuotaMetric::Size))?,
        };

        if let Some(max) = limit.images {
            if next.images > max {
                return Err(QuotaError::Exceeded {
                    subject,
                    limit: max,
                    metric: QuotaMetric::Images,
                    datastore_id: ds,
                });
            }
        }

        if let Some(max) = limit.size {
            if next.size > max {
                return Err(QuotaError::Exceeded {
                    subject,
                    limit: max,
                    metric: QuotaMetric::Size,
                    datastore_id: ds,
                });
            }
        }

        Ok(next)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Defaults {
    user: DatastoreQuota,
    group: DatastoreQuota,
}

/// In-memory quota ledger
pub struct InMemoryQuotaLedger {
    state: Mutex<LedgerState>,
    defaults: Defaults,
}

impl InMemoryQuotaLedger {
    /// A ledger without limits
    pub fn new() -> Self {
        Self::with_defaults(DatastoreQuota::unlimited(), DatastoreQuota::unlimited())
    }

    /// A ledger applying `user` / `group` wherever no explicit limit is set
    pub fn with_defaults(user: DatastoreQuota, group: DatastoreQuota) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            defaults: Defaults { user, group },
        }
    }

    pub fn set_limit(
        &self,
        subject: QuotaSubject,
        datastore_id: DatastoreId,
        quota: DatastoreQuota,
    ) -> Result<(), QuotaError> {
        let mut state = self.state.lock().map_err(|_| QuotaError::LockError)?;
        state.limits.insert((subject, datastore_id), quota);
        Ok(())
    }
}

impl Default for InMemoryQuotaLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaLedger for InMemoryQuotaLedger {
    fn authorize(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError> {
        let ResourceUsage::Datastore {
            datastore_id,
            size,
            images,
        } = *usage;

        let user = QuotaSubject::User(owner.uid);
        let group = QuotaSubject::Group(owner.gid);

        let mut state = self.state.lock().map_err(|_| QuotaError::LockError)?;

        let user_usage = state.charged(user, datastore_id, size, images, &self.defaults)?;
        let group_usage = state.charged(group, datastore_id, size, images, &self.defaults)?;

        state.usage.insert((user, datastore_id), user_usage);
        state.usage.insert((group, datastore_id), group_usage);

        debug!(
            uid = %owner.uid,
            gid = %owner.gid,
            datastore_id = %datastore_id,
            size,
            "Datastore quota charged"
        );
        Ok(())
    }

    fn rollback(&self, owner: QuotaOwner, usage: &ResourceUsage) -> Result<(), QuotaError> {
        let ResourceUsage::Datastore {
            datastore_id,
            size,
            images,
        } = *usage;

        let mut state = self.state.lock().map_err(|_| QuotaError::LockError)?;

        for subject in [QuotaSubject::User(owner.uid), QuotaSubject::Group(owner.gid)] {
            if let Some(entry) = state.usage.get_mut(&(subject, datastore_id)) {
                entry.images = entry.images.saturating_sub(images);
                entry.size = entry.size.saturating_sub(size);
            }
        }

        debug!(
            uid = %owner.uid,
            gid = %owner.gid,
            datastore_id = %datastore_id,
            size,
            "Datastore quota rolled back"
        );
        Ok(())
    }

    fn usage(
        &self,
        subject: QuotaSubject,
        datastore_id: DatastoreId,
    ) -> Result<DatastoreUsage, QuotaError> {
        let state = self.state.lock().map_err(|_| QuotaError::LockError)?;
        Ok(state
            .usage
            .get(&(subject, datastore_id))
            .copied()
            .unwrap_or_default())
    }
}

/// Quota errors
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("{subject} : limit of {limit} reached for {metric} quota in datastore {datastore_id}")]
    Exceeded {
        subject: QuotaSubject,
        limit: u64,
        metric: QuotaMetric,
        datastore_id: DatastoreId,
    },

    #[error("{subject} : {metric} usage would overflow in datastore {datastore_id}")]
    Overflow {
        subject: QuotaSubject,
        metric: QuotaMetric,
        datastore_id: DatastoreId,
    },

    #[error("Lock error")]
    LockError,
}
