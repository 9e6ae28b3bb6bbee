//! Local cluster loaded from a JSON fixture

use anyhow::{anyhow, Context, Result};
use cumulus_auth::{AclEngine, AclRule};
use cumulus_pool::{InMemoryDatastorePool, InMemoryImagePool, InMemoryUserPool};
use cumulus_quota::{DatastoreQuota, InMemoryQuotaLedger, QuotaSubject};
use cumulus_request::{CumulusConfig, ImageRequestManager, PoolImageManager};
use cumulus_types::{Datastore, DatastoreId, GroupId, Identity, Image, User, UserId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: UserId,
    name: String,
    group: GroupId,
    /// Falls back to the configured default umask
    #[serde(default)]
    umask: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    id: GroupId,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum QuotaHolder {
    User(UserId),
    Group(GroupId),
}

#[derive(Debug, Deserialize)]
struct QuotaEntry {
    holder: QuotaHolder,
    datastore_id: DatastoreId,
    #[serde(default)]
    limits: DatastoreQuota,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Fixture {
    users: Vec<UserEntry>,
    groups: Vec<GroupEntry>,
    datastores: Vec<Datastore>,
    images: Vec<Image>,
    acl: Vec<AclRule>,
    quotas: Vec<QuotaEntry>,
}

/// In-memory collaborators seeded from a fixture, wired into a manager
pub struct Cluster {
    pub manager: ImageRequestManager,
    pub images: Arc<InMemoryImagePool>,
    pub datastores: Arc<InMemoryDatastorePool>,
    identities: HashMap<UserId, Identity>,
}

impl Cluster {
    pub fn load(path: &Path, config: &CumulusConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&raw)
            .with_context(|| format!("parsing fixture {}", path.display()))?;
        Self::from_fixture(fixture, config)
    }

    fn from_fixture(fixture: Fixture, config: &CumulusConfig) -> Result<Self> {
        let group_names: HashMap<GroupId, String> = fixture
            .groups
            .into_iter()
            .map(|g| (g.id, g.name))
            .collect();

        let users = Arc::new(InMemoryUserPool::new());
        let mut identities = HashMap::new();
        for entry in fixture.users {
            let gname = group_names
                .get(&entry.group)
                .cloned()
                .unwrap_or_else(|| entry.group.to_string());
            identities.insert(
                entry.id,
                Identity::new(entry.id, entry.group, entry.name.clone(), gname),
            );
            users.insert(User {
                id: entry.id,
                name: entry.name,
                group: entry.group,
                umask: entry.umask.unwrap_or(config.permissions.default_umask),
            })?;
        }

        let datastores = Arc::new(InMemoryDatastorePool::new());
        for datastore in fixture.datastores {
            datastores.insert(datastore)?;
        }

        let images = Arc::new(InMemoryImagePool::with_other_permissions(
            config.permissions.enable_other_permissions,
        ));
        for image in fixture.images {
            images.insert(image)?;
        }

        let auth = Arc::new(AclEngine::with_defaults());
        for rule in fixture.acl {
            auth.add_rule(rule)?;
        }

        let quotas = Arc::new(InMemoryQuotaLedger::with_defaults(
            config.quotas.default_user,
            config.quotas.default_group,
        ));
        for entry in fixture.quotas {
            let subject = match entry.holder {
                QuotaHolder::User(uid) => QuotaSubject::User(uid),
                QuotaHolder::Group(gid) => QuotaSubject::Group(gid),
            };
            quotas.set_limit(subject, entry.datastore_id, entry.limits)?;
        }

        info!(
            users = identities.len(),
            images = images.len(),
            "Cluster fixture loaded"
        );

        let manager = ImageRequestManager::new(
            images.clone(),
            datastores.clone(),
            users,
            auth,
            quotas,
            Arc::new(PoolImageManager::new(images.clone())),
        );

        Ok(Self {
            manager,
            images,
            datastores,
            identities,
        })
    }

    /// The identity a request runs as
    pub fn identity(&self, uid: UserId) -> Result<Identity> {
        self.identities
            .get(&uid)
            .cloned()
            .ok_or_else(|| anyhow!("user {} is not defined in the fixture", uid))
    }
}
