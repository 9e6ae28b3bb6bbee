//! Cumulus Auth - authorization of image requests
//!
//! A request bundles one or more grants the caller needs (create an image,
//! use a datastore, manage an image, ...). The engine evaluates the bundle
//! atomically: either every grant is held or the request is denied with a
//! human-readable reason.

#![deny(unsafe_code)]

use cumulus_types::{
    GroupId, ObjectAuth, ObjectKind, PermissionBits, UserId, SUPERUSER_GID, SUPERUSER_UID,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// Operation a grant asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOp {
    Use,
    Manage,
    Admin,
    Create,
}

impl std::fmt::Display for AuthOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthOp::Use => "USE",
            AuthOp::Manage => "MANAGE",
            AuthOp::Admin => "ADMIN",
            AuthOp::Create => "CREATE",
        };
        f.write_str(s)
    }
}

/// One grant inside an authorization request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthItem {
    /// Create a new object described by `template`
    Create { kind: ObjectKind, template: String },
    /// Operate on an existing object
    Object { op: AuthOp, object: ObjectAuth },
}

/// A bundle of grants evaluated as a unit
#[derive(Clone, Debug)]
pub struct AuthRequest {
    pub uid: UserId,
    pub gid: GroupId,
    pub items: Vec<AuthItem>,
}

impl AuthRequest {
    pub fn new(uid: UserId, gid: GroupId) -> Self {
        Self {
            uid,
            gid,
            items: Vec::new(),
        }
    }

    pub fn add_create_auth(&mut self, kind: ObjectKind, template: impl Into<String>) {
        self.items.push(AuthItem::Create {
            kind,
            template: template.into(),
        });
    }

    pub fn add_auth(&mut self, op: AuthOp, object: ObjectAuth) {
        self.items.push(AuthItem::Object { op, object });
    }
}

/// Outcome of an authorization request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    Denied(String),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthDecision::Allowed)
    }
}

/// Decides whether a caller holds the grants a request needs
pub trait AuthorizationEngine: Send + Sync {
    fn authorize(&self, request: &AuthRequest) -> Result<AuthDecision, AuthError>;
}

/// Who an ACL rule applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum AclSubject {
    User(UserId),
    Group(GroupId),
    All,
}

impl AclSubject {
    fn matches(&self, uid: UserId, gid: GroupId) -> bool {
        match self {
            AclSubject::User(u) => *u == uid,
            AclSubject::Group(g) => *g == gid,
            AclSubject::All => true,
        }
    }
}

/// Grants `rights` over every object of `kind` to `subject`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub subject: AclSubject,
    pub kind: ObjectKind,
    pub rights: BTreeSet<AuthOp>,
}

impl AclRule {
    pub fn new(
        subject: AclSubject,
        kind: ObjectKind,
        rights: impl IntoIterator<Item = AuthOp>,
    ) -> Self {
        Self {
            subject,
            kind,
            rights: rights.into_iter().collect(),
        }
    }
}

/// Ownership bits plus ACL rules.
///
/// The administrative user and group are always allowed. Object grants
/// are satisfied by the owner, group or other permission bits, or by a
/// matching ACL rule. Create grants need an ACL rule.
pub struct AclEngine {
    rules: RwLock<BTreeMap<u32, AclRule>>,
    next_id: AtomicU32,
}

impl AclEngine {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// The rules a fresh cluster starts with: everybody may create images
    /// and use the datastores their permission bits allow.
    pub fn with_defaults() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            0,
            AclRule::new(AclSubject::All, ObjectKind::Image, [AuthOp::Create]),
        );
        Self {
            rules: RwLock::new(rules),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn add_rule(&self, rule: AclRule) -> Result<u32, AuthError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut rules = self.rules.write().map_err(|_| AuthError::LockError)?;
        rules.insert(id, rule);
        Ok(id)
    }

    fn acl_allows(
        rules: &BTreeMap<u32, AclRule>,
        uid: UserId,
        gid: GroupId,
        kind: ObjectKind,
        op: AuthOp,
    ) -> bool {
        rules.values().any(|rule| {
            rule.kind == kind && rule.rights.contains(&op) && rule.subject.matches(uid, gid)
        })
    }
}

impl Default for AclEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationEngine for AclEngine {
    fn authorize(&self, request: &AuthRequest) -> Result<AuthDecision, AuthError> {
        if request.uid == SUPERUSER_UID || request.gid == SUPERUSER_GID {
            return Ok(AuthDecision::Allowed);
        }

        let rules = self.rules.read().map_err(|_| AuthError::LockError)?;

        for item in &request.items {
            let allowed = match item {
                AuthItem::Create { kind, .. } => {
                    Self::acl_allows(&rules, request.uid, request.gid, *kind, AuthOp::Create)
                }
                AuthItem::Object { op, object } => {
                    bits_allow(object, request.uid, request.gid, *op)
                        || Self::acl_allows(&rules, request.uid, request.gid, object.kind, *op)
                }
            };

            if !allowed {
                let message = match item {
                    AuthItem::Create { kind, .. } => {
                        format!("Not authorized to perform CREATE {}.", kind)
                    }
                    AuthItem::Object { op, object } => format!(
                        "Not authorized to perform {} {} [{}].",
                        op, object.kind, object.oid
                    ),
                };
                debug!(uid = %request.uid, reason = %message, "Authorization denied");
                return Ok(AuthDecision::Denied(message));
            }
        }

        Ok(AuthDecision::Allowed)
    }
}

fn bits_allow(object: &ObjectAuth, uid: UserId, gid: GroupId, op: AuthOp) -> bool {
    let has = |bits: &PermissionBits| match op {
        AuthOp::Use => bits.use_,
        AuthOp::Manage => bits.manage,
        AuthOp::Admin => bits.admin,
        AuthOp::Create => false,
    };

    let perms = &object.permissions;
    (object.owner == uid && has(&perms.owner))
        || (object.group == gid && has(&perms.group))
        || has(&perms.other)
}

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Lock error")]
    LockError,
}
