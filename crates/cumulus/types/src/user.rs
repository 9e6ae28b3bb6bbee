use crate::ids::{GroupId, UserId};
use serde::{Deserialize, Serialize};

/// The administrative account; bypasses authorization and quotas
pub const SUPERUSER_UID: UserId = UserId(0);
/// The administrative group
pub const SUPERUSER_GID: GroupId = GroupId(0);

/// A user account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub group: GroupId,
    /// Mask cleared from the permissions of objects this user creates
    pub umask: u32,
}

/// Authenticated caller of a request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: UserId,
    pub gid: GroupId,
    pub uname: String,
    pub gname: String,
}

impl Identity {
    pub fn new(uid: UserId, gid: GroupId, uname: impl Into<String>, gname: impl Into<String>) -> Self {
        Self {
            uid,
            gid,
            uname: uname.into(),
            gname: gname.into(),
        }
    }

    pub fn superuser() -> Self {
        Self::new(SUPERUSER_UID, SUPERUSER_GID, "admin", "admin")
    }

    pub fn is_superuser(&self) -> bool {
        self.uid == SUPERUSER_UID
    }

    /// Base permission mode for objects this identity creates
    pub fn default_mode(&self, enable_other_permissions: bool) -> u32 {
        if self.uid == SUPERUSER_UID || self.gid == SUPERUSER_GID {
            0o777
        } else if enable_other_permissions {
            0o666
        } else {
            0o660
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.uname, self.uid)
    }
}
