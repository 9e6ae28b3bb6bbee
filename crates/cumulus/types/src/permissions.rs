use crate::ids::{GroupId, ObjectKind, UserId};
use serde::{Deserialize, Serialize};

/// Use / manage / admin rights for one audience (owner, group or others)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionBits {
    #[serde(rename = "use")]
    pub use_: bool,
    pub manage: bool,
    pub admin: bool,
}

impl PermissionBits {
    /// Decode one octal digit (`4` = use, `2` = manage, `1` = admin)
    pub fn from_digit(digit: u32) -> Self {
        Self {
            use_: digit & 0o4 != 0,
            manage: digit & 0o2 != 0,
            admin: digit & 0o1 != 0,
        }
    }

    pub fn to_digit(&self) -> u32 {
        (self.use_ as u32) << 2 | (self.manage as u32) << 1 | self.admin as u32
    }
}

/// Owner / group / other permission matrix of a pool object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub owner: PermissionBits,
    pub group: PermissionBits,
    pub other: PermissionBits,
}

impl Permissions {
    /// Build from the familiar three-digit octal form, e.g. `0o640`
    pub fn from_octal(mode: u32) -> Self {
        Self {
            owner: PermissionBits::from_digit((mode >> 6) & 0o7),
            group: PermissionBits::from_digit((mode >> 3) & 0o7),
            other: PermissionBits::from_digit(mode & 0o7),
        }
    }

    pub fn to_octal(&self) -> u32 {
        self.owner.to_digit() << 6 | self.group.to_digit() << 3 | self.other.to_digit()
    }

    /// Permissions of a freshly allocated object: `base & !umask`.
    pub fn from_umask(base: u32, umask: u32) -> Self {
        Self::from_octal(base & !umask & 0o777)
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03o}", self.to_octal())
    }
}

/// Snapshot of the ownership and permissions of one object.
///
/// Taken while the object is locked and handed to the authorization engine
/// after the lock is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAuth {
    pub kind: ObjectKind,
    pub oid: u32,
    pub owner: UserId,
    pub group: GroupId,
    pub permissions: Permissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octal_roundtrip() {
        let perms = Permissions::from_octal(0o640);
        assert!(perms.owner.use_ && perms.owner.manage && !perms.owner.admin);
        assert!(perms.group.use_ && !perms.group.manage);
        assert_eq!(perms.other, PermissionBits::default());
        assert_eq!(perms.to_octal(), 0o640);
        assert_eq!(perms.to_string(), "640");
    }

    #[test]
    fn test_umask_applied() {
        assert_eq!(Permissions::from_umask(0o666, 0o177).to_octal(), 0o600);
        assert_eq!(Permissions::from_umask(0o660, 0o022).to_octal(), 0o640);
        assert_eq!(Permissions::from_umask(0o777, 0).to_octal(), 0o777);
    }
}
