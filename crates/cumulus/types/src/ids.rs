use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(id: u32) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of an image in the image pool
    ImageId
);
numeric_id!(
    /// Identifier of a datastore
    DatastoreId
);
numeric_id!(
    /// Identifier of a user account
    UserId
);
numeric_id!(
    /// Identifier of a group
    GroupId
);

/// Kinds of pool objects, used in error messages and authorization requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
    Image,
    Datastore,
    User,
}

impl ObjectKind {
    /// Lowercase name as it appears in human-readable messages
    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Image => "image",
            ObjectKind::Datastore => "datastore",
            ObjectKind::User => "user",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Image => "IMAGE",
            ObjectKind::Datastore => "DATASTORE",
            ObjectKind::User => "USER",
        };
        f.write_str(s)
    }
}
