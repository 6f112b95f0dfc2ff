use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

numeric_id!(
    /// Network identity of a connected player, assigned by the session collaborator.
    PlayerId,
    "player"
);
numeric_id!(VolumeId, "volume");
numeric_id!(InteractorId, "interactor");
numeric_id!(ControllerId, "controller");
numeric_id!(SelectableId, "object");
numeric_id!(ReceiverId, "receiver");
numeric_id!(SenderId, "sender");

/// Identity of a rigid body reported by the physics collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorId {
    Player(PlayerId),
    Object(SelectableId),
    External(u32),
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player(id) => write!(f, "{id}"),
            Self::Object(id) => write!(f, "{id}"),
            Self::External(raw) => write!(f, "external#{raw}"),
        }
    }
}

/// Stable interactor key, unique inside one controller's interactor set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractorKey(String);

impl InteractorKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InteractorKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for InteractorKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InteractorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
