//! Capability tags carried by bodies the physics collaborator reports.
//!
//! Trigger volumes only react to actors that carry the capability they accept.
//! Actor types declare their capabilities through [`Actor`] instead of being
//! probed for concrete component types at contact time.

use serde::{Deserialize, Serialize};

use crate::ids::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Loose physics bodies (blocks, held objects) that press plates.
    PhysicsInteractor,
    Player,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::PhysicsInteractor => 1 << 0,
            Self::Player => 1 << 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);

    pub const fn of(capability: Capability) -> Self {
        Self(capability.bit())
    }

    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::EMPTY, |set, capability| set.with(capability))
    }
}

pub trait Actor {
    fn actor_id(&self) -> ActorId;
    fn capabilities(&self) -> CapabilitySet;
}

/// Plain actor description for bodies the room does not own (players' capsules,
/// scripted props).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorHandle {
    pub id: ActorId,
    pub capabilities: CapabilitySet,
}

impl ActorHandle {
    pub fn new(id: ActorId, capabilities: CapabilitySet) -> Self {
        Self { id, capabilities }
    }
}

impl Actor for ActorHandle {
    fn actor_id(&self) -> ActorId {
        self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }
}
