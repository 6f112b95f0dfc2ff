use serde::{Deserialize, Serialize};

use crate::ids::{
    ControllerId, InteractorId, InteractorKey, PlayerId, ReceiverId, SelectableId, VolumeId,
};
use crate::puzzle::InteractorState;
use crate::selection::BodyState;
use crate::session::PlayerSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub id: VolumeId,
    pub occupancy: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractorSnapshot {
    pub id: InteractorId,
    pub state: InteractorState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub id: ControllerId,
    pub guess: Vec<InteractorKey>,
    pub solves: u32,
    pub interactors: Vec<InteractorSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverSnapshot {
    pub id: ReceiverId,
    pub triggered: u32,
    pub despawned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub id: SelectableId,
    pub holder: Option<PlayerId>,
    pub body: BodyState,
    pub despawned: bool,
}

/// Every replicated field of a room. Two peers agree when their snapshots are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub layout_digest: String,
    pub volumes: Vec<VolumeSnapshot>,
    pub controllers: Vec<ControllerSnapshot>,
    pub receivers: Vec<ReceiverSnapshot>,
    pub objects: Vec<ObjectSnapshot>,
    pub players: Vec<PlayerSlot>,
}

impl RoomSnapshot {
    /// Name of the first section that differs from `other`, if any.
    pub fn first_difference(&self, other: &RoomSnapshot) -> Option<&'static str> {
        if self.layout_digest != other.layout_digest {
            Some("layout_digest")
        } else if self.volumes != other.volumes {
            Some("volumes")
        } else if self.controllers != other.controllers {
            Some("controllers")
        } else if self.receivers != other.receivers {
            Some("receivers")
        } else if self.objects != other.objects {
            Some("objects")
        } else if self.players != other.players {
            Some("players")
        } else {
            None
        }
    }
}
