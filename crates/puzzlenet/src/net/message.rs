use serde::{Deserialize, Serialize};

use crate::actor::CapabilitySet;
use crate::ids::{
    ActorId, ControllerId, InteractorId, InteractorKey, PlayerId, ReceiverId, SelectableId,
    SenderId, VolumeId,
};
use crate::math::Vec3;
use crate::puzzle::{InteractorState, SubmitOutcome};
use crate::room::RoomSnapshot;
use crate::selection::BodyState;
use crate::session::PlayerSlot;

/// Who handed a command to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    /// The authority's own collaborators (physics, host tooling).
    Local,
    Player(PlayerId),
}

/// Request for a shared-state mutation, applied only by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    VolumeEntered {
        volume: VolumeId,
        actor: ActorId,
        capabilities: CapabilitySet,
    },
    VolumeExited {
        volume: VolumeId,
        actor: ActorId,
        capabilities: CapabilitySet,
    },
    PressSwitch {
        player: PlayerId,
        interactor: InteractorId,
    },
    ReleaseSwitch {
        player: PlayerId,
        interactor: InteractorId,
    },
    SendInteraction {
        player: PlayerId,
        sender: SenderId,
    },
    RequestSelect {
        player: PlayerId,
        object: SelectableId,
    },
    RequestDeselect {
        player: PlayerId,
        object: SelectableId,
    },
    UpdateHandPose {
        player: PlayerId,
        pose: Vec3,
    },
    Despawn {
        object: SelectableId,
    },
    RestoreInteractors {
        controller: ControllerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    VolumeEntered,
    VolumeExited,
    PressSwitch,
    ReleaseSwitch,
    SendInteraction,
    RequestSelect,
    RequestDeselect,
    UpdateHandPose,
    Despawn,
    RestoreInteractors,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::VolumeEntered { .. } => CommandKind::VolumeEntered,
            Self::VolumeExited { .. } => CommandKind::VolumeExited,
            Self::PressSwitch { .. } => CommandKind::PressSwitch,
            Self::ReleaseSwitch { .. } => CommandKind::ReleaseSwitch,
            Self::SendInteraction { .. } => CommandKind::SendInteraction,
            Self::RequestSelect { .. } => CommandKind::RequestSelect,
            Self::RequestDeselect { .. } => CommandKind::RequestDeselect,
            Self::UpdateHandPose { .. } => CommandKind::UpdateHandPose,
            Self::Despawn { .. } => CommandKind::Despawn,
            Self::RestoreInteractors { .. } => CommandKind::RestoreInteractors,
        }
    }

    /// Player named by a player-issued command; `None` for authority-local ones.
    pub fn issuer(&self) -> Option<PlayerId> {
        match self {
            Self::PressSwitch { player, .. }
            | Self::ReleaseSwitch { player, .. }
            | Self::SendInteraction { player, .. }
            | Self::RequestSelect { player, .. }
            | Self::RequestDeselect { player, .. }
            | Self::UpdateHandPose { player, .. } => Some(*player),
            Self::VolumeEntered { .. }
            | Self::VolumeExited { .. }
            | Self::Despawn { .. }
            | Self::RestoreInteractors { .. } => None,
        }
    }

    /// Players may only issue commands in their own name; local commands must
    /// come from the authority's collaborators.
    pub fn accepts_source(&self, source: CommandSource) -> bool {
        match (self.issuer(), source) {
            (None, CommandSource::Local) => true,
            (Some(player), CommandSource::Player(sender)) => player == sender,
            (Some(_), CommandSource::Local) => true,
            (None, CommandSource::Player(_)) => false,
        }
    }
}

/// Replicated state change published by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Broadcast {
    OccupancyChanged {
        volume: VolumeId,
        occupancy: u32,
    },
    InteractorChanged {
        controller: ControllerId,
        interactor: InteractorId,
        state: InteractorState,
    },
    GuessChanged {
        controller: ControllerId,
        guess: Vec<InteractorKey>,
    },
    PuzzleSubmitted {
        controller: ControllerId,
        outcome: SubmitOutcome,
    },
    ReceiverTriggered {
        receiver: ReceiverId,
        controller: ControllerId,
        despawned: bool,
    },
    SelectionChanged {
        object: SelectableId,
        holder: Option<PlayerId>,
        body: BodyState,
    },
    BodyMoved {
        object: SelectableId,
        body: BodyState,
    },
    ObjectDespawned {
        object: SelectableId,
    },
    /// Sent to the new holder only.
    Grabbed {
        object: SelectableId,
        player: PlayerId,
    },
    /// Sent to the previous holder only.
    Dropped {
        object: SelectableId,
        player: PlayerId,
    },
    PlayerJoined {
        slot: PlayerSlot,
    },
    PlayerLeft {
        player: PlayerId,
    },
    Snapshot {
        snapshot: Box<RoomSnapshot>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    OccupancyChanged,
    InteractorChanged,
    GuessChanged,
    PuzzleSubmitted,
    ReceiverTriggered,
    SelectionChanged,
    BodyMoved,
    ObjectDespawned,
    Grabbed,
    Dropped,
    PlayerJoined,
    PlayerLeft,
    Snapshot,
}

impl Broadcast {
    pub fn kind(&self) -> BroadcastKind {
        match self {
            Self::OccupancyChanged { .. } => BroadcastKind::OccupancyChanged,
            Self::InteractorChanged { .. } => BroadcastKind::InteractorChanged,
            Self::GuessChanged { .. } => BroadcastKind::GuessChanged,
            Self::PuzzleSubmitted { .. } => BroadcastKind::PuzzleSubmitted,
            Self::ReceiverTriggered { .. } => BroadcastKind::ReceiverTriggered,
            Self::SelectionChanged { .. } => BroadcastKind::SelectionChanged,
            Self::BodyMoved { .. } => BroadcastKind::BodyMoved,
            Self::ObjectDespawned { .. } => BroadcastKind::ObjectDespawned,
            Self::Grabbed { .. } => BroadcastKind::Grabbed,
            Self::Dropped { .. } => BroadcastKind::Dropped,
            Self::PlayerJoined { .. } => BroadcastKind::PlayerJoined,
            Self::PlayerLeft { .. } => BroadcastKind::PlayerLeft,
            Self::Snapshot { .. } => BroadcastKind::Snapshot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    All,
    Player(PlayerId),
}

impl Delivery {
    pub fn reaches(self, player: PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::Player(target) => target == player,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tick: u64,
    pub delivery: Delivery,
    pub broadcast: Broadcast,
}
