use serde::{Deserialize, Serialize};

use crate::ids::{ControllerId, SenderId, VolumeId};

/// Submits a controller's guess on demand.
///
/// A trigger bound to a volume fires when that volume becomes occupied; an
/// unbound trigger fires only through an explicit send command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTrigger {
    pub id: SenderId,
    pub controller: ControllerId,
    #[serde(default)]
    pub volume: Option<VolumeId>,
}

impl SubmitTrigger {
    pub fn fires_on(&self, volume: VolumeId) -> bool {
        self.volume == Some(volume)
    }
}
