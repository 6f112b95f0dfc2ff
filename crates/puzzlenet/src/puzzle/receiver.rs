use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ids::{ControllerId, ReceiverId};

/// What the room must do after a receiver handled a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverEffect {
    None,
    Despawn,
}

/// Called by the authority exactly once per successful submission.
pub trait InteractionReceiver: fmt::Debug + Send {
    fn on_interaction_received(&mut self, controller: ControllerId) -> ReceiverEffect;

    /// Returns the receiver to its freshly-loaded state on a room restart.
    fn reset(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverKind {
    Door,
    Chime,
}

impl ReceiverKind {
    pub fn build(self, id: ReceiverId) -> Box<dyn InteractionReceiver> {
        match self {
            Self::Door => Box::new(Door::new(id)),
            Self::Chime => Box::new(Chime::new(id)),
        }
    }
}

/// Opens (despawns) the first time any controller reports a solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Door {
    id: ReceiverId,
    open: bool,
}

impl Door {
    pub fn new(id: ReceiverId) -> Self {
        Self { id, open: false }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl InteractionReceiver for Door {
    fn on_interaction_received(&mut self, controller: ControllerId) -> ReceiverEffect {
        if self.open {
            return ReceiverEffect::None;
        }
        self.open = true;
        info!(receiver = %self.id, %controller, "door_opened");
        ReceiverEffect::Despawn
    }

    fn reset(&mut self) {
        self.open = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chime {
    id: ReceiverId,
    rings: u32,
}

impl Chime {
    pub fn new(id: ReceiverId) -> Self {
        Self { id, rings: 0 }
    }

    pub fn rings(&self) -> u32 {
        self.rings
    }
}

impl InteractionReceiver for Chime {
    fn on_interaction_received(&mut self, controller: ControllerId) -> ReceiverEffect {
        self.rings = self.rings.saturating_add(1);
        info!(receiver = %self.id, %controller, rings = self.rings, "chime_rang");
        ReceiverEffect::None
    }

    fn reset(&mut self) {
        self.rings = 0;
    }
}
