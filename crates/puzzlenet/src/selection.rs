//! Authority-arbitrated grab/drop state of movable objects.
//!
//! Peers never change a holder themselves. They send select/deselect requests
//! and the room's authority calls into [`Selectable`] to grant, release or
//! force-release, then replicates the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::actor::{Actor, Capability, CapabilitySet};
use crate::ids::{ActorId, PlayerId, SelectableId};
use crate::math::Vec3;

/// Replicated physical body state of a movable object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec3,
    pub use_gravity: bool,
    pub kinematic: bool,
}

impl BodyState {
    pub fn resting(position: Vec3) -> Self {
        Self {
            position,
            use_gravity: true,
            kinematic: false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.kinematic && !self.use_gravity
    }

    fn hold(&mut self) {
        self.use_gravity = false;
        self.kinematic = true;
    }

    fn release(&mut self) {
        self.use_gravity = true;
        self.kinematic = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionRejection {
    #[error("{object} does not exist")]
    UnknownObject { object: SelectableId },
    #[error("{object} has been despawned")]
    Despawned { object: SelectableId },
    #[error("{object} is already held by {holder}")]
    HeldByOther {
        object: SelectableId,
        holder: PlayerId,
    },
    #[error("{player} does not hold {object}")]
    NotHolder {
        object: SelectableId,
        player: PlayerId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selectable {
    id: SelectableId,
    spawn: Vec3,
    body: BodyState,
    holder: Option<PlayerId>,
    despawned: bool,
}

impl Selectable {
    pub fn new(id: SelectableId, spawn: Vec3) -> Self {
        Self {
            id,
            spawn,
            body: BodyState::resting(spawn),
            holder: None,
            despawned: false,
        }
    }

    pub fn id(&self) -> SelectableId {
        self.id
    }

    pub fn holder(&self) -> Option<PlayerId> {
        self.holder
    }

    pub fn is_selected(&self) -> bool {
        self.holder.is_some()
    }

    pub fn body(&self) -> BodyState {
        self.body
    }

    pub fn despawned(&self) -> bool {
        self.despawned
    }

    /// Ok(false) when the requester already holds the object.
    pub(crate) fn check_grant(&self, player: PlayerId) -> Result<bool, SelectionRejection> {
        if self.despawned {
            return Err(SelectionRejection::Despawned { object: self.id });
        }
        match self.holder {
            Some(holder) if holder == player => Ok(false),
            Some(holder) => Err(SelectionRejection::HeldByOther {
                object: self.id,
                holder,
            }),
            None => Ok(true),
        }
    }

    pub(crate) fn grant(&mut self, player: PlayerId) -> Result<bool, SelectionRejection> {
        if !self.check_grant(player)? {
            return Ok(false);
        }
        self.holder = Some(player);
        self.body.hold();
        info!(object = %self.id, %player, "object_grabbed");
        Ok(true)
    }

    pub(crate) fn release(&mut self, player: PlayerId) -> Result<(), SelectionRejection> {
        if self.holder != Some(player) {
            return Err(SelectionRejection::NotHolder {
                object: self.id,
                player,
            });
        }
        self.holder = None;
        self.body.release();
        info!(object = %self.id, %player, "object_dropped");
        Ok(())
    }

    /// Drops the object whoever holds it; returns the previous holder.
    pub(crate) fn force_release(&mut self) -> Option<PlayerId> {
        let holder = self.holder.take()?;
        self.body.release();
        info!(object = %self.id, player = %holder, "object_force_released");
        Some(holder)
    }

    /// Moves a held body to its holder's hand. No-op for unheld objects.
    pub(crate) fn follow(&mut self, position: Vec3) -> bool {
        if self.holder.is_none() || self.body.position == position {
            return false;
        }
        self.body.position = position;
        true
    }

    pub(crate) fn despawn(&mut self) -> Option<PlayerId> {
        let released = self.force_release();
        self.despawned = true;
        released
    }

    pub(crate) fn respawn(&mut self) {
        *self = Self::new(self.id, self.spawn);
    }

    pub(crate) fn mirror(&mut self, holder: Option<PlayerId>, body: BodyState, despawned: bool) {
        self.holder = holder;
        self.body = body;
        self.despawned = despawned;
    }

    pub(crate) fn mirror_body(&mut self, body: BodyState) {
        self.body = body;
    }
}

impl Actor for Selectable {
    fn actor_id(&self) -> ActorId {
        ActorId::Object(self.id)
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::of(Capability::PhysicsInteractor)
    }
}

/// One player's hand: the last reported pose and what it currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerHand {
    pub pose: Option<Vec3>,
    pub held: Option<SelectableId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crate_box() -> Selectable {
        Selectable::new(SelectableId(1), Vec3::new(1.0, 0.0, 2.0))
    }

    #[test]
    fn grant_is_exclusive() {
        let mut object = crate_box();
        assert_eq!(object.grant(PlayerId(1)), Ok(true));
        assert!(object.body().is_held());
        assert_eq!(object.grant(PlayerId(1)), Ok(false));
        assert_eq!(
            object.grant(PlayerId(2)),
            Err(SelectionRejection::HeldByOther {
                object: SelectableId(1),
                holder: PlayerId(1),
            })
        );
        assert_eq!(object.holder(), Some(PlayerId(1)));
    }

    #[test]
    fn only_holder_can_release() {
        let mut object = crate_box();
        object.grant(PlayerId(1)).expect("grant");
        assert!(matches!(
            object.release(PlayerId(2)),
            Err(SelectionRejection::NotHolder { .. })
        ));
        object.release(PlayerId(1)).expect("release");
        assert_eq!(object.body(), BodyState::resting(Vec3::new(1.0, 0.0, 2.0)));
    }

    #[test]
    fn despawn_releases_and_blocks_grants() {
        let mut object = crate_box();
        object.grant(PlayerId(3)).expect("grant");
        assert!(object.follow(Vec3::new(0.0, 1.5, 0.0)));
        assert_eq!(object.despawn(), Some(PlayerId(3)));
        assert!(!object.body().is_held());
        assert!(object.body().use_gravity);
        assert_eq!(
            object.grant(PlayerId(1)),
            Err(SelectionRejection::Despawned {
                object: SelectableId(1)
            })
        );

        object.respawn();
        assert!(!object.despawned());
        assert_eq!(object.body().position, Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn unheld_object_ignores_follow() {
        let mut object = crate_box();
        assert!(!object.follow(Vec3::UP));
        assert_eq!(object.body().position, Vec3::new(1.0, 0.0, 2.0));
    }
}
