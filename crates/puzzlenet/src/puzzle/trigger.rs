use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::actor::{Actor, Capability};
use crate::ids::{ActorId, InteractorId, VolumeId};

/// Occupancy edge produced by a single contact event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyEdge {
    /// Counter moved but the volume stayed on the same side of empty.
    None,
    BecameOccupied,
    BecameVacant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    /// Actor lacks the accepted capability.
    Filtered,
    /// Enter of an actor already inside, or exit of one never seen.
    Unmatched,
    Counted { occupancy: u32, edge: OccupancyEdge },
}

impl ContactOutcome {
    pub fn edge(self) -> OccupancyEdge {
        match self {
            Self::Counted { edge, .. } => edge,
            Self::Filtered | Self::Unmatched => OccupancyEdge::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerVolume {
    id: VolumeId,
    accepts: Capability,
    occupants: BTreeSet<ActorId>,
    occupancy: u32,
    subscribers: BTreeSet<InteractorId>,
}

impl TriggerVolume {
    pub fn new(id: VolumeId, accepts: Capability) -> Self {
        Self {
            id,
            accepts,
            occupants: BTreeSet::new(),
            occupancy: 0,
            subscribers: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> VolumeId {
        self.id
    }

    pub fn accepts(&self) -> Capability {
        self.accepts
    }

    pub fn occupancy(&self) -> u32 {
        self.occupancy
    }

    pub fn occupied(&self) -> bool {
        self.occupancy > 0
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.occupants.contains(&actor)
    }

    pub fn subscribe(&mut self, interactor: InteractorId) -> bool {
        self.subscribers.insert(interactor)
    }

    pub fn unsubscribe(&mut self, interactor: InteractorId) -> bool {
        self.subscribers.remove(&interactor)
    }

    pub fn subscribers(&self) -> impl Iterator<Item = InteractorId> + '_ {
        self.subscribers.iter().copied()
    }

    pub fn enter(&mut self, actor: &dyn Actor) -> ContactOutcome {
        if !actor.capabilities().contains(self.accepts) {
            return ContactOutcome::Filtered;
        }
        let actor_id = actor.actor_id();
        if !self.occupants.insert(actor_id) {
            debug!(volume = %self.id, actor = %actor_id, "volume_reentry_ignored");
            return ContactOutcome::Unmatched;
        }
        let was_occupied = self.occupied();
        self.occupancy = self.occupancy.saturating_add(1);
        ContactOutcome::Counted {
            occupancy: self.occupancy,
            edge: if was_occupied {
                OccupancyEdge::None
            } else {
                OccupancyEdge::BecameOccupied
            },
        }
    }

    pub fn exit(&mut self, actor: &dyn Actor) -> ContactOutcome {
        if !actor.capabilities().contains(self.accepts) {
            return ContactOutcome::Filtered;
        }
        let actor_id = actor.actor_id();
        self.evict(actor_id)
    }

    /// Removes an actor regardless of capability; used when the actor leaves the
    /// simulation (disconnect, despawn) without a physics exit.
    pub fn evict(&mut self, actor_id: ActorId) -> ContactOutcome {
        if !self.occupants.remove(&actor_id) {
            warn!(
                volume = %self.id,
                actor = %actor_id,
                occupancy = self.occupancy,
                "volume_exit_without_enter"
            );
            return ContactOutcome::Unmatched;
        }
        let Some(next) = self.occupancy.checked_sub(1) else {
            warn!(volume = %self.id, actor = %actor_id, "volume_occupancy_underflow_clamped");
            return ContactOutcome::Unmatched;
        };
        self.occupancy = next;
        ContactOutcome::Counted {
            occupancy: next,
            edge: if next == 0 {
                OccupancyEdge::BecameVacant
            } else {
                OccupancyEdge::None
            },
        }
    }

    /// Mirror-side update from a replicated occupancy counter.
    pub fn mirror_occupancy(&mut self, occupancy: u32) {
        self.occupancy = occupancy;
    }

    pub fn respawn(&mut self) {
        self.occupants.clear();
        self.occupancy = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorHandle, CapabilitySet};
    use crate::ids::PlayerId;

    fn block(raw: u32) -> ActorHandle {
        ActorHandle::new(
            ActorId::External(raw),
            CapabilitySet::of(Capability::PhysicsInteractor),
        )
    }

    #[test]
    fn two_actors_enter_and_exit_in_sequence() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::PhysicsInteractor);
        let first = block(1);
        let second = block(2);

        assert_eq!(volume.enter(&first).edge(), OccupancyEdge::BecameOccupied);
        assert_eq!(volume.enter(&second).edge(), OccupancyEdge::None);
        assert_eq!(volume.occupancy(), 2);

        assert_eq!(volume.exit(&first).edge(), OccupancyEdge::None);
        assert_eq!(volume.occupancy(), 1);
        assert!(volume.occupied());

        assert_eq!(volume.exit(&second).edge(), OccupancyEdge::BecameVacant);
        assert_eq!(volume.occupancy(), 0);
        assert!(!volume.occupied());
    }

    #[test]
    fn exit_without_enter_is_clamped() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::PhysicsInteractor);
        assert_eq!(volume.exit(&block(5)), ContactOutcome::Unmatched);
        assert_eq!(volume.occupancy(), 0);

        volume.enter(&block(1));
        assert_eq!(volume.exit(&block(5)), ContactOutcome::Unmatched);
        assert_eq!(volume.occupancy(), 1);
    }

    #[test]
    fn repeated_enter_counts_once() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::PhysicsInteractor);
        volume.enter(&block(1));
        assert_eq!(volume.enter(&block(1)), ContactOutcome::Unmatched);
        assert_eq!(volume.occupancy(), 1);
        assert_eq!(volume.exit(&block(1)).edge(), OccupancyEdge::BecameVacant);
    }

    #[test]
    fn unrecognized_actors_are_filtered() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::Player);
        assert_eq!(volume.enter(&block(1)), ContactOutcome::Filtered);
        assert_eq!(volume.occupancy(), 0);

        let player = ActorHandle::new(
            ActorId::Player(PlayerId(1)),
            CapabilitySet::of(Capability::Player),
        );
        assert!(matches!(
            volume.enter(&player),
            ContactOutcome::Counted { occupancy: 1, .. }
        ));
    }

    #[test]
    fn occupancy_never_negative_under_arbitrary_order() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::PhysicsInteractor);
        let script: [(bool, u32); 10] = [
            (false, 1),
            (true, 1),
            (false, 2),
            (false, 1),
            (false, 1),
            (true, 2),
            (true, 3),
            (false, 3),
            (false, 2),
            (false, 2),
        ];
        for (enter, raw) in script {
            if enter {
                volume.enter(&block(raw));
            } else {
                volume.exit(&block(raw));
            }
            assert_eq!(volume.occupancy() as usize, volume.occupants.len());
        }
        assert_eq!(volume.occupancy(), 0);
    }

    #[test]
    fn subscription_is_deduplicated_and_respawn_clears_occupancy() {
        let mut volume = TriggerVolume::new(VolumeId(1), Capability::PhysicsInteractor);
        assert!(volume.subscribe(InteractorId(4)));
        assert!(!volume.subscribe(InteractorId(4)));
        assert_eq!(volume.subscribers().count(), 1);
        assert!(volume.unsubscribe(InteractorId(4)));

        volume.enter(&block(1));
        volume.respawn();
        assert_eq!(volume.occupancy(), 0);
        assert!(!volume.contains(ActorId::External(1)));
    }
}
