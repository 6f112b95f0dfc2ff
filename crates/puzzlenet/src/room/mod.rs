//! The authority boundary.
//!
//! A [`Room`] is either the authority, which applies queued commands once per
//! tick and publishes every replicated change as a [`Broadcast`], or a mirror,
//! which only applies broadcasts and builds requests for its local player.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::actor::{Actor, ActorHandle};
use crate::ids::{
    ActorId, ControllerId, InteractorId, PlayerId, ReceiverId, SelectableId, SenderId, VolumeId,
};
use crate::layout::{LayoutError, RoomLayout};
use crate::math::Vec3;
use crate::net::{
    Broadcast, BroadcastBus, BroadcastCounts, Command, CommandApplyStats, CommandQueue,
    CommandSource, Delivery, Envelope,
};
use crate::puzzle::{
    ContactOutcome, GuessUpdate, InteractionReceiver, Interactor, InteractorKind,
    InteractorSignal, OccupancyEdge, PuzzleInteractionController, ReceiverEffect, SubmitOutcome,
    SubmitReport, SubmitTrigger, TriggerVolume,
};
use crate::selection::{BodyState, PlayerHand, Selectable, SelectionRejection};
use crate::session::{JoinError, PlayerSlot, Session};

mod snapshot;

pub use snapshot::{
    ControllerSnapshot, InteractorSnapshot, ObjectSnapshot, ReceiverSnapshot, RoomSnapshot,
    VolumeSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Authority,
    Mirror { local_player: PlayerId },
}

#[derive(Debug)]
struct ReceiverSlot {
    receiver: Box<dyn InteractionReceiver>,
    triggered: u32,
    despawned: bool,
}

/// Layout-derived state rebuilt on a hard reset.
#[derive(Debug)]
struct World {
    volumes: BTreeMap<VolumeId, TriggerVolume>,
    controllers: BTreeMap<ControllerId, PuzzleInteractionController>,
    interactor_owners: BTreeMap<InteractorId, ControllerId>,
    senders: BTreeMap<SenderId, SubmitTrigger>,
    objects: BTreeMap<SelectableId, Selectable>,
}

type ControllerWiring = (
    BTreeMap<ControllerId, PuzzleInteractionController>,
    BTreeMap<InteractorId, ControllerId>,
);

impl World {
    fn build(layout: &RoomLayout) -> Result<Self, LayoutError> {
        let mut volumes: BTreeMap<VolumeId, TriggerVolume> = layout
            .volumes
            .iter()
            .map(|spec| (spec.id, TriggerVolume::new(spec.id, spec.accepts)))
            .collect();
        let (controllers, interactor_owners) = Self::build_controllers(layout, &mut volumes)?;

        let senders = layout
            .senders
            .iter()
            .map(|sender| (sender.id, *sender))
            .collect();
        let objects = layout
            .objects
            .iter()
            .map(|object| (object.id, Selectable::new(object.id, object.spawn)))
            .collect();

        Ok(Self {
            volumes,
            controllers,
            interactor_owners,
            senders,
            objects,
        })
    }

    /// Builds every controller and subscribes its plates to their volumes.
    fn build_controllers(
        layout: &RoomLayout,
        volumes: &mut BTreeMap<VolumeId, TriggerVolume>,
    ) -> Result<ControllerWiring, LayoutError> {
        let mut controllers = BTreeMap::new();
        let mut interactor_owners = BTreeMap::new();
        for spec in &layout.controllers {
            let interactors = spec
                .interactors
                .iter()
                .map(|interactor| {
                    Interactor::new(
                        interactor.id,
                        interactor.key.clone(),
                        interactor.mode,
                        interactor.kind,
                    )
                })
                .collect();
            let controller =
                PuzzleInteractionController::new(spec.id, spec.puzzle.clone(), interactors)?;
            for interactor in controller.interactors() {
                interactor_owners.insert(interactor.id(), spec.id);
                if let InteractorKind::PressurePlate { volume } = interactor.kind() {
                    let target = volumes.get_mut(&volume).ok_or(
                        LayoutError::UnknownInteractorVolume {
                            interactor: interactor.id(),
                            volume,
                        },
                    )?;
                    target.subscribe(interactor.id());
                }
            }
            controllers.insert(spec.id, controller);
        }
        Ok((controllers, interactor_owners))
    }

    /// Empties every volume, rebuilds the puzzles and returns objects to spawn.
    fn respawn(&mut self, layout: &RoomLayout) -> Result<(), LayoutError> {
        for volume in self.volumes.values_mut() {
            volume.respawn();
        }
        let (controllers, interactor_owners) = Self::build_controllers(layout, &mut self.volumes)?;
        self.controllers = controllers;
        self.interactor_owners = interactor_owners;
        for object in self.objects.values_mut() {
            object.respawn();
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Room {
    role: PeerRole,
    layout: RoomLayout,
    digest: String,
    tick: u64,
    world: World,
    receivers: BTreeMap<ReceiverId, ReceiverSlot>,
    session: Session,
    hands: BTreeMap<PlayerId, PlayerHand>,
    commands: CommandQueue,
    bus: BroadcastBus,
    lifetime_stats: CommandApplyStats,
}

impl Room {
    pub fn from_layout(layout: RoomLayout, role: PeerRole) -> Result<Self, LayoutError> {
        layout.validate()?;
        let digest = layout.digest()?;
        let world = World::build(&layout)?;
        let receivers = layout
            .receivers
            .iter()
            .map(|spec| {
                (
                    spec.id,
                    ReceiverSlot {
                        receiver: spec.kind.build(spec.id),
                        triggered: 0,
                        despawned: false,
                    },
                )
            })
            .collect();
        let session = Session::new(layout.spawn);

        info!(
            room = %layout.name,
            ?role,
            digest = %&digest[..12],
            volumes = world.volumes.len(),
            controllers = world.controllers.len(),
            objects = world.objects.len(),
            "room_loaded"
        );

        Ok(Self {
            role,
            layout,
            digest,
            tick: 0,
            world,
            receivers,
            session,
            hands: BTreeMap::new(),
            commands: CommandQueue::default(),
            bus: BroadcastBus::default(),
            lifetime_stats: CommandApplyStats::default(),
        })
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == PeerRole::Authority
    }

    pub fn layout(&self) -> &RoomLayout {
        &self.layout
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn volume(&self, id: VolumeId) -> Option<&TriggerVolume> {
        self.world.volumes.get(&id)
    }

    pub fn controller(&self, id: ControllerId) -> Option<&PuzzleInteractionController> {
        self.world.controllers.get(&id)
    }

    pub fn object(&self, id: SelectableId) -> Option<&Selectable> {
        self.world.objects.get(&id)
    }

    pub fn hand(&self, player: PlayerId) -> Option<&PlayerHand> {
        self.hands.get(&player)
    }

    pub fn local_hand(&self) -> Option<&PlayerHand> {
        match self.role {
            PeerRole::Mirror { local_player } => self.hands.get(&local_player),
            PeerRole::Authority => None,
        }
    }

    pub fn receiver_despawned(&self, id: ReceiverId) -> Option<bool> {
        self.receivers.get(&id).map(|slot| slot.despawned)
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    pub fn pending_broadcasts(&self) -> usize {
        self.bus.pending().len()
    }

    pub fn last_tick_apply_stats(&self) -> &CommandApplyStats {
        self.commands.last_tick_apply_stats()
    }

    pub fn lifetime_apply_stats(&self) -> &CommandApplyStats {
        &self.lifetime_stats
    }

    pub fn last_tick_broadcast_counts(&self) -> BroadcastCounts {
        self.bus.last_tick_counts()
    }

    /// Replaces a declared receiver's behaviour; its replicated counters stay.
    pub fn install_receiver(
        &mut self,
        id: ReceiverId,
        receiver: Box<dyn InteractionReceiver>,
    ) -> Result<(), LayoutError> {
        let slot = self
            .receivers
            .get_mut(&id)
            .ok_or(LayoutError::ReceiverNotDeclared { receiver: id })?;
        slot.receiver = receiver;
        info!(receiver = %id, "receiver_installed");
        Ok(())
    }

    pub fn on_trigger_enter(&mut self, volume: VolumeId, actor: &dyn Actor) {
        self.on_contact(volume, actor, true);
    }

    pub fn on_trigger_exit(&mut self, volume: VolumeId, actor: &dyn Actor) {
        self.on_contact(volume, actor, false);
    }

    fn on_contact(&mut self, volume: VolumeId, actor: &dyn Actor, entering: bool) {
        if !self.is_authority() {
            debug!(%volume, actor = %actor.actor_id(), "mirror_contact_ignored");
            return;
        }
        let actor_id = actor.actor_id();
        let capabilities = actor.capabilities();
        let command = if entering {
            Command::VolumeEntered {
                volume,
                actor: actor_id,
                capabilities,
            }
        } else {
            Command::VolumeExited {
                volume,
                actor: actor_id,
                capabilities,
            }
        };
        self.commands.enqueue(CommandSource::Local, command);
    }

    /// Queues a command for the next tick. Mirrors never accept commands.
    pub fn receive_command(&mut self, source: CommandSource, command: Command) -> bool {
        if !self.is_authority() {
            debug!(?source, kind = ?command.kind(), "mirror_command_ignored");
            return false;
        }
        self.commands.enqueue(source, command);
        true
    }

    pub fn drain_outgoing(&mut self) -> Vec<Envelope> {
        self.bus.drain()
    }

    /// Applies every queued command in arrival order, then moves held bodies
    /// to their holders' hands. No-op on mirrors.
    pub fn tick(&mut self) {
        if !self.is_authority() {
            return;
        }
        self.tick = self.tick.saturating_add(1);
        let mut stats = CommandApplyStats::default();
        for (source, command) in self.commands.drain_current_tick() {
            self.apply_command(source, command, &mut stats);
        }
        self.follow_hands();

        self.lifetime_stats.absorb(&stats);
        self.commands.set_last_tick_apply_stats(stats);
        self.bus.finish_tick_rollover();
    }

    pub fn player_joined(
        &mut self,
        player: PlayerId,
        layout_digest: &str,
    ) -> Result<PlayerSlot, JoinError> {
        if !self.is_authority() {
            return Err(JoinError::NotAuthority);
        }
        if layout_digest != self.digest {
            warn!(%player, expected = %self.digest, actual = %layout_digest, "join_refused_layout_mismatch");
            return Err(JoinError::LayoutMismatch {
                player,
                expected: self.digest.clone(),
                actual: layout_digest.to_string(),
            });
        }
        let slot = self.session.join(player).map_err(|err| {
            warn!(%player, error = %err, "join_refused");
            err
        })?;
        self.hands.insert(player, PlayerHand::default());

        self.emit(Delivery::All, Broadcast::PlayerJoined { slot });
        let snapshot = Box::new(self.snapshot());
        self.emit(Delivery::Player(player), Broadcast::Snapshot { snapshot });
        Ok(slot)
    }

    /// Sends the player a full snapshot, for peers that missed broadcasts.
    pub fn resync_player(&mut self, player: PlayerId) -> bool {
        if !self.is_authority() || !self.session.contains(player) {
            return false;
        }
        let snapshot = Box::new(self.snapshot());
        self.emit(Delivery::Player(player), Broadcast::Snapshot { snapshot });
        info!(%player, tick = self.tick, "player_resync_queued");
        true
    }

    /// Releases whatever the player held and evicts it from every volume.
    pub fn player_left(&mut self, player: PlayerId) -> bool {
        if !self.is_authority() || !self.session.contains(player) {
            return false;
        }
        let mut stats = CommandApplyStats::default();
        let held = self.hands.remove(&player).and_then(|hand| hand.held);
        if let Some(object) = held {
            if let Some(target) = self.world.objects.get_mut(&object) {
                if target.force_release().is_some() {
                    let body = target.body();
                    self.emit(
                        Delivery::All,
                        Broadcast::SelectionChanged {
                            object,
                            holder: None,
                            body,
                        },
                    );
                }
            }
        }
        self.evict_actor(ActorId::Player(player), &mut stats);
        self.session.leave(player);
        self.emit(Delivery::All, Broadcast::PlayerLeft { player });
        self.lifetime_stats.absorb(&stats);
        true
    }

    /// Re-enables every interactor of a controller. Authority only.
    pub fn restore_interactors(&mut self, controller: ControllerId) -> bool {
        if !self.is_authority() {
            return false;
        }
        let Some(target) = self.world.controllers.get_mut(&controller) else {
            return false;
        };
        let changed: Vec<_> = target
            .restore_interactors()
            .into_iter()
            .filter_map(|id| target.interactor(id).map(|interactor| (id, interactor.state())))
            .collect();
        info!(%controller, restored = changed.len(), "interactors_restored");
        for (interactor, state) in changed {
            self.emit(
                Delivery::All,
                Broadcast::InteractorChanged {
                    controller,
                    interactor,
                    state,
                },
            );
        }
        true
    }

    /// Returns every layout-derived value to its initial state, keeps the
    /// roster and publishes a fresh snapshot.
    pub fn hard_reset(&mut self) -> Result<(), LayoutError> {
        if !self.is_authority() {
            debug!("mirror_hard_reset_ignored");
            return Ok(());
        }
        self.world.respawn(&self.layout)?;
        for slot in self.receivers.values_mut() {
            slot.receiver.reset();
            slot.triggered = 0;
            slot.despawned = false;
        }
        for hand in self.hands.values_mut() {
            hand.held = None;
        }
        self.commands.clear();
        info!(room = %self.layout.name, tick = self.tick, "room_hard_reset");

        let snapshot = Box::new(self.snapshot());
        self.emit(Delivery::All, Broadcast::Snapshot { snapshot });
        Ok(())
    }

    /// Builds a select request for the local player. Never mutates.
    pub fn request_select(&self, object: SelectableId) -> Option<Command> {
        let PeerRole::Mirror { local_player } = self.role else {
            return None;
        };
        let target = self.world.objects.get(&object)?;
        if target.despawned() || target.is_selected() {
            debug!(%object, player = %local_player, "select_request_suppressed");
            return None;
        }
        Some(Command::RequestSelect {
            player: local_player,
            object,
        })
    }

    /// Deselects what the local hand holds, otherwise asks to select `target`.
    pub fn toggle_select(&self, target: Option<SelectableId>) -> Option<Command> {
        let PeerRole::Mirror { local_player } = self.role else {
            return None;
        };
        if let Some(held) = self.local_hand().and_then(|hand| hand.held) {
            return Some(Command::RequestDeselect {
                player: local_player,
                object: held,
            });
        }
        self.request_select(target?)
    }

    pub fn apply_envelope(&mut self, envelope: &Envelope) -> bool {
        let PeerRole::Mirror { local_player } = self.role else {
            debug!(kind = ?envelope.broadcast.kind(), "authority_envelope_ignored");
            return false;
        };
        if !envelope.delivery.reaches(local_player) {
            return false;
        }
        self.tick = self.tick.max(envelope.tick);

        match &envelope.broadcast {
            Broadcast::OccupancyChanged { volume, occupancy } => {
                if let Some(target) = self.world.volumes.get_mut(volume) {
                    target.mirror_occupancy(*occupancy);
                }
            }
            Broadcast::InteractorChanged {
                controller,
                interactor,
                state,
            } => {
                if let Some(target) = self.world.controllers.get_mut(controller) {
                    target.mirror_interactor(*interactor, *state);
                }
            }
            Broadcast::GuessChanged { controller, guess } => {
                if let Some(target) = self.world.controllers.get_mut(controller) {
                    target.mirror_guess(guess.clone());
                }
            }
            Broadcast::PuzzleSubmitted {
                controller,
                outcome,
            } => {
                if let Some(target) = self.world.controllers.get_mut(controller) {
                    if *outcome == SubmitOutcome::Success {
                        let solves = target.solves().saturating_add(1);
                        target.mirror_solves(solves);
                    }
                }
            }
            Broadcast::ReceiverTriggered {
                receiver,
                despawned,
                ..
            } => {
                if let Some(slot) = self.receivers.get_mut(receiver) {
                    slot.triggered = slot.triggered.saturating_add(1);
                    slot.despawned = *despawned;
                }
            }
            Broadcast::SelectionChanged {
                object,
                holder,
                body,
            } => {
                if let Some(target) = self.world.objects.get_mut(object) {
                    let despawned = target.despawned();
                    target.mirror(*holder, *body, despawned);
                }
                if *holder != Some(local_player) {
                    if let Some(hand) = self.hands.get_mut(&local_player) {
                        if hand.held == Some(*object) {
                            hand.held = None;
                        }
                    }
                }
            }
            Broadcast::BodyMoved { object, body } => {
                if let Some(target) = self.world.objects.get_mut(object) {
                    target.mirror_body(*body);
                }
            }
            Broadcast::ObjectDespawned { object } => {
                if let Some(target) = self.world.objects.get_mut(object) {
                    let (holder, body) = (target.holder(), target.body());
                    target.mirror(holder, body, true);
                }
            }
            Broadcast::Grabbed { object, player } => {
                self.hands.entry(*player).or_default().held = Some(*object);
            }
            Broadcast::Dropped { object, player } => {
                if let Some(hand) = self.hands.get_mut(player) {
                    if hand.held == Some(*object) {
                        hand.held = None;
                    }
                }
            }
            Broadcast::PlayerJoined { slot } => self.session.mirror_join(*slot),
            Broadcast::PlayerLeft { player } => {
                self.session.leave(*player);
            }
            Broadcast::Snapshot { snapshot } => self.restore_snapshot(snapshot, local_player),
        }
        true
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            layout_digest: self.digest.clone(),
            volumes: self
                .world
                .volumes
                .values()
                .map(|volume| VolumeSnapshot {
                    id: volume.id(),
                    occupancy: volume.occupancy(),
                })
                .collect(),
            controllers: self
                .world
                .controllers
                .values()
                .map(|controller| ControllerSnapshot {
                    id: controller.id(),
                    guess: controller.guess().to_vec(),
                    solves: controller.solves(),
                    interactors: controller
                        .interactors()
                        .map(|interactor| InteractorSnapshot {
                            id: interactor.id(),
                            state: interactor.state(),
                        })
                        .collect(),
                })
                .collect(),
            receivers: self
                .receivers
                .iter()
                .map(|(id, slot)| ReceiverSnapshot {
                    id: *id,
                    triggered: slot.triggered,
                    despawned: slot.despawned,
                })
                .collect(),
            objects: self
                .world
                .objects
                .values()
                .map(|object| ObjectSnapshot {
                    id: object.id(),
                    holder: object.holder(),
                    body: object.body(),
                    despawned: object.despawned(),
                })
                .collect(),
            players: self.session.players().copied().collect(),
        }
    }

    fn restore_snapshot(&mut self, snapshot: &RoomSnapshot, local_player: PlayerId) {
        if snapshot.layout_digest != self.digest {
            warn!(expected = %self.digest, actual = %snapshot.layout_digest, "snapshot_layout_mismatch");
            return;
        }
        for entry in &snapshot.volumes {
            if let Some(volume) = self.world.volumes.get_mut(&entry.id) {
                volume.mirror_occupancy(entry.occupancy);
            }
        }
        for entry in &snapshot.controllers {
            if let Some(controller) = self.world.controllers.get_mut(&entry.id) {
                controller.mirror_guess(entry.guess.clone());
                controller.mirror_solves(entry.solves);
                for interactor in &entry.interactors {
                    controller.mirror_interactor(interactor.id, interactor.state);
                }
            }
        }
        for entry in &snapshot.receivers {
            if let Some(slot) = self.receivers.get_mut(&entry.id) {
                slot.triggered = entry.triggered;
                slot.despawned = entry.despawned;
            }
        }
        for entry in &snapshot.objects {
            if let Some(object) = self.world.objects.get_mut(&entry.id) {
                object.mirror(entry.holder, entry.body, entry.despawned);
            }
        }
        self.session.mirror(snapshot.players.clone());

        let held = snapshot
            .objects
            .iter()
            .find(|entry| entry.holder == Some(local_player))
            .map(|entry| entry.id);
        self.hands.entry(local_player).or_default().held = held;
        debug!(player = %local_player, tick = self.tick, "snapshot_applied");
    }

    fn emit(&mut self, delivery: Delivery, broadcast: Broadcast) {
        self.bus.emit(self.tick, delivery, broadcast);
    }

    fn apply_command(
        &mut self,
        source: CommandSource,
        command: Command,
        stats: &mut CommandApplyStats,
    ) {
        stats.record_command(command.kind());
        if !command.accepts_source(source) {
            warn!(?source, kind = ?command.kind(), "command_source_mismatch");
            stats.record_rejected_source();
            return;
        }
        if let Some(player) = command.issuer() {
            if !self.session.contains(player) {
                debug!(%player, kind = ?command.kind(), "command_from_absent_player");
                stats.record_rejected_source();
                return;
            }
        }

        match command {
            Command::VolumeEntered {
                volume,
                actor,
                capabilities,
            } => self.apply_contact(volume, ActorHandle::new(actor, capabilities), true, stats),
            Command::VolumeExited {
                volume,
                actor,
                capabilities,
            } => self.apply_contact(volume, ActorHandle::new(actor, capabilities), false, stats),
            Command::PressSwitch { interactor, .. } => {
                self.apply_switch(interactor, InteractorSignal::Pressed, stats)
            }
            Command::ReleaseSwitch { interactor, .. } => {
                self.apply_switch(interactor, InteractorSignal::Released, stats)
            }
            Command::SendInteraction { sender, .. } => self.fire_sender(sender, stats),
            Command::RequestSelect { player, object } => {
                if let Err(rejection) = self.apply_select(player, object) {
                    debug!(%player, %object, %rejection, "select_rejected");
                    stats.record_rejected_selection();
                }
            }
            Command::RequestDeselect { player, object } => {
                if let Err(rejection) = self.apply_deselect(player, object) {
                    debug!(%player, %object, %rejection, "deselect_rejected");
                    stats.record_rejected_selection();
                }
            }
            Command::UpdateHandPose { player, pose } => self.apply_hand_pose(player, pose, stats),
            Command::Despawn { object } => {
                if !self.despawn_object(object, stats) {
                    stats.record_unknown_target();
                }
            }
            Command::RestoreInteractors { controller } => {
                if !self.restore_interactors(controller) {
                    stats.record_unknown_target();
                }
            }
        }
    }

    fn apply_contact(
        &mut self,
        volume: VolumeId,
        actor: ActorHandle,
        entering: bool,
        stats: &mut CommandApplyStats,
    ) {
        let Some(target) = self.world.volumes.get_mut(&volume) else {
            debug!(%volume, actor = %actor.actor_id(), "contact_unknown_volume");
            stats.record_unknown_target();
            return;
        };
        let outcome = if entering {
            target.enter(&actor)
        } else {
            target.exit(&actor)
        };
        self.after_contact(volume, outcome, stats);
    }

    fn after_contact(
        &mut self,
        volume: VolumeId,
        outcome: ContactOutcome,
        stats: &mut CommandApplyStats,
    ) {
        match outcome {
            ContactOutcome::Filtered => stats.record_filtered_contact(),
            ContactOutcome::Unmatched => stats.record_unmatched_contact(),
            ContactOutcome::Counted { occupancy, edge } => {
                self.emit(
                    Delivery::All,
                    Broadcast::OccupancyChanged { volume, occupancy },
                );
                self.dispatch_edge(volume, edge, stats);
            }
        }
    }

    fn dispatch_edge(
        &mut self,
        volume: VolumeId,
        edge: OccupancyEdge,
        stats: &mut CommandApplyStats,
    ) {
        let signal = match edge {
            OccupancyEdge::None => return,
            OccupancyEdge::BecameOccupied => InteractorSignal::Pressed,
            OccupancyEdge::BecameVacant => InteractorSignal::Released,
        };
        info!(%volume, ?edge, "volume_occupancy_edge");

        let subscribers: Vec<InteractorId> = self
            .world
            .volumes
            .get(&volume)
            .map(|target| target.subscribers().collect())
            .unwrap_or_default();
        for interactor in subscribers {
            self.signal_interactor(interactor, signal, stats);
        }

        if signal == InteractorSignal::Pressed {
            let senders: Vec<SenderId> = self
                .world
                .senders
                .values()
                .filter(|sender| sender.fires_on(volume))
                .map(|sender| sender.id)
                .collect();
            for sender in senders {
                self.fire_sender(sender, stats);
            }
        }
    }

    fn apply_switch(
        &mut self,
        interactor: InteractorId,
        signal: InteractorSignal,
        stats: &mut CommandApplyStats,
    ) {
        let kind = self
            .world
            .interactor_owners
            .get(&interactor)
            .and_then(|owner| self.world.controllers.get(owner))
            .and_then(|controller| controller.interactor(interactor))
            .map(Interactor::kind);
        match kind {
            Some(InteractorKind::Switch) => self.signal_interactor(interactor, signal, stats),
            Some(InteractorKind::PressurePlate { .. }) => {
                debug!(%interactor, "switch_command_for_plate_ignored");
                stats.record_unknown_target();
            }
            None => {
                debug!(%interactor, "switch_command_unknown_interactor");
                stats.record_unknown_target();
            }
        }
    }

    fn signal_interactor(
        &mut self,
        interactor: InteractorId,
        signal: InteractorSignal,
        stats: &mut CommandApplyStats,
    ) {
        let Some(&controller_id) = self.world.interactor_owners.get(&interactor) else {
            stats.record_unknown_target();
            return;
        };
        let Some(controller) = self.world.controllers.get_mut(&controller_id) else {
            stats.record_unknown_target();
            return;
        };
        let Some(report) = controller.signal(interactor, signal) else {
            stats.record_unknown_target();
            return;
        };
        let state = controller.interactor(interactor).map(Interactor::state);
        let guess = controller.guess().to_vec();

        if report.state_changed {
            if let Some(state) = state {
                self.emit(
                    Delivery::All,
                    Broadcast::InteractorChanged {
                        controller: controller_id,
                        interactor,
                        state,
                    },
                );
            }
        }
        match report.guess {
            GuessUpdate::Unchanged => {}
            GuessUpdate::Rejected(rejection) => {
                debug!(controller = %controller_id, %interactor, %rejection, "guess_activation_rejected");
                stats.record_rejected_guess();
            }
            GuessUpdate::Appended | GuessUpdate::Removed => {
                self.emit(
                    Delivery::All,
                    Broadcast::GuessChanged {
                        controller: controller_id,
                        guess,
                    },
                );
            }
            GuessUpdate::Submitted(submit) => self.finish_submit(controller_id, submit),
        }
    }

    fn fire_sender(&mut self, sender: SenderId, stats: &mut CommandApplyStats) {
        let Some(trigger) = self.world.senders.get(&sender).copied() else {
            debug!(%sender, "send_unknown_sender");
            stats.record_unknown_target();
            return;
        };
        let Some(controller) = self.world.controllers.get_mut(&trigger.controller) else {
            stats.record_unknown_target();
            return;
        };
        let report = controller.submit();
        self.finish_submit(trigger.controller, report);
    }

    fn finish_submit(&mut self, controller_id: ControllerId, report: SubmitReport) {
        let Some(controller) = self.world.controllers.get(&controller_id) else {
            return;
        };
        let changes: Vec<_> = report
            .changed_interactors
            .iter()
            .filter_map(|id| {
                controller
                    .interactor(*id)
                    .map(|interactor| (*id, interactor.state()))
            })
            .collect();
        let guess = controller.guess().to_vec();

        for (interactor, state) in changes {
            self.emit(
                Delivery::All,
                Broadcast::InteractorChanged {
                    controller: controller_id,
                    interactor,
                    state,
                },
            );
        }
        self.emit(
            Delivery::All,
            Broadcast::GuessChanged {
                controller: controller_id,
                guess,
            },
        );
        self.emit(
            Delivery::All,
            Broadcast::PuzzleSubmitted {
                controller: controller_id,
                outcome: report.outcome,
            },
        );
        if let Some(receiver) = report.receiver {
            self.trigger_receiver(receiver, controller_id);
        }
    }

    fn trigger_receiver(&mut self, receiver: ReceiverId, controller: ControllerId) {
        let Some(slot) = self.receivers.get_mut(&receiver) else {
            warn!(%receiver, %controller, "receiver_missing");
            return;
        };
        let effect = slot.receiver.on_interaction_received(controller);
        slot.triggered = slot.triggered.saturating_add(1);
        if effect == ReceiverEffect::Despawn && !slot.despawned {
            slot.despawned = true;
            info!(%receiver, %controller, "receiver_despawned");
        }
        let despawned = slot.despawned;
        self.emit(
            Delivery::All,
            Broadcast::ReceiverTriggered {
                receiver,
                controller,
                despawned,
            },
        );
    }

    fn apply_select(
        &mut self,
        player: PlayerId,
        object: SelectableId,
    ) -> Result<(), SelectionRejection> {
        let target = self
            .world
            .objects
            .get(&object)
            .ok_or(SelectionRejection::UnknownObject { object })?;
        if !target.check_grant(player)? {
            return Ok(());
        }

        let previous = self.hands.get(&player).and_then(|hand| hand.held);
        if let Some(previous) = previous.filter(|previous| *previous != object) {
            if let Err(rejection) = self.apply_deselect(player, previous) {
                debug!(%player, object = %previous, %rejection, "auto_deselect_rejected");
            }
        }

        let target = self
            .world
            .objects
            .get_mut(&object)
            .ok_or(SelectionRejection::UnknownObject { object })?;
        target.grant(player)?;
        let body = target.body();
        self.hands.entry(player).or_default().held = Some(object);

        self.emit(
            Delivery::All,
            Broadcast::SelectionChanged {
                object,
                holder: Some(player),
                body,
            },
        );
        self.emit(
            Delivery::Player(player),
            Broadcast::Grabbed { object, player },
        );
        Ok(())
    }

    fn apply_deselect(
        &mut self,
        player: PlayerId,
        object: SelectableId,
    ) -> Result<(), SelectionRejection> {
        let target = self
            .world
            .objects
            .get_mut(&object)
            .ok_or(SelectionRejection::UnknownObject { object })?;
        target.release(player)?;
        let body = target.body();
        self.after_release(object, player, body);
        Ok(())
    }

    fn after_release(&mut self, object: SelectableId, player: PlayerId, body: BodyState) {
        if let Some(hand) = self.hands.get_mut(&player) {
            if hand.held == Some(object) {
                hand.held = None;
            }
        }
        self.emit(
            Delivery::All,
            Broadcast::SelectionChanged {
                object,
                holder: None,
                body,
            },
        );
        self.emit(
            Delivery::Player(player),
            Broadcast::Dropped { object, player },
        );
    }

    fn apply_hand_pose(&mut self, player: PlayerId, pose: Vec3, stats: &mut CommandApplyStats) {
        if !pose.is_finite() {
            debug!(%player, "hand_pose_not_finite");
            stats.record_unknown_target();
            return;
        }
        self.hands.entry(player).or_default().pose = Some(pose);
    }

    fn follow_hands(&mut self) {
        let targets: Vec<(SelectableId, Vec3)> = self
            .hands
            .values()
            .filter_map(|hand| hand.held.zip(hand.pose))
            .collect();
        for (object, pose) in targets {
            let Some(target) = self.world.objects.get_mut(&object) else {
                continue;
            };
            if target.follow(pose) {
                let body = target.body();
                self.emit(Delivery::All, Broadcast::BodyMoved { object, body });
            }
        }
    }

    fn despawn_object(&mut self, object: SelectableId, stats: &mut CommandApplyStats) -> bool {
        let Some(target) = self.world.objects.get_mut(&object) else {
            debug!(%object, "despawn_unknown_object");
            return false;
        };
        if target.despawned() {
            debug!(%object, "despawn_repeated");
            return true;
        }
        let released = target.despawn();
        let body = target.body();
        if let Some(player) = released {
            self.after_release(object, player, body);
        }
        self.emit(Delivery::All, Broadcast::ObjectDespawned { object });
        self.evict_actor(ActorId::Object(object), stats);
        info!(%object, "object_despawned");
        true
    }

    fn evict_actor(&mut self, actor: ActorId, stats: &mut CommandApplyStats) {
        let containing: Vec<VolumeId> = self
            .world
            .volumes
            .values()
            .filter(|volume| volume.contains(actor))
            .map(TriggerVolume::id)
            .collect();
        for volume in containing {
            let Some(target) = self.world.volumes.get_mut(&volume) else {
                continue;
            };
            let outcome = target.evict(actor);
            self.after_contact(volume, outcome, stats);
        }
    }
}
