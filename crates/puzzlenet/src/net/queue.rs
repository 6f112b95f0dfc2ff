use serde::{Deserialize, Serialize};

use super::message::{
    Broadcast, BroadcastKind, Command, CommandKind, CommandSource, Delivery, Envelope,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandApplyStats {
    pub total: u32,
    pub volume_contacts: u32,
    pub switch_signals: u32,
    pub submissions: u32,
    pub select_requests: u32,
    pub deselect_requests: u32,
    pub hand_poses: u32,
    pub despawns: u32,
    pub restores: u32,
    pub rejected_source: u32,
    pub rejected_selection: u32,
    pub rejected_guess: u32,
    pub unknown_target: u32,
    pub filtered_contacts: u32,
    pub unmatched_contacts: u32,
}

impl CommandApplyStats {
    pub fn record_command(&mut self, kind: CommandKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            CommandKind::VolumeEntered | CommandKind::VolumeExited => {
                self.volume_contacts = self.volume_contacts.saturating_add(1)
            }
            CommandKind::PressSwitch | CommandKind::ReleaseSwitch => {
                self.switch_signals = self.switch_signals.saturating_add(1)
            }
            CommandKind::SendInteraction => self.submissions = self.submissions.saturating_add(1),
            CommandKind::RequestSelect => {
                self.select_requests = self.select_requests.saturating_add(1)
            }
            CommandKind::RequestDeselect => {
                self.deselect_requests = self.deselect_requests.saturating_add(1)
            }
            CommandKind::UpdateHandPose => self.hand_poses = self.hand_poses.saturating_add(1),
            CommandKind::Despawn => self.despawns = self.despawns.saturating_add(1),
            CommandKind::RestoreInteractors => self.restores = self.restores.saturating_add(1),
        }
    }

    pub fn record_rejected_source(&mut self) {
        self.rejected_source = self.rejected_source.saturating_add(1);
    }

    pub fn record_rejected_selection(&mut self) {
        self.rejected_selection = self.rejected_selection.saturating_add(1);
    }

    pub fn record_rejected_guess(&mut self) {
        self.rejected_guess = self.rejected_guess.saturating_add(1);
    }

    pub fn record_unknown_target(&mut self) {
        self.unknown_target = self.unknown_target.saturating_add(1);
    }

    pub fn record_filtered_contact(&mut self) {
        self.filtered_contacts = self.filtered_contacts.saturating_add(1);
    }

    pub fn record_unmatched_contact(&mut self) {
        self.unmatched_contacts = self.unmatched_contacts.saturating_add(1);
    }

    pub fn absorb(&mut self, other: &CommandApplyStats) {
        let pairs = [
            (&mut self.total, other.total),
            (&mut self.volume_contacts, other.volume_contacts),
            (&mut self.switch_signals, other.switch_signals),
            (&mut self.submissions, other.submissions),
            (&mut self.select_requests, other.select_requests),
            (&mut self.deselect_requests, other.deselect_requests),
            (&mut self.hand_poses, other.hand_poses),
            (&mut self.despawns, other.despawns),
            (&mut self.restores, other.restores),
            (&mut self.rejected_source, other.rejected_source),
            (&mut self.rejected_selection, other.rejected_selection),
            (&mut self.rejected_guess, other.rejected_guess),
            (&mut self.unknown_target, other.unknown_target),
            (&mut self.filtered_contacts, other.filtered_contacts),
            (&mut self.unmatched_contacts, other.unmatched_contacts),
        ];
        for (total, add) in pairs {
            *total = total.saturating_add(add);
        }
    }
}

/// Commands waiting for the next authority tick, in arrival order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<(CommandSource, Command)>,
    last_tick_apply_stats: CommandApplyStats,
}

impl CommandQueue {
    pub fn enqueue(&mut self, source: CommandSource, command: Command) {
        self.commands.push((source, command));
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn drain_current_tick(&mut self) -> Vec<(CommandSource, Command)> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn set_last_tick_apply_stats(&mut self, stats: CommandApplyStats) {
        self.last_tick_apply_stats = stats;
    }

    pub fn last_tick_apply_stats(&self) -> &CommandApplyStats {
        &self.last_tick_apply_stats
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastCounts {
    pub total: u32,
    pub occupancy: u32,
    pub interactor: u32,
    pub guess: u32,
    pub submitted: u32,
    pub receiver: u32,
    pub selection: u32,
    pub body: u32,
    pub despawned: u32,
    pub hand: u32,
    pub roster: u32,
    pub snapshot: u32,
}

impl BroadcastCounts {
    fn record(&mut self, kind: BroadcastKind) {
        self.total = self.total.saturating_add(1);
        match kind {
            BroadcastKind::OccupancyChanged => self.occupancy = self.occupancy.saturating_add(1),
            BroadcastKind::InteractorChanged => {
                self.interactor = self.interactor.saturating_add(1)
            }
            BroadcastKind::GuessChanged => self.guess = self.guess.saturating_add(1),
            BroadcastKind::PuzzleSubmitted => self.submitted = self.submitted.saturating_add(1),
            BroadcastKind::ReceiverTriggered => self.receiver = self.receiver.saturating_add(1),
            BroadcastKind::SelectionChanged => self.selection = self.selection.saturating_add(1),
            BroadcastKind::BodyMoved => self.body = self.body.saturating_add(1),
            BroadcastKind::ObjectDespawned => self.despawned = self.despawned.saturating_add(1),
            BroadcastKind::Grabbed | BroadcastKind::Dropped => {
                self.hand = self.hand.saturating_add(1)
            }
            BroadcastKind::PlayerJoined | BroadcastKind::PlayerLeft => {
                self.roster = self.roster.saturating_add(1)
            }
            BroadcastKind::Snapshot => self.snapshot = self.snapshot.saturating_add(1),
        }
    }
}

/// Outgoing broadcasts, stamped with the tick that produced them.
#[derive(Debug, Default)]
pub struct BroadcastBus {
    pending: Vec<Envelope>,
    current_tick_counts: BroadcastCounts,
    last_tick_counts: BroadcastCounts,
}

impl BroadcastBus {
    pub fn emit(&mut self, tick: u64, delivery: Delivery, broadcast: Broadcast) {
        self.current_tick_counts.record(broadcast.kind());
        self.pending.push(Envelope {
            tick,
            delivery,
            broadcast,
        });
    }

    pub fn pending(&self) -> &[Envelope] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.pending)
    }

    pub fn finish_tick_rollover(&mut self) {
        self.last_tick_counts = std::mem::take(&mut self.current_tick_counts);
    }

    pub fn last_tick_counts(&self) -> BroadcastCounts {
        self.last_tick_counts
    }
}
