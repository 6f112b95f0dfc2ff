//! In-memory transport joining one authority room with one mirror room per
//! connected player.
//!
//! Every hop takes `latency_ticks` steps. A partitioned player loses its
//! traffic in both directions, which models an unreachable authority.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::message::{Command, CommandSource, Envelope};
use crate::ids::PlayerId;
use crate::layout::{LayoutError, RoomLayout};
use crate::room::{PeerRole, Room};
use crate::session::{JoinError, PlayerSlot};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("mirror room could not be built: {0}")]
    Layout(#[from] LayoutError),
    #[error("authority refused the join: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopbackStats {
    pub commands_sent: u32,
    pub commands_delivered: u32,
    pub commands_lost: u32,
    pub envelopes_sent: u32,
    pub envelopes_delivered: u32,
    pub envelopes_lost: u32,
}

#[derive(Debug)]
struct MirrorPeer {
    room: Room,
    partitioned: bool,
}

#[derive(Debug)]
struct InFlight<T> {
    deliver_at: u64,
    player: PlayerId,
    payload: T,
}

#[derive(Debug)]
pub struct LoopbackSession {
    authority: Room,
    mirrors: BTreeMap<PlayerId, MirrorPeer>,
    latency_ticks: u64,
    now: u64,
    uplink: VecDeque<InFlight<Command>>,
    downlink: VecDeque<InFlight<Envelope>>,
    stats: LoopbackStats,
}

impl LoopbackSession {
    pub fn new(layout: RoomLayout, latency_ticks: u64) -> Result<Self, LayoutError> {
        let authority = Room::from_layout(layout, PeerRole::Authority)?;
        Ok(Self {
            authority,
            mirrors: BTreeMap::new(),
            latency_ticks,
            now: 0,
            uplink: VecDeque::new(),
            downlink: VecDeque::new(),
            stats: LoopbackStats::default(),
        })
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn latency_ticks(&self) -> u64 {
        self.latency_ticks
    }

    pub fn stats(&self) -> LoopbackStats {
        self.stats
    }

    pub fn authority(&self) -> &Room {
        &self.authority
    }

    /// Direct access for the authority-local collaborators (physics, tooling).
    pub fn authority_mut(&mut self) -> &mut Room {
        &mut self.authority
    }

    pub fn mirror(&self, player: PlayerId) -> Option<&Room> {
        self.mirrors.get(&player).map(|peer| &peer.room)
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.mirrors.keys().copied()
    }

    pub fn in_flight(&self) -> usize {
        self.uplink.len() + self.downlink.len()
    }

    pub fn connect(&mut self, player: PlayerId) -> Result<PlayerSlot, ConnectError> {
        let layout = self.authority.layout().clone();
        self.connect_with_layout(player, layout)
    }

    /// Joins with the player's own copy of the layout; a copy that differs from
    /// the authority's is refused.
    pub fn connect_with_layout(
        &mut self,
        player: PlayerId,
        layout: RoomLayout,
    ) -> Result<PlayerSlot, ConnectError> {
        let room = Room::from_layout(
            layout,
            PeerRole::Mirror {
                local_player: player,
            },
        )?;
        let slot = self.authority.player_joined(player, room.digest())?;
        self.mirrors.insert(
            player,
            MirrorPeer {
                room,
                partitioned: false,
            },
        );
        info!(%player, kind = ?slot.kind, tick = self.now, "loopback_connected");
        Ok(slot)
    }

    pub fn disconnect(&mut self, player: PlayerId) -> bool {
        if self.mirrors.remove(&player).is_none() {
            return false;
        }
        let before = self.in_flight();
        self.uplink.retain(|flight| flight.player != player);
        let dropped_up = before - self.in_flight();
        let before = self.in_flight();
        self.downlink.retain(|flight| flight.player != player);
        let dropped_down = before - self.in_flight();
        self.stats.commands_lost = self.stats.commands_lost.saturating_add(dropped_up as u32);
        self.stats.envelopes_lost = self.stats.envelopes_lost.saturating_add(dropped_down as u32);

        self.authority.player_left(player);
        info!(%player, tick = self.now, dropped_up, dropped_down, "loopback_disconnected");
        true
    }

    /// Healing a partition queues a fresh snapshot for that player.
    pub fn set_partitioned(&mut self, player: PlayerId, partitioned: bool) -> bool {
        let Some(peer) = self.mirrors.get_mut(&player) else {
            return false;
        };
        let healed = peer.partitioned && !partitioned;
        peer.partitioned = partitioned;
        info!(%player, partitioned, "loopback_partition_changed");
        if healed {
            self.authority.resync_player(player);
        }
        true
    }

    /// Sends a command from a player's mirror toward the authority.
    pub fn send(&mut self, player: PlayerId, command: Command) -> bool {
        self.stats.commands_sent = self.stats.commands_sent.saturating_add(1);
        let reachable = self
            .mirrors
            .get(&player)
            .is_some_and(|peer| !peer.partitioned);
        if !reachable {
            debug!(%player, kind = ?command.kind(), "loopback_command_lost");
            self.stats.commands_lost = self.stats.commands_lost.saturating_add(1);
            return false;
        }
        self.uplink.push_back(InFlight {
            deliver_at: self.now + self.latency_ticks,
            player,
            payload: command,
        });
        true
    }

    /// Advances one tick: due commands reach the authority, the authority
    /// ticks, its broadcasts fan out and due envelopes reach the mirrors.
    pub fn step(&mut self) {
        self.now += 1;

        while self
            .uplink
            .front()
            .is_some_and(|flight| flight.deliver_at <= self.now)
        {
            let Some(flight) = self.uplink.pop_front() else {
                break;
            };
            if self.is_reachable(flight.player) {
                self.authority
                    .receive_command(CommandSource::Player(flight.player), flight.payload);
                self.stats.commands_delivered = self.stats.commands_delivered.saturating_add(1);
            } else {
                debug!(player = %flight.player, kind = ?flight.payload.kind(), "loopback_command_lost");
                self.stats.commands_lost = self.stats.commands_lost.saturating_add(1);
            }
        }

        self.authority.tick();

        for envelope in self.authority.drain_outgoing() {
            for (player, peer) in &self.mirrors {
                if !envelope.delivery.reaches(*player) {
                    continue;
                }
                if peer.partitioned {
                    self.stats.envelopes_lost = self.stats.envelopes_lost.saturating_add(1);
                    continue;
                }
                self.stats.envelopes_sent = self.stats.envelopes_sent.saturating_add(1);
                self.downlink.push_back(InFlight {
                    deliver_at: self.now + self.latency_ticks,
                    player: *player,
                    payload: envelope.clone(),
                });
            }
        }

        while self
            .downlink
            .front()
            .is_some_and(|flight| flight.deliver_at <= self.now)
        {
            let Some(flight) = self.downlink.pop_front() else {
                break;
            };
            match self.mirrors.get_mut(&flight.player) {
                Some(peer) if !peer.partitioned => {
                    peer.room.apply_envelope(&flight.payload);
                    self.stats.envelopes_delivered =
                        self.stats.envelopes_delivered.saturating_add(1);
                }
                _ => {
                    self.stats.envelopes_lost = self.stats.envelopes_lost.saturating_add(1);
                }
            }
        }
    }

    /// Steps until nothing is queued or in flight, at most `max_steps` times.
    pub fn settle(&mut self, max_steps: u64) -> u64 {
        let mut steps = 0;
        while steps < max_steps && !self.is_quiet() {
            self.step();
            steps += 1;
        }
        steps
    }

    pub fn is_quiet(&self) -> bool {
        self.in_flight() == 0
            && self.authority.pending_commands() == 0
            && self.authority.pending_broadcasts() == 0
    }

    /// Players whose mirror disagrees with the authority, with the first
    /// differing snapshot section.
    pub fn divergent_mirrors(&self) -> Vec<(PlayerId, &'static str)> {
        let expected = self.authority.snapshot();
        self.mirrors
            .iter()
            .filter_map(|(player, peer)| {
                expected
                    .first_difference(&peer.room.snapshot())
                    .map(|section| (*player, section))
            })
            .collect()
    }

    fn is_reachable(&self, player: PlayerId) -> bool {
        self.mirrors
            .get(&player)
            .is_some_and(|peer| !peer.partitioned)
    }
}
