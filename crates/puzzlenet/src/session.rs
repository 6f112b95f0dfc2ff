//! Player roster and spawn placement.

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ids::PlayerId;
use crate::math::Vec3;

pub const DEFAULT_MAX_PLAYERS: u32 = 4;
pub const DEFAULT_RING_RADIUS: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// Headset player; the first to join an empty session.
    Immersive,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub player: PlayerId,
    pub kind: PlayerKind,
    pub spawn: Vec3,
    /// Facing around the vertical axis, radians.
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnLayout {
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    pub immersive_spawn: Vec3,
    pub desktop_origin: Vec3,
    #[serde(default = "default_ring_radius")]
    pub ring_radius: f32,
}

fn default_max_players() -> u32 {
    DEFAULT_MAX_PLAYERS
}

fn default_ring_radius() -> f32 {
    DEFAULT_RING_RADIUS
}

impl Default for SpawnLayout {
    fn default() -> Self {
        Self {
            max_players: DEFAULT_MAX_PLAYERS,
            immersive_spawn: Vec3::ZERO,
            desktop_origin: Vec3::ZERO,
            ring_radius: DEFAULT_RING_RADIUS,
        }
    }
}

impl SpawnLayout {
    /// Desktop players stand on a ring around the desktop origin, one step per
    /// player index, lifted one unit off the floor.
    pub fn desktop_spawn(&self, player: PlayerId) -> (Vec3, f32) {
        let steps = self.max_players.saturating_sub(1);
        let angle = if steps == 0 {
            0.0
        } else {
            TAU * (player.0 as f32 - 1.0) / steps as f32
        };
        let offset = Vec3::new(angle.cos(), 0.0, angle.sin()).scale(self.ring_radius);
        (self.desktop_origin.add(Vec3::UP).add(offset), angle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("session is full ({capacity} players)")]
    Full { capacity: u32 },
    #[error("{player} already joined")]
    AlreadyJoined { player: PlayerId },
    #[error("only the authority admits players")]
    NotAuthority,
    #[error("{player} loaded layout {actual}, session runs {expected}")]
    LayoutMismatch {
        player: PlayerId,
        expected: String,
        actual: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    layout: SpawnLayout,
    players: BTreeMap<PlayerId, PlayerSlot>,
}

impl Session {
    pub fn new(layout: SpawnLayout) -> Self {
        Self {
            layout,
            players: BTreeMap::new(),
        }
    }

    pub fn layout(&self) -> &SpawnLayout {
        &self.layout
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn slot(&self, player: PlayerId) -> Option<&PlayerSlot> {
        self.players.get(&player)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerSlot> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn join(&mut self, player: PlayerId) -> Result<PlayerSlot, JoinError> {
        if self.players.contains_key(&player) {
            return Err(JoinError::AlreadyJoined { player });
        }
        if self.players.len() >= self.layout.max_players as usize {
            return Err(JoinError::Full {
                capacity: self.layout.max_players,
            });
        }

        let slot = if self.players.is_empty() {
            PlayerSlot {
                player,
                kind: PlayerKind::Immersive,
                spawn: self.layout.immersive_spawn,
                yaw: 0.0,
            }
        } else {
            let (spawn, yaw) = self.layout.desktop_spawn(player);
            PlayerSlot {
                player,
                kind: PlayerKind::Desktop,
                spawn,
                yaw,
            }
        };
        info!(%player, kind = ?slot.kind, players = self.players.len() + 1, "player_spawned");
        self.players.insert(player, slot);
        Ok(slot)
    }

    pub fn leave(&mut self, player: PlayerId) -> Option<PlayerSlot> {
        let slot = self.players.remove(&player)?;
        info!(%player, players = self.players.len(), "player_despawned");
        Some(slot)
    }

    pub(crate) fn mirror(&mut self, slots: Vec<PlayerSlot>) {
        self.players = slots.into_iter().map(|slot| (slot.player, slot)).collect();
    }

    pub(crate) fn mirror_join(&mut self, slot: PlayerSlot) {
        self.players.insert(slot.player, slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4 && (a.z - b.z).abs() < 1e-4
    }

    #[test]
    fn first_player_is_immersive_then_ring() {
        let layout = SpawnLayout {
            immersive_spawn: Vec3::new(0.0, 0.0, -3.0),
            ..SpawnLayout::default()
        };
        let mut session = Session::new(layout);

        let host = session.join(PlayerId(1)).expect("join");
        assert_eq!(host.kind, PlayerKind::Immersive);
        assert_eq!(host.spawn, Vec3::new(0.0, 0.0, -3.0));

        let second = session.join(PlayerId(2)).expect("join");
        assert_eq!(second.kind, PlayerKind::Desktop);
        let expected_angle = TAU / 3.0;
        assert!((second.yaw - expected_angle).abs() < 1e-5);
        assert!(close(
            second.spawn,
            Vec3::new(4.0 * expected_angle.cos(), 1.0, 4.0 * expected_angle.sin())
        ));
    }

    #[test]
    fn join_respects_capacity_and_duplicates() {
        let mut session = Session::new(SpawnLayout {
            max_players: 2,
            ..SpawnLayout::default()
        });
        session.join(PlayerId(1)).expect("join");
        assert_eq!(
            session.join(PlayerId(1)),
            Err(JoinError::AlreadyJoined {
                player: PlayerId(1)
            })
        );
        session.join(PlayerId(2)).expect("join");
        assert_eq!(
            session.join(PlayerId(3)),
            Err(JoinError::Full { capacity: 2 })
        );

        assert!(session.leave(PlayerId(1)).is_some());
        assert!(session.leave(PlayerId(1)).is_none());
        assert_eq!(session.join(PlayerId(3)).map(|slot| slot.kind), Ok(PlayerKind::Desktop));
    }

    #[test]
    fn single_seat_ring_does_not_divide_by_zero() {
        let layout = SpawnLayout {
            max_players: 1,
            ..SpawnLayout::default()
        };
        let (spawn, yaw) = layout.desktop_spawn(PlayerId(5));
        assert_eq!(yaw, 0.0);
        assert!(spawn.is_finite());
    }
}
