//! Declarative room description shared by every peer.
//!
//! All peers must load the same layout; [`RoomLayout::digest`] is the
//! fingerprint compared when a player joins.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::actor::Capability;
use crate::ids::{
    ControllerId, InteractorId, InteractorKey, ReceiverId, SelectableId, SenderId, VolumeId,
};
use crate::math::Vec3;
use crate::puzzle::{ActivationMode, InteractorKind, PuzzleConfig, ReceiverKind, SubmitTrigger};
use crate::session::SpawnLayout;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u32 },
    #[error("{controller} declares interactor key '{key}' more than once")]
    DuplicateInteractorKey { controller: ControllerId, key: String },
    #[error("{controller} password has {password_len} keys but max length is {max_length}")]
    PasswordExceedsMaxLength {
        controller: ControllerId,
        password_len: usize,
        max_length: u32,
    },
    #[error("{controller} has no receiver")]
    MissingReceiver { controller: ControllerId },
    #[error("{controller} targets undeclared {receiver}")]
    UnknownReceiver {
        controller: ControllerId,
        receiver: ReceiverId,
    },
    #[error("{interactor} is bound to undeclared {volume}")]
    UnknownInteractorVolume {
        interactor: InteractorId,
        volume: VolumeId,
    },
    #[error("{sender} is bound to undeclared {volume}")]
    UnknownSenderVolume { sender: SenderId, volume: VolumeId },
    #[error("{sender} submits to undeclared {controller}")]
    UnknownController {
        sender: SenderId,
        controller: ControllerId,
    },
    #[error("{controller} waits for undeclared {sender}")]
    UnknownSubmitSender {
        controller: ControllerId,
        sender: SenderId,
    },
    #[error("{sender} submits to {controller}, which does not name it as its submit sender")]
    SenderNotAccepted {
        sender: SenderId,
        controller: ControllerId,
    },
    #[error("{interactor} is already owned by another controller")]
    InteractorAlreadyOwned { interactor: InteractorId },
    #[error("cannot install {receiver}: the layout does not declare it")]
    ReceiverNotDeclared { receiver: ReceiverId },
    #[error("spawn layout must allow at least one player")]
    ZeroCapacity,
    #[error("{what} has a non-finite position")]
    NonFinitePosition { what: String },
    #[error("failed to encode layout for digest: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub id: VolumeId,
    pub accepts: Capability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractorSpec {
    pub id: InteractorId,
    pub key: InteractorKey,
    #[serde(default)]
    pub mode: ActivationMode,
    pub kind: InteractorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerSpec {
    pub id: ControllerId,
    pub puzzle: PuzzleConfig,
    pub interactors: Vec<InteractorSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverSpec {
    pub id: ReceiverId,
    pub kind: ReceiverKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: SelectableId,
    pub spawn: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomLayout {
    pub name: String,
    #[serde(default)]
    pub spawn: SpawnLayout,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub receivers: Vec<ReceiverSpec>,
    #[serde(default)]
    pub controllers: Vec<ControllerSpec>,
    #[serde(default)]
    pub senders: Vec<SubmitTrigger>,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
}

impl RoomLayout {
    /// Cross-reference checks. Per-controller rules (keys, password length,
    /// receiver presence) are enforced when the controller is built.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.spawn.max_players == 0 {
            return Err(LayoutError::ZeroCapacity);
        }
        for (what, position) in [
            ("immersive spawn", self.spawn.immersive_spawn),
            ("desktop origin", self.spawn.desktop_origin),
        ] {
            if !position.is_finite() {
                return Err(LayoutError::NonFinitePosition {
                    what: what.to_string(),
                });
            }
        }

        let volumes = unique_ids("volume", self.volumes.iter().map(|volume| volume.id.0))?;
        let receivers = unique_ids(
            "receiver",
            self.receivers.iter().map(|receiver| receiver.id.0),
        )?;
        let controllers = unique_ids(
            "controller",
            self.controllers.iter().map(|controller| controller.id.0),
        )?;
        unique_ids(
            "interactor",
            self.controllers
                .iter()
                .flat_map(|controller| controller.interactors.iter().map(|spec| spec.id.0)),
        )?;
        let senders = unique_ids("sender", self.senders.iter().map(|sender| sender.id.0))?;
        unique_ids("object", self.objects.iter().map(|object| object.id.0))?;

        for controller in &self.controllers {
            if let Some(sender) = controller.puzzle.submit_sender {
                if !senders.contains(&sender.0) {
                    return Err(LayoutError::UnknownSubmitSender {
                        controller: controller.id,
                        sender,
                    });
                }
            }
            if let Some(receiver) = controller.puzzle.receiver {
                if !receivers.contains(&receiver.0) {
                    return Err(LayoutError::UnknownReceiver {
                        controller: controller.id,
                        receiver,
                    });
                }
            }
            for spec in &controller.interactors {
                if let InteractorKind::PressurePlate { volume } = spec.kind {
                    if !volumes.contains(&volume.0) {
                        return Err(LayoutError::UnknownInteractorVolume {
                            interactor: spec.id,
                            volume,
                        });
                    }
                }
            }
        }

        for sender in &self.senders {
            if !controllers.contains(&sender.controller.0) {
                return Err(LayoutError::UnknownController {
                    sender: sender.id,
                    controller: sender.controller,
                });
            }
            let accepted = self.controllers.iter().any(|controller| {
                controller.id == sender.controller
                    && controller.puzzle.submit_sender == Some(sender.id)
            });
            if !accepted {
                return Err(LayoutError::SenderNotAccepted {
                    sender: sender.id,
                    controller: sender.controller,
                });
            }
            if let Some(volume) = sender.volume {
                if !volumes.contains(&volume.0) {
                    return Err(LayoutError::UnknownSenderVolume {
                        sender: sender.id,
                        volume,
                    });
                }
            }
        }

        for object in &self.objects {
            if !object.spawn.is_finite() {
                return Err(LayoutError::NonFinitePosition {
                    what: object.id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Lowercase hex sha256 of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String, LayoutError> {
        let bytes = serde_json::to_vec(self).map_err(LayoutError::Encode)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(to_hex_lower(&hasher.finalize()))
    }
}

fn unique_ids(
    kind: &'static str,
    ids: impl Iterator<Item = u32>,
) -> Result<BTreeSet<u32>, LayoutError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(LayoutError::DuplicateId { kind, id });
        }
    }
    Ok(seen)
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}


#[cfg(test)]
mod tests {
    use super::fixtures::vault_layout;
    use super::*;

    #[test]
    fn vault_layout_is_valid() {
        vault_layout(true, false).validate().expect("valid");
        vault_layout(false, true).validate().expect("valid");
    }

    #[test]
    fn duplicate_ids_are_reported_with_kind() {
        let mut layout = vault_layout(true, false);
        layout.objects.push(ObjectSpec {
            id: SelectableId(1),
            spawn: Vec3::ZERO,
        });
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::DuplicateId {
                kind: "object",
                id: 1
            })
        ));
    }

    #[test]
    fn dangling_references_are_rejected() {
        let mut layout = vault_layout(true, false);
        layout.controllers[0].puzzle.receiver = Some(ReceiverId(9));
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::UnknownReceiver { .. })
        ));

        let mut layout = vault_layout(true, false);
        layout.controllers[0].interactors[0].kind = InteractorKind::PressurePlate {
            volume: VolumeId(7),
        };
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::UnknownInteractorVolume { .. })
        ));

        let mut layout = vault_layout(true, true);
        layout.senders[0].controller = ControllerId(4);
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::UnknownController { .. })
        ));
    }

    #[test]
    fn submit_sender_must_be_declared_and_agree() {
        let mut layout = vault_layout(true, false);
        layout.controllers[0].puzzle.submit_sender = Some(SenderId(99));
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::UnknownSubmitSender {
                controller: ControllerId(1),
                sender: SenderId(99)
            })
        ));

        let mut layout = vault_layout(true, true);
        layout.controllers[0].puzzle.submit_sender = None;
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::SenderNotAccepted {
                sender: SenderId(1),
                controller: ControllerId(1)
            })
        ));

        let mut layout = vault_layout(true, true);
        layout.senders.push(SubmitTrigger {
            id: SenderId(2),
            controller: ControllerId(1),
            volume: None,
        });
        assert!(matches!(
            layout.validate(),
            Err(LayoutError::SenderNotAccepted {
                sender: SenderId(2),
                ..
            })
        ));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a = vault_layout(true, false).digest().expect("digest");
        let b = vault_layout(true, false).digest().expect("digest");
        let c = vault_layout(false, false).digest().expect("digest");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn layout_json_uses_readable_names() {
        let raw = r#"{
            "name": "tiny",
            "volumes": [{ "id": 1, "accepts": "player" }],
            "receivers": [{ "id": 1, "kind": "chime" }],
            "controllers": [{
                "id": 1,
                "puzzle": {
                    "password": ["A"],
                    "ordered": true,
                    "success_behaviour": ["reset_guess"],
                    "receiver": 1
                },
                "interactors": [
                    { "id": 1, "key": "A", "mode": "hold", "kind": { "pressure_plate": { "volume": 1 } } },
                    { "id": 2, "key": "B", "kind": "switch" }
                ]
            }],
            "objects": [{ "id": 3, "spawn": [0.0, 1.0, 0.0] }]
        }"#;
        let layout: RoomLayout = serde_json::from_str(raw).expect("parse");
        layout.validate().expect("valid");
        assert_eq!(layout.spawn.max_players, 4);
        assert_eq!(layout.controllers[0].interactors[1].mode, ActivationMode::Press);
        assert_eq!(layout.objects[0].spawn, Vec3::UP);
    }
}
