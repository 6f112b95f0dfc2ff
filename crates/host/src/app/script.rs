//! Scripted multi-player sessions replayed against a loopback transport.

use std::fmt::Display;

use puzzlenet::{
    ActorId, CapabilitySet, Command, ControllerId, InteractorKey, PlayerId, ReceiverId,
    SelectableId, VolumeId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionScript {
    pub(crate) name: String,
    /// Overrides the host's configured latency.
    #[serde(default)]
    pub(crate) latency_ticks: Option<u64>,
    pub(crate) events: Vec<ScriptEvent>,
    #[serde(default)]
    pub(crate) expect: ScriptExpectations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptEvent {
    /// Loopback tick at which the action is applied.
    pub(crate) at: u64,
    pub(crate) action: ScriptAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ScriptAction {
    Connect {
        player: PlayerId,
    },
    Disconnect {
        player: PlayerId,
    },
    Partition {
        player: PlayerId,
        partitioned: bool,
    },
    /// Physics contact reported to the authority.
    Enter {
        volume: VolumeId,
        actor: ActorId,
        capabilities: CapabilitySet,
    },
    Exit {
        volume: VolumeId,
        actor: ActorId,
        capabilities: CapabilitySet,
    },
    /// Raw command sent from a player's mirror.
    Send {
        player: PlayerId,
        command: Command,
    },
    /// Select request built by the player's mirror; suppressed requests are skipped.
    Select {
        player: PlayerId,
        object: SelectableId,
    },
    Toggle {
        player: PlayerId,
        #[serde(default)]
        target: Option<SelectableId>,
    },
    Local {
        command: Command,
    },
    Restore {
        controller: ControllerId,
    },
    HardReset,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct ScriptExpectations {
    #[serde(default)]
    pub(crate) players: Option<usize>,
    #[serde(default)]
    pub(crate) controllers: Vec<ControllerExpectation>,
    #[serde(default)]
    pub(crate) receivers: Vec<ReceiverExpectation>,
    #[serde(default)]
    pub(crate) objects: Vec<ObjectExpectation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ControllerExpectation {
    pub(crate) controller: ControllerId,
    #[serde(default)]
    pub(crate) solves: Option<u32>,
    #[serde(default)]
    pub(crate) guess: Option<Vec<InteractorKey>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ReceiverExpectation {
    pub(crate) receiver: ReceiverId,
    #[serde(default)]
    pub(crate) triggered: Option<u32>,
    #[serde(default)]
    pub(crate) despawned: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ObjectExpectation {
    pub(crate) object: SelectableId,
    /// Checked as written; absent means the object must be free.
    #[serde(default)]
    pub(crate) holder: Option<PlayerId>,
    #[serde(default)]
    pub(crate) despawned: Option<bool>,
}

impl SessionScript {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(validation_err("name", "must not be empty"));
        }
        if self.events.is_empty() {
            return Err(validation_err("events", "must contain at least one event"));
        }

        let mut previous_at = 0;
        for (index, event) in self.events.iter().enumerate() {
            if event.at < previous_at {
                return Err(expected_actual(
                    &format!("events[{index}].at"),
                    format!("tick >= {previous_at}"),
                    event.at,
                ));
            }
            previous_at = event.at;

            match &event.action {
                ScriptAction::Send { player, command } => match command.issuer() {
                    Some(issuer) if issuer == *player => {}
                    Some(issuer) => {
                        return Err(expected_actual(
                            &format!("events[{index}].action.command.player"),
                            player,
                            issuer,
                        ));
                    }
                    None => {
                        return Err(validation_err(
                            &format!("events[{index}].action.command"),
                            format!("{:?} is authority-local; use a local action", command.kind()),
                        ));
                    }
                },
                ScriptAction::Enter { capabilities, .. } | ScriptAction::Exit { capabilities, .. }
                    if capabilities.is_empty() =>
                {
                    return Err(validation_err(
                        &format!("events[{index}].action.capabilities"),
                        "must name at least one capability",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn validation_err(path: &str, message: impl Into<String>) -> String {
    format!("validation failed at {path}: {}", message.into())
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> String {
    validation_err(path, format!("expected {expected}, got {actual}"))
}
