use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::{ControllerId, InteractorId, InteractorKey, VolumeId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Occupying the interactor activates its key; leaving does nothing.
    #[default]
    Press,
    /// Like press, but leaving deactivates the key again.
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractorKind {
    PressurePlate { volume: VolumeId },
    /// Pressed and released directly by player commands.
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractorSignal {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Activate,
    Deactivate,
}

/// Replicated presentation state of an interactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractorState {
    pub active: bool,
    pub enabled: bool,
}

impl Default for InteractorState {
    fn default() -> Self {
        Self {
            active: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Interactor {
    id: InteractorId,
    key: InteractorKey,
    mode: ActivationMode,
    kind: InteractorKind,
    state: InteractorState,
    owner: Option<ControllerId>,
}

impl Interactor {
    pub fn new(
        id: InteractorId,
        key: InteractorKey,
        mode: ActivationMode,
        kind: InteractorKind,
    ) -> Self {
        Self {
            id,
            key,
            mode,
            kind,
            state: InteractorState::default(),
            owner: None,
        }
    }

    pub fn id(&self) -> InteractorId {
        self.id
    }

    pub fn key(&self) -> &InteractorKey {
        &self.key
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn kind(&self) -> InteractorKind {
        self.kind
    }

    pub fn state(&self) -> InteractorState {
        self.state
    }

    pub fn owner(&self) -> Option<ControllerId> {
        self.owner
    }

    /// Owner is fixed on first bind; later binds to a different controller fail.
    pub(crate) fn bind(&mut self, owner: ControllerId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(owner);
                true
            }
            Some(existing) => existing == owner,
        }
    }

    pub fn on_signal(&mut self, signal: InteractorSignal) -> Option<KeyAction> {
        if !self.state.enabled {
            debug!(interactor = %self.id, key = %self.key, ?signal, "interactor_disabled_signal_ignored");
            return None;
        }
        match (signal, self.mode) {
            (InteractorSignal::Pressed, _) => {
                self.state.active = true;
                Some(KeyAction::Activate)
            }
            (InteractorSignal::Released, ActivationMode::Hold) => {
                self.state.active = false;
                Some(KeyAction::Deactivate)
            }
            (InteractorSignal::Released, ActivationMode::Press) => None,
        }
    }

    /// Returns true when the interactor was active and its key must leave the guess.
    pub fn reset(&mut self) -> bool {
        if !self.state.enabled || !self.state.active {
            return false;
        }
        self.state.active = false;
        true
    }

    pub fn disable(&mut self) -> bool {
        let changed = self.state.enabled;
        self.state.enabled = false;
        changed
    }

    pub(crate) fn restore(&mut self) -> bool {
        let changed = !self.state.enabled;
        self.state.enabled = true;
        changed
    }

    pub(crate) fn mirror_state(&mut self, state: InteractorState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(mode: ActivationMode) -> Interactor {
        Interactor::new(
            InteractorId(1),
            InteractorKey::from("A"),
            mode,
            InteractorKind::PressurePlate {
                volume: VolumeId(1),
            },
        )
    }

    #[test]
    fn press_mode_ignores_release() {
        let mut interactor = plate(ActivationMode::Press);
        assert_eq!(
            interactor.on_signal(InteractorSignal::Pressed),
            Some(KeyAction::Activate)
        );
        assert_eq!(interactor.on_signal(InteractorSignal::Released), None);
        assert!(interactor.state().active);
    }

    #[test]
    fn hold_mode_deactivates_on_release() {
        let mut interactor = plate(ActivationMode::Hold);
        interactor.on_signal(InteractorSignal::Pressed);
        assert_eq!(
            interactor.on_signal(InteractorSignal::Released),
            Some(KeyAction::Deactivate)
        );
        assert!(!interactor.state().active);
    }

    #[test]
    fn disabled_interactor_ignores_signals_until_restored() {
        let mut interactor = plate(ActivationMode::Hold);
        assert!(interactor.disable());
        assert!(!interactor.disable());
        assert_eq!(interactor.on_signal(InteractorSignal::Pressed), None);
        assert!(!interactor.state().active);

        assert!(interactor.restore());
        assert_eq!(
            interactor.on_signal(InteractorSignal::Pressed),
            Some(KeyAction::Activate)
        );
    }

    #[test]
    fn reset_is_noop_when_inactive() {
        let mut interactor = plate(ActivationMode::Press);
        assert!(!interactor.reset());
        interactor.on_signal(InteractorSignal::Pressed);
        assert!(interactor.reset());
        assert!(!interactor.reset());
        assert!(!interactor.state().active);
    }

    #[test]
    fn owner_is_fixed_after_first_bind() {
        let mut interactor = plate(ActivationMode::Press);
        assert!(interactor.bind(ControllerId(1)));
        assert!(interactor.bind(ControllerId(1)));
        assert!(!interactor.bind(ControllerId(2)));
        assert_eq!(interactor.owner(), Some(ControllerId(1)));
    }
}
