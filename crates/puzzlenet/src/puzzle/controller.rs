use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::interactor::{Interactor, InteractorSignal, InteractorState, KeyAction};
use crate::ids::{ControllerId, InteractorId, InteractorKey, ReceiverId, SenderId};
use crate::layout::LayoutError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuzzleBehaviour {
    ResetInteractors,
    ResetGuess,
    DisableInteractors,
}

impl PuzzleBehaviour {
    const ALL: [PuzzleBehaviour; 3] = [
        PuzzleBehaviour::ResetInteractors,
        PuzzleBehaviour::ResetGuess,
        PuzzleBehaviour::DisableInteractors,
    ];

    const fn bit(self) -> u8 {
        match self {
            Self::ResetInteractors => 1 << 0,
            Self::ResetGuess => 1 << 1,
            Self::DisableInteractors => 1 << 2,
        }
    }
}

/// Bitmask of behaviours run after a submission. Serialized as a list of names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PuzzleBehaviour>", into = "Vec<PuzzleBehaviour>")]
pub struct BehaviourFlags(u8);

impl BehaviourFlags {
    pub const NONE: BehaviourFlags = BehaviourFlags(0);

    pub const fn with(self, behaviour: PuzzleBehaviour) -> Self {
        Self(self.0 | behaviour.bit())
    }

    pub const fn contains(self, behaviour: PuzzleBehaviour) -> bool {
        self.0 & behaviour.bit() != 0
    }
}

impl From<Vec<PuzzleBehaviour>> for BehaviourFlags {
    fn from(value: Vec<PuzzleBehaviour>) -> Self {
        value
            .into_iter()
            .fold(BehaviourFlags::NONE, |flags, behaviour| flags.with(behaviour))
    }
}

impl From<BehaviourFlags> for Vec<PuzzleBehaviour> {
    fn from(value: BehaviourFlags) -> Self {
        PuzzleBehaviour::ALL
            .into_iter()
            .filter(|behaviour| value.contains(*behaviour))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleConfig {
    pub password: Vec<InteractorKey>,
    #[serde(default)]
    pub ordered: bool,
    /// Zero means no cap on the guess length.
    #[serde(default)]
    pub max_length: u32,
    #[serde(default)]
    pub failure_behaviour: BehaviourFlags,
    #[serde(default)]
    pub success_behaviour: BehaviourFlags,
    #[serde(default)]
    pub submit_sender: Option<SenderId>,
    #[serde(default)]
    pub receiver: Option<ReceiverId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuessRejection {
    #[error("guess already holds the maximum of {max_length} keys")]
    Full { max_length: usize },
    #[error("key already present in an ordered guess")]
    DuplicateOrdered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReport {
    pub outcome: SubmitOutcome,
    /// Interactors whose replicated state changed while running the behaviour.
    pub changed_interactors: Vec<InteractorId>,
    pub guess_changed: bool,
    /// Set on success only; the receiver to notify exactly once.
    pub receiver: Option<ReceiverId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessUpdate {
    Unchanged,
    Rejected(GuessRejection),
    Appended,
    Removed,
    Submitted(SubmitReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalReport {
    pub interactor: InteractorId,
    pub state_changed: bool,
    pub guess: GuessUpdate,
}

#[derive(Debug, Clone)]
pub struct PuzzleInteractionController {
    id: ControllerId,
    config: PuzzleConfig,
    receiver: ReceiverId,
    interactors: BTreeMap<InteractorKey, Interactor>,
    keys_by_id: BTreeMap<InteractorId, InteractorKey>,
    guess: Vec<InteractorKey>,
    solves: u32,
}

impl PuzzleInteractionController {
    pub fn new(
        id: ControllerId,
        config: PuzzleConfig,
        interactors: Vec<Interactor>,
    ) -> Result<Self, LayoutError> {
        let receiver = config
            .receiver
            .ok_or(LayoutError::MissingReceiver { controller: id })?;
        if config.max_length > 0 && config.password.len() > config.max_length as usize {
            return Err(LayoutError::PasswordExceedsMaxLength {
                controller: id,
                password_len: config.password.len(),
                max_length: config.max_length,
            });
        }

        let mut by_key = BTreeMap::new();
        let mut keys_by_id = BTreeMap::new();
        for mut interactor in interactors {
            if !interactor.bind(id) {
                return Err(LayoutError::InteractorAlreadyOwned {
                    interactor: interactor.id(),
                });
            }
            let key = interactor.key().clone();
            if by_key.contains_key(&key) {
                return Err(LayoutError::DuplicateInteractorKey {
                    controller: id,
                    key: key.to_string(),
                });
            }
            keys_by_id.insert(interactor.id(), key.clone());
            by_key.insert(key, interactor);
        }

        Ok(Self {
            id,
            config,
            receiver,
            interactors: by_key,
            keys_by_id,
            guess: Vec::new(),
            solves: 0,
        })
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn config(&self) -> &PuzzleConfig {
        &self.config
    }

    pub fn receiver(&self) -> ReceiverId {
        self.receiver
    }

    pub fn guess(&self) -> &[InteractorKey] {
        &self.guess
    }

    pub fn solves(&self) -> u32 {
        self.solves
    }

    pub fn max_length(&self) -> Option<usize> {
        (self.config.max_length > 0).then_some(self.config.max_length as usize)
    }

    pub fn interactors(&self) -> impl Iterator<Item = &Interactor> {
        self.interactors.values()
    }

    pub fn interactor(&self, id: InteractorId) -> Option<&Interactor> {
        self.keys_by_id
            .get(&id)
            .and_then(|key| self.interactors.get(key))
    }

    /// Routes a press/release to the interactor and folds its key action into the guess.
    pub fn signal(&mut self, id: InteractorId, signal: InteractorSignal) -> Option<SignalReport> {
        let key = self.keys_by_id.get(&id)?.clone();
        let interactor = self.interactors.get_mut(&key)?;
        let before = interactor.state();
        let action = interactor.on_signal(signal);
        let state_changed = interactor.state() != before;

        let guess = match action {
            None => GuessUpdate::Unchanged,
            Some(KeyAction::Activate) => self.activate(&key),
            Some(KeyAction::Deactivate) => {
                if self.deactivate(&key) {
                    GuessUpdate::Removed
                } else {
                    GuessUpdate::Unchanged
                }
            }
        };
        Some(SignalReport {
            interactor: id,
            state_changed,
            guess,
        })
    }

    pub fn activate(&mut self, key: &InteractorKey) -> GuessUpdate {
        if let Some(max_length) = self.max_length() {
            if self.guess.len() >= max_length {
                debug!(controller = %self.id, %key, max_length, "guess_full_activation_rejected");
                return GuessUpdate::Rejected(GuessRejection::Full { max_length });
            }
        }
        if self.config.ordered && self.guess.contains(key) {
            debug!(controller = %self.id, %key, "guess_duplicate_activation_rejected");
            return GuessUpdate::Rejected(GuessRejection::DuplicateOrdered);
        }

        self.guess.push(key.clone());
        debug!(controller = %self.id, %key, guess_len = self.guess.len(), "guess_appended");

        if self.config.submit_sender.is_none() && self.guess.len() == self.auto_submit_length() {
            return GuessUpdate::Submitted(self.submit());
        }
        GuessUpdate::Appended
    }

    /// Removes one occurrence of `key`; returns false when it was absent.
    pub fn deactivate(&mut self, key: &InteractorKey) -> bool {
        match self.guess.iter().position(|entry| entry == key) {
            Some(index) => {
                self.guess.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn submit(&mut self) -> SubmitReport {
        let outcome = self.evaluate();
        let behaviour = match outcome {
            SubmitOutcome::Success => self.config.success_behaviour,
            SubmitOutcome::Failure => self.config.failure_behaviour,
        };
        info!(controller = %self.id, ?outcome, guess_len = self.guess.len(), "puzzle_submitted");

        let guess_before = self.guess.clone();
        let changed_interactors = self.run_behaviour(behaviour);
        let receiver = match outcome {
            SubmitOutcome::Success => {
                self.solves = self.solves.saturating_add(1);
                Some(self.receiver)
            }
            SubmitOutcome::Failure => None,
        };

        SubmitReport {
            outcome,
            changed_interactors,
            guess_changed: self.guess != guess_before,
            receiver,
        }
    }

    /// Re-enables every interactor; the only way back from a disable latch.
    pub fn restore_interactors(&mut self) -> Vec<InteractorId> {
        self.interactors
            .values_mut()
            .filter_map(|interactor| interactor.restore().then(|| interactor.id()))
            .collect()
    }

    pub(crate) fn mirror_solves(&mut self, solves: u32) {
        self.solves = solves;
    }

    pub(crate) fn mirror_guess(&mut self, guess: Vec<InteractorKey>) {
        self.guess = guess;
    }

    pub(crate) fn mirror_interactor(&mut self, id: InteractorId, state: InteractorState) -> bool {
        let Some(key) = self.keys_by_id.get(&id) else {
            return false;
        };
        match self.interactors.get_mut(key) {
            Some(interactor) => {
                interactor.mirror_state(state);
                true
            }
            None => false,
        }
    }

    fn auto_submit_length(&self) -> usize {
        self.max_length().unwrap_or(self.config.password.len())
    }

    fn evaluate(&self) -> SubmitOutcome {
        let password = &self.config.password;
        let length_matches = self.guess.len() == password.len();
        let success = if self.config.ordered {
            length_matches && self.guess == *password
        } else if self.max_length().is_none() && !length_matches {
            false
        } else {
            password.iter().all(|key| self.guess.contains(key))
        };
        if success {
            SubmitOutcome::Success
        } else {
            SubmitOutcome::Failure
        }
    }

    fn run_behaviour(&mut self, behaviour: BehaviourFlags) -> Vec<InteractorId> {
        let mut changed = Vec::new();
        if behaviour.contains(PuzzleBehaviour::ResetInteractors) {
            let mut released_keys = Vec::new();
            for interactor in self.interactors.values_mut() {
                if interactor.reset() {
                    changed.push(interactor.id());
                    released_keys.push(interactor.key().clone());
                }
            }
            for key in &released_keys {
                self.deactivate(key);
            }
        }
        if behaviour.contains(PuzzleBehaviour::ResetGuess) {
            self.guess.clear();
        }
        if behaviour.contains(PuzzleBehaviour::DisableInteractors) {
            for interactor in self.interactors.values_mut() {
                if interactor.disable() && !changed.contains(&interactor.id()) {
                    changed.push(interactor.id());
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::VolumeId;
    use crate::puzzle::interactor::{ActivationMode, InteractorKind};

    fn keys(raw: &[&str]) -> Vec<InteractorKey> {
        raw.iter().map(|key| InteractorKey::from(*key)).collect()
    }

    fn switches(raw: &[&str], mode: ActivationMode) -> Vec<Interactor> {
        raw.iter()
            .enumerate()
            .map(|(index, key)| {
                Interactor::new(
                    InteractorId(index as u32 + 1),
                    InteractorKey::from(*key),
                    mode,
                    InteractorKind::Switch,
                )
            })
            .collect()
    }

    fn config(password: &[&str], ordered: bool, max_length: u32) -> PuzzleConfig {
        PuzzleConfig {
            password: keys(password),
            ordered,
            max_length,
            failure_behaviour: BehaviourFlags::NONE.with(PuzzleBehaviour::ResetGuess),
            success_behaviour: BehaviourFlags::NONE,
            submit_sender: None,
            receiver: Some(ReceiverId(1)),
        }
    }

    fn controller(config: PuzzleConfig, raw: &[&str]) -> PuzzleInteractionController {
        PuzzleInteractionController::new(
            ControllerId(1),
            config,
            switches(raw, ActivationMode::Press),
        )
        .expect("controller")
    }

    fn outcome(update: &GuessUpdate) -> Option<SubmitOutcome> {
        match update {
            GuessUpdate::Submitted(report) => Some(report.outcome),
            _ => None,
        }
    }

    #[test]
    fn ordered_password_in_order_succeeds() {
        let mut puzzle = controller(config(&["A", "B"], true, 0), &["A", "B"]);

        assert_eq!(puzzle.activate(&"A".into()), GuessUpdate::Appended);
        assert_eq!(puzzle.guess(), keys(&["A"]).as_slice());

        let update = puzzle.activate(&"B".into());
        assert_eq!(outcome(&update), Some(SubmitOutcome::Success));
        let GuessUpdate::Submitted(report) = update else {
            panic!("expected submission");
        };
        assert_eq!(report.receiver, Some(ReceiverId(1)));
        assert_eq!(puzzle.solves(), 1);
    }

    #[test]
    fn ordered_password_out_of_order_fails() {
        let mut puzzle = controller(config(&["A", "B"], true, 0), &["A", "B"]);

        puzzle.activate(&"B".into());
        let update = puzzle.activate(&"A".into());
        assert_eq!(outcome(&update), Some(SubmitOutcome::Failure));
        let GuessUpdate::Submitted(report) = update else {
            panic!("expected submission");
        };
        assert_eq!(report.receiver, None);
        assert!(report.guess_changed);
        assert!(puzzle.guess().is_empty());
        assert_eq!(puzzle.solves(), 0);
    }

    #[test]
    fn ordered_mode_rejects_duplicate_keys() {
        let mut puzzle = controller(config(&["A", "B", "C"], true, 0), &["A", "B", "C"]);
        puzzle.activate(&"A".into());
        assert_eq!(
            puzzle.activate(&"A".into()),
            GuessUpdate::Rejected(GuessRejection::DuplicateOrdered)
        );
        assert_eq!(puzzle.guess().len(), 1);
    }

    #[test]
    fn unordered_with_max_length_tolerates_extras() {
        let mut puzzle = controller(config(&["A", "B"], false, 3), &["A", "B", "C"]);

        assert_eq!(puzzle.activate(&"A".into()), GuessUpdate::Appended);
        assert_eq!(puzzle.activate(&"C".into()), GuessUpdate::Appended);
        let update = puzzle.activate(&"B".into());
        assert_eq!(outcome(&update), Some(SubmitOutcome::Success));
        assert_eq!(puzzle.guess(), keys(&["A", "C", "B"]).as_slice());
    }

    #[test]
    fn unordered_without_max_length_requires_equal_length() {
        let mut cfg = config(&["A", "B"], false, 0);
        cfg.submit_sender = Some(SenderId(1));
        let mut puzzle = controller(cfg, &["A", "B"]);

        puzzle.activate(&"A".into());
        puzzle.activate(&"A".into());
        puzzle.activate(&"B".into());
        assert_eq!(puzzle.submit().outcome, SubmitOutcome::Failure);

        puzzle.activate(&"B".into());
        puzzle.activate(&"A".into());
        assert_eq!(puzzle.submit().outcome, SubmitOutcome::Success);
    }

    #[test]
    fn guess_never_exceeds_max_length() {
        let mut cfg = config(&["A"], false, 2);
        cfg.submit_sender = Some(SenderId(1));
        let mut puzzle = controller(cfg, &["A", "B", "C"]);

        let script = ["A", "B", "C", "A", "-A", "C", "B", "-B", "-B", "A"];
        for step in script {
            match step.strip_prefix('-') {
                Some(key) => {
                    puzzle.deactivate(&key.into());
                }
                None => {
                    puzzle.activate(&step.into());
                }
            }
            assert!(puzzle.guess().len() <= 2);
        }
        assert_eq!(
            puzzle.activate(&"C".into()),
            GuessUpdate::Rejected(GuessRejection::Full { max_length: 2 })
        );
    }

    #[test]
    fn deactivate_is_idempotent() {
        let mut puzzle = controller(config(&["A", "B"], false, 0), &["A", "B"]);
        assert!(!puzzle.deactivate(&"A".into()));
        puzzle.activate(&"A".into());
        assert!(puzzle.deactivate(&"A".into()));
        assert!(!puzzle.deactivate(&"A".into()));
        assert!(puzzle.guess().is_empty());
    }

    #[test]
    fn sender_disables_auto_submit() {
        let mut cfg = config(&["A"], true, 0);
        cfg.submit_sender = Some(SenderId(3));
        let mut puzzle = controller(cfg, &["A"]);
        assert_eq!(puzzle.activate(&"A".into()), GuessUpdate::Appended);
        assert_eq!(puzzle.submit().outcome, SubmitOutcome::Success);
    }

    #[test]
    fn success_behaviour_resets_and_disables_interactors() {
        let mut cfg = config(&["A", "B"], true, 0);
        cfg.success_behaviour = BehaviourFlags::NONE
            .with(PuzzleBehaviour::ResetInteractors)
            .with(PuzzleBehaviour::DisableInteractors);
        let mut puzzle = controller(cfg, &["A", "B", "C"]);

        puzzle.signal(InteractorId(1), InteractorSignal::Pressed);
        let report = puzzle
            .signal(InteractorId(2), InteractorSignal::Pressed)
            .expect("known interactor");
        let GuessUpdate::Submitted(submit) = report.guess else {
            panic!("expected submission");
        };
        assert_eq!(submit.outcome, SubmitOutcome::Success);
        assert_eq!(
            submit.changed_interactors,
            vec![InteractorId(1), InteractorId(2), InteractorId(3)]
        );
        assert!(puzzle.guess().is_empty());
        assert!(puzzle
            .interactors()
            .all(|interactor| !interactor.state().enabled && !interactor.state().active));

        let ignored = puzzle
            .signal(InteractorId(1), InteractorSignal::Pressed)
            .expect("known interactor");
        assert!(!ignored.state_changed);
        assert_eq!(ignored.guess, GuessUpdate::Unchanged);

        assert_eq!(puzzle.restore_interactors().len(), 3);
    }

    #[test]
    fn hold_release_removes_key_from_guess() {
        let mut puzzle = PuzzleInteractionController::new(
            ControllerId(1),
            config(&["A", "B"], false, 0),
            switches(&["A", "B"], ActivationMode::Hold),
        )
        .expect("controller");

        puzzle.signal(InteractorId(1), InteractorSignal::Pressed);
        let report = puzzle
            .signal(InteractorId(1), InteractorSignal::Released)
            .expect("known interactor");
        assert_eq!(report.guess, GuessUpdate::Removed);
        assert!(puzzle.guess().is_empty());
    }

    #[test]
    fn configuration_errors_fail_fast() {
        let duplicate = PuzzleInteractionController::new(
            ControllerId(1),
            config(&["A"], true, 0),
            switches(&["A", "A"], ActivationMode::Press),
        );
        assert!(matches!(
            duplicate,
            Err(LayoutError::DuplicateInteractorKey { .. })
        ));

        let too_long = PuzzleInteractionController::new(
            ControllerId(1),
            config(&["A", "B", "C"], true, 2),
            switches(&["A", "B", "C"], ActivationMode::Press),
        );
        assert!(matches!(
            too_long,
            Err(LayoutError::PasswordExceedsMaxLength { .. })
        ));

        let mut cfg = config(&["A"], true, 0);
        cfg.receiver = None;
        let missing = PuzzleInteractionController::new(
            ControllerId(1),
            cfg,
            switches(&["A"], ActivationMode::Press),
        );
        assert!(matches!(missing, Err(LayoutError::MissingReceiver { .. })));
    }

    #[test]
    fn behaviour_flags_round_trip_through_names() {
        let flags: BehaviourFlags =
            serde_json::from_str(r#"["reset_guess","disable_interactors"]"#).expect("decode");
        assert!(flags.contains(PuzzleBehaviour::ResetGuess));
        assert!(flags.contains(PuzzleBehaviour::DisableInteractors));
        assert!(!flags.contains(PuzzleBehaviour::ResetInteractors));
        assert_eq!(
            serde_json::to_string(&flags).expect("encode"),
            r#"["reset_guess","disable_interactors"]"#
        );
    }

    #[test]
    fn plate_interactors_are_indexed_by_id() {
        let plate = Interactor::new(
            InteractorId(7),
            InteractorKey::from("P"),
            ActivationMode::Hold,
            InteractorKind::PressurePlate {
                volume: VolumeId(2),
            },
        );
        let puzzle =
            PuzzleInteractionController::new(ControllerId(4), config(&["P"], true, 0), vec![plate])
                .expect("controller");
        let found = puzzle.interactor(InteractorId(7)).expect("plate");
        assert_eq!(found.owner(), Some(ControllerId(4)));
        assert!(puzzle.interactor(InteractorId(8)).is_none());
    }
}
