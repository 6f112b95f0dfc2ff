pub mod controller;
pub mod interactor;
pub mod receiver;
pub mod sender;
pub mod trigger;

pub use controller::{
    BehaviourFlags, GuessRejection, GuessUpdate, PuzzleBehaviour, PuzzleConfig,
    PuzzleInteractionController, SignalReport, SubmitOutcome, SubmitReport,
};
pub use interactor::{
    ActivationMode, Interactor, InteractorKind, InteractorSignal, InteractorState, KeyAction,
};
pub use receiver::{Chime, Door, InteractionReceiver, ReceiverEffect, ReceiverKind};
pub use sender::SubmitTrigger;
pub use trigger::{ContactOutcome, OccupancyEdge, TriggerVolume};
