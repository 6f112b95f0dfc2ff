pub(crate) mod bootstrap;
pub(crate) mod loader;
pub(crate) mod loop_runner;
pub(crate) mod report_store;
pub(crate) mod script;

use std::path::PathBuf;

use puzzlenet::{ConnectError, LayoutError, PlayerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum HostError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{path}: {message}")]
    InvalidScript { path: PathBuf, message: String },
    #[error("invalid room layout {path}: {source}")]
    Layout {
        path: PathBuf,
        #[source]
        source: LayoutError,
    },
    #[error("{player} could not connect: {source}")]
    Connect {
        player: PlayerId,
        #[source]
        source: ConnectError,
    },
    #[error("session did not settle within {steps} steps")]
    NotSettled { steps: u64 },
    #[error("mirror of {player} diverged from the authority in {section} at tick {tick}")]
    Diverged {
        player: PlayerId,
        section: &'static str,
        tick: u64,
    },
    #[error("expectation failed: {0}")]
    Expectation(String),
    #[error("failed to encode session report: {0}")]
    EncodeReport(#[source] serde_json::Error),
    #[error("failed to write session report {path}: {source}")]
    WriteReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
