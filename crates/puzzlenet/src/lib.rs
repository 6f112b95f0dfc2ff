use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod actor;
pub mod ids;
pub mod layout;
pub mod math;
pub mod net;
pub mod puzzle;
pub mod room;
pub mod selection;
pub mod session;

pub use actor::{Actor, ActorHandle, Capability, CapabilitySet};
pub use ids::{
    ActorId, ControllerId, InteractorId, InteractorKey, PlayerId, ReceiverId, SelectableId,
    SenderId, VolumeId,
};
pub use layout::{
    ControllerSpec, InteractorSpec, LayoutError, ObjectSpec, ReceiverSpec, RoomLayout, VolumeSpec,
};
pub use math::Vec3;
pub use net::{
    Broadcast, BroadcastCounts, Command, CommandApplyStats, CommandSource, ConnectError, Delivery,
    Envelope, LoopbackSession, LoopbackStats,
};
pub use puzzle::{
    ActivationMode, BehaviourFlags, Chime, Door, InteractionReceiver, InteractorKind,
    PuzzleBehaviour, PuzzleConfig, PuzzleInteractionController, ReceiverEffect, ReceiverKind,
    SubmitOutcome, SubmitTrigger, TriggerVolume,
};
pub use room::{PeerRole, Room, RoomSnapshot};
pub use selection::{BodyState, PlayerHand, Selectable, SelectionRejection};
pub use session::{JoinError, PlayerKind, PlayerSlot, SpawnLayout};

pub const ROOT_ENV_VAR: &str = "PUZZLENET_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub rooms_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn reports_dir(&self) -> PathBuf {
        self.cache_dir.join("reports")
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "PUZZLENET_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
export {env_var}=\"/path/to/puzzlenet\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_under(root)
}

fn app_paths_under(root: PathBuf) -> Result<AppPaths, StartupError> {
    let rooms_dir = root.join("assets").join("rooms");
    let scripts_dir = root.join("assets").join("scripts");
    let cache_dir = root.join("cache");

    fs::create_dir_all(&cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: cache_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        rooms_dir,
        scripts_dir,
        cache_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml() {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("assets")).expect("mkdir");
        assert!(!is_repo_marker(root));

        fs::write(root.join("Cargo.toml"), "[workspace]\n").expect("write");
        assert!(is_repo_marker(root));
        assert!(!is_repo_marker(&root.join("definitely_not_a_marker")));
    }

    #[test]
    fn app_paths_create_cache_dir() {
        let temp = TempDir::new().expect("tempdir");
        let paths = app_paths_under(temp.path().to_path_buf()).expect("paths");
        assert!(paths.cache_dir.is_dir());
        assert_eq!(paths.rooms_dir, temp.path().join("assets").join("rooms"));
        assert_eq!(paths.reports_dir(), temp.path().join("cache").join("reports"));
    }
}
