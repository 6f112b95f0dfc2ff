use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use puzzlenet::{
    resolve_app_paths, ActorHandle, AppPaths, CommandApplyStats, CommandSource, LoopbackSession,
    LoopbackStats, RoomSnapshot,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::bootstrap::{AppWiring, HostConfig};
use super::loader::{load_room_layout, load_session_script, resolve_under};
use super::report_store::ReportStore;
use super::script::{ScriptAction, ScriptEvent, ScriptExpectations};
use super::HostError;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionReport {
    pub(crate) script: String,
    pub(crate) room: String,
    pub(crate) latency_ticks: u64,
    pub(crate) ticks: u64,
    pub(crate) settle_steps: u64,
    pub(crate) simulated_ms: u64,
    pub(crate) transport: LoopbackStats,
    pub(crate) authority_commands: CommandApplyStats,
    pub(crate) final_state: RoomSnapshot,
    #[serde(skip)]
    pub(crate) path: PathBuf,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let paths = match resolve_app_paths() {
        Ok(paths) => paths,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    match run_session_with_paths(&app.config, &paths) {
        Ok(report) => {
            info!(
                script = %report.script,
                ticks = report.ticks,
                report = %report.path.display(),
                "session_complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "session_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_session_with_paths(
    config: &HostConfig,
    paths: &AppPaths,
) -> Result<SessionReport, HostError> {
    let layout_path = resolve_under(&paths.rooms_dir, &config.layout);
    let script_path = resolve_under(&paths.scripts_dir, &config.script);
    let layout = load_room_layout(&layout_path)?;
    let script = load_session_script(&script_path)?;

    let latency_ticks = script.latency_ticks.unwrap_or(config.latency_ticks);
    let room_name = layout.name.clone();
    let mut session =
        LoopbackSession::new(layout, latency_ticks).map_err(|source| HostError::Layout {
            path: layout_path.clone(),
            source,
        })?;
    info!(
        script = %script.name,
        room = %room_name,
        latency_ticks,
        "session_started"
    );

    for event in &script.events {
        while session.now() < event.at {
            session.step();
        }
        apply_event(&mut session, event, &layout_path)?;
    }

    let settle_steps = session.settle(config.settle_ticks);
    if !session.is_quiet() {
        return Err(HostError::NotSettled {
            steps: config.settle_ticks,
        });
    }
    if let Some((player, section)) = session.divergent_mirrors().into_iter().next() {
        return Err(HostError::Diverged {
            player,
            section,
            tick: session.now(),
        });
    }

    let final_state = session.authority().snapshot();
    check_expectations(&script.expect, &final_state)?;

    let ticks = session.now();
    let mut report = SessionReport {
        script: script.name.clone(),
        room: room_name,
        latency_ticks,
        ticks,
        settle_steps,
        simulated_ms: ticks.saturating_mul(1000) / u64::from(config.target_tps.max(1)),
        transport: session.stats(),
        authority_commands: session.authority().lifetime_apply_stats().clone(),
        final_state,
        path: PathBuf::new(),
    };
    report.path = ReportStore::new(paths.reports_dir()).save(&script.name, &report)?;
    Ok(report)
}

fn apply_event(
    session: &mut LoopbackSession,
    event: &ScriptEvent,
    layout_path: &Path,
) -> Result<(), HostError> {
    debug!(tick = session.now(), action = ?event.action, "script_event");
    match &event.action {
        ScriptAction::Connect { player } => {
            session
                .connect(*player)
                .map_err(|source| HostError::Connect {
                    player: *player,
                    source,
                })?;
        }
        ScriptAction::Disconnect { player } => {
            if !session.disconnect(*player) {
                warn!(%player, "script_disconnect_unknown_player");
            }
        }
        ScriptAction::Partition {
            player,
            partitioned,
        } => {
            if !session.set_partitioned(*player, *partitioned) {
                warn!(%player, "script_partition_unknown_player");
            }
        }
        ScriptAction::Enter {
            volume,
            actor,
            capabilities,
        } => {
            let handle = ActorHandle::new(*actor, *capabilities);
            session.authority_mut().on_trigger_enter(*volume, &handle);
        }
        ScriptAction::Exit {
            volume,
            actor,
            capabilities,
        } => {
            let handle = ActorHandle::new(*actor, *capabilities);
            session.authority_mut().on_trigger_exit(*volume, &handle);
        }
        ScriptAction::Send { player, command } => {
            if !session.send(*player, command.clone()) {
                warn!(%player, kind = ?command.kind(), "script_command_lost");
            }
        }
        ScriptAction::Select { player, object } => {
            let request = session
                .mirror(*player)
                .and_then(|mirror| mirror.request_select(*object));
            match request {
                Some(command) => {
                    session.send(*player, command);
                }
                None => debug!(%player, %object, "script_select_suppressed"),
            }
        }
        ScriptAction::Toggle { player, target } => {
            let request = session
                .mirror(*player)
                .and_then(|mirror| mirror.toggle_select(*target));
            match request {
                Some(command) => {
                    session.send(*player, command);
                }
                None => debug!(%player, "script_toggle_suppressed"),
            }
        }
        ScriptAction::Local { command } => {
            if !session
                .authority_mut()
                .receive_command(CommandSource::Local, command.clone())
            {
                warn!(kind = ?command.kind(), "script_local_command_rejected");
            }
        }
        ScriptAction::Restore { controller } => {
            if !session.authority_mut().restore_interactors(*controller) {
                warn!(%controller, "script_restore_unknown_controller");
            }
        }
        ScriptAction::HardReset => {
            session
                .authority_mut()
                .hard_reset()
                .map_err(|source| HostError::Layout {
                    path: layout_path.to_path_buf(),
                    source,
                })?;
        }
    }
    Ok(())
}

fn check_expectations(
    expect: &ScriptExpectations,
    state: &RoomSnapshot,
) -> Result<(), HostError> {
    if let Some(players) = expect.players {
        if state.players.len() != players {
            return Err(mismatch("players", players, state.players.len()));
        }
    }

    for wanted in &expect.controllers {
        let Some(actual) = state
            .controllers
            .iter()
            .find(|controller| controller.id == wanted.controller)
        else {
            return Err(HostError::Expectation(format!(
                "{} is not part of the room",
                wanted.controller
            )));
        };
        if let Some(solves) = wanted.solves {
            if actual.solves != solves {
                return Err(mismatch(
                    &format!("{}.solves", wanted.controller),
                    solves,
                    actual.solves,
                ));
            }
        }
        if let Some(guess) = &wanted.guess {
            if &actual.guess != guess {
                return Err(mismatch(
                    &format!("{}.guess", wanted.controller),
                    format!("{guess:?}"),
                    format!("{:?}", actual.guess),
                ));
            }
        }
    }

    for wanted in &expect.receivers {
        let Some(actual) = state
            .receivers
            .iter()
            .find(|receiver| receiver.id == wanted.receiver)
        else {
            return Err(HostError::Expectation(format!(
                "{} is not part of the room",
                wanted.receiver
            )));
        };
        if let Some(triggered) = wanted.triggered {
            if actual.triggered != triggered {
                return Err(mismatch(
                    &format!("{}.triggered", wanted.receiver),
                    triggered,
                    actual.triggered,
                ));
            }
        }
        if let Some(despawned) = wanted.despawned {
            if actual.despawned != despawned {
                return Err(mismatch(
                    &format!("{}.despawned", wanted.receiver),
                    despawned,
                    actual.despawned,
                ));
            }
        }
    }

    for wanted in &expect.objects {
        let Some(actual) = state.objects.iter().find(|object| object.id == wanted.object) else {
            return Err(HostError::Expectation(format!(
                "{} is not part of the room",
                wanted.object
            )));
        };
        if actual.holder != wanted.holder {
            return Err(mismatch(
                &format!("{}.holder", wanted.object),
                format!("{:?}", wanted.holder),
                format!("{:?}", actual.holder),
            ));
        }
        if let Some(despawned) = wanted.despawned {
            if actual.despawned != despawned {
                return Err(mismatch(
                    &format!("{}.despawned", wanted.object),
                    despawned,
                    actual.despawned,
                ));
            }
        }
    }
    Ok(())
}

fn mismatch(what: &str, expected: impl Display, actual: impl Display) -> HostError {
    HostError::Expectation(format!("{what}: expected {expected}, got {actual}"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const TINY_LAYOUT: &str = r#"{
        "name": "tiny",
        "volumes": [{ "id": 1, "accepts": "player" }],
        "receivers": [{ "id": 1, "kind": "door" }],
        "controllers": [{
            "id": 1,
            "puzzle": { "password": ["A"], "ordered": true, "receiver": 1 },
            "interactors": [
                { "id": 1, "key": "A", "kind": { "pressure_plate": { "volume": 1 } } }
            ]
        }],
        "objects": [{ "id": 1, "spawn": [2.0, 0.0, 0.0] }]
    }"#;

    fn workspace(script: &str) -> (TempDir, AppPaths) {
        let temp = TempDir::new().expect("tempdir");
        let paths = AppPaths {
            root: temp.path().to_path_buf(),
            rooms_dir: temp.path().join("assets").join("rooms"),
            scripts_dir: temp.path().join("assets").join("scripts"),
            cache_dir: temp.path().join("cache"),
        };
        fs::create_dir_all(&paths.rooms_dir).expect("rooms dir");
        fs::create_dir_all(&paths.scripts_dir).expect("scripts dir");
        fs::write(paths.rooms_dir.join("tiny.json"), TINY_LAYOUT).expect("layout");
        fs::write(paths.scripts_dir.join("walk.json"), script).expect("script");
        (temp, paths)
    }

    fn config() -> HostConfig {
        HostConfig {
            layout: PathBuf::from("tiny.json"),
            script: PathBuf::from("walk.json"),
            ..HostConfig::default()
        }
    }

    #[test]
    fn scripted_session_converges_and_writes_report() {
        let (_temp, paths) = workspace(
            r#"{
                "name": "walk",
                "events": [
                    { "at": 0, "action": { "type": "connect", "player": 1 } },
                    { "at": 0, "action": { "type": "connect", "player": 2 } },
                    { "at": 1, "action": { "type": "select", "player": 2, "object": 1 } },
                    { "at": 4, "action": { "type": "enter", "volume": 1, "actor": { "player": 1 }, "capabilities": 2 } }
                ],
                "expect": {
                    "players": 2,
                    "controllers": [{ "controller": 1, "solves": 1, "guess": ["A"] }],
                    "receivers": [{ "receiver": 1, "triggered": 1, "despawned": true }],
                    "objects": [{ "object": 1, "holder": 2 }]
                }
            }"#,
        );

        let report = run_session_with_paths(&config(), &paths).expect("session");
        assert_eq!(report.room, "tiny");
        assert_eq!(report.latency_ticks, 2);
        assert_eq!(report.transport.commands_lost, 0);
        assert!(report.path.is_file());

        let written = fs::read_to_string(&report.path).expect("read report");
        let value: serde_json::Value = serde_json::from_str(&written).expect("json");
        assert_eq!(value["script"], "walk");
        assert_eq!(value["final_state"]["controllers"][0]["solves"], 1);
    }

    #[test]
    fn unmet_expectation_fails_the_session() {
        let (_temp, paths) = workspace(
            r#"{
                "name": "walk",
                "latency_ticks": 0,
                "events": [
                    { "at": 0, "action": { "type": "connect", "player": 1 } }
                ],
                "expect": { "controllers": [{ "controller": 1, "solves": 1 }] }
            }"#,
        );

        let error = run_session_with_paths(&config(), &paths).expect_err("unsolved");
        match error {
            HostError::Expectation(message) => {
                assert_eq!(message, "controller#1.solves: expected 1, got 0");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!paths.reports_dir().join("walk.json").exists());
    }

    #[test]
    fn partitioned_player_loses_its_select() {
        let (_temp, paths) = workspace(
            r#"{
                "name": "walk",
                "events": [
                    { "at": 0, "action": { "type": "connect", "player": 1 } },
                    { "at": 4, "action": { "type": "partition", "player": 1, "partitioned": true } },
                    { "at": 4, "action": { "type": "send", "player": 1,
                        "command": { "type": "request_select", "player": 1, "object": 1 } } },
                    { "at": 5, "action": { "type": "partition", "player": 1, "partitioned": false } }
                ],
                "expect": { "objects": [{ "object": 1 }] }
            }"#,
        );

        let report = run_session_with_paths(&config(), &paths).expect("session");
        assert_eq!(report.transport.commands_lost, 1);
    }

    #[test]
    fn shipped_scripts_pass_against_the_vault_room() {
        let repo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let temp = TempDir::new().expect("tempdir");
        let paths = AppPaths {
            root: repo.clone(),
            rooms_dir: repo.join("assets").join("rooms"),
            scripts_dir: repo.join("assets").join("scripts"),
            cache_dir: temp.path().to_path_buf(),
        };

        for script in ["vault_walkthrough.json", "vault_wrong_order.json"] {
            let config = HostConfig {
                script: PathBuf::from(script),
                ..HostConfig::default()
            };
            let report = run_session_with_paths(&config, &paths)
                .unwrap_or_else(|err| panic!("{script}: {err}"));
            assert!(report.path.starts_with(temp.path()));
        }
    }

    #[test]
    fn missing_script_is_a_read_error() {
        let (_temp, paths) = workspace(r#"{ "name": "walk", "events": [] }"#);
        let config = HostConfig {
            script: PathBuf::from("absent.json"),
            ..config()
        };
        let error = run_session_with_paths(&config, &paths).expect_err("missing");
        assert!(matches!(error, HostError::ReadFile { .. }));
    }
}
