use std::fs;
use std::path::{Path, PathBuf};

use puzzlenet::RoomLayout;
use serde::de::DeserializeOwned;
use tracing::info;

use super::script::SessionScript;
use super::HostError;

/// Relative paths resolve against `base`.
pub(crate) fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub(crate) fn load_room_layout(path: &Path) -> Result<RoomLayout, HostError> {
    let layout: RoomLayout = read_json(path, "room layout")?;
    layout.validate().map_err(|source| HostError::Layout {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        room = %layout.name,
        controllers = layout.controllers.len(),
        objects = layout.objects.len(),
        "room_layout_loaded"
    );
    Ok(layout)
}

pub(crate) fn load_session_script(path: &Path) -> Result<SessionScript, HostError> {
    let script: SessionScript = read_json(path, "session script")?;
    script
        .validate()
        .map_err(|message| HostError::InvalidScript {
            path: path.to_path_buf(),
            message,
        })?;
    info!(
        path = %path.display(),
        script = %script.name,
        events = script.events.len(),
        "session_script_loaded"
    );
    Ok(script)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, HostError> {
    let raw = fs::read_to_string(path).map_err(|source| HostError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json(&raw, what).map_err(|message| HostError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse {what} json: {source}"))
            } else {
                Err(format!("parse {what} json at {path}: {source}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
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
        }]
    }"#;

    #[test]
    fn parse_error_names_the_failing_field() {
        let raw = r#"{ "name": "tiny", "volumes": [{ "id": "one", "accepts": "player" }] }"#;
        let error = parse_json::<RoomLayout>(raw, "room layout").expect_err("bad id");
        assert!(
            error.starts_with("parse room layout json at volumes[0].id:"),
            "{error}"
        );
    }

    #[test]
    fn parse_error_without_path_omits_location() {
        let error = parse_json::<RoomLayout>("not json", "room layout").expect_err("garbage");
        assert!(error.starts_with("parse room layout json: "), "{error}");
    }

    #[test]
    fn layout_with_dangling_reference_is_rejected() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("broken.json");
        let broken = TINY_LAYOUT.replace(r#""receiver": 1"#, r#""receiver": 9"#);
        fs::write(&path, broken).expect("write");

        let error = load_room_layout(&path).expect_err("unknown receiver");
        assert!(matches!(error, HostError::Layout { .. }), "{error}");
    }

    #[test]
    fn loads_valid_layout_from_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("tiny.json");
        fs::write(&path, TINY_LAYOUT).expect("write");

        let layout = load_room_layout(&path).expect("load");
        assert_eq!(layout.name, "tiny");
        assert_eq!(layout.controllers.len(), 1);
    }

    #[test]
    fn missing_file_reports_read_error() {
        let temp = TempDir::new().expect("tempdir");
        let error = load_room_layout(&temp.path().join("absent.json")).expect_err("missing");
        assert!(matches!(error, HostError::ReadFile { .. }));
    }

    #[test]
    fn relative_paths_resolve_under_base() {
        let base = Path::new("/srv/rooms");
        assert_eq!(
            resolve_under(base, Path::new("vault.json")),
            PathBuf::from("/srv/rooms/vault.json")
        );
        assert_eq!(
            resolve_under(base, Path::new("/tmp/other.json")),
            PathBuf::from("/tmp/other.json")
        );
    }
}
