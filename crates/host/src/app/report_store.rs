//! Session reports under `cache/reports/`, one JSON file per script.
//!
//! A report is staged next to its final name and renamed into place, so a
//! reader never sees a half-written file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::HostError;

const STAGING_SUFFIX: &str = "partial";

#[derive(Debug, Clone)]
pub(crate) struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Script names become file stems; anything outside `[A-Za-z0-9_-]` is
    /// replaced so a name can never escape the reports directory.
    pub(crate) fn path_for(&self, script: &str) -> PathBuf {
        let stem: String = script
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        let stem = if stem.is_empty() { "session" } else { stem.as_str() };
        self.dir.join(format!("{stem}.json"))
    }

    pub(crate) fn save<T: Serialize>(
        &self,
        script: &str,
        report: &T,
    ) -> Result<PathBuf, HostError> {
        let path = self.path_for(script);
        let text = serde_json::to_string_pretty(report).map_err(HostError::EncodeReport)?;
        publish(&path, text.as_bytes()).map_err(|source| HostError::WriteReport {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), bytes = text.len(), "session_report_written");
        Ok(path)
    }
}

fn publish(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let staged = path.with_extension(format!("json.{STAGING_SUFFIX}"));
    fs::write(&staged, bytes)?;

    // Rename does not replace an existing target everywhere.
    let swapped = match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => fs::rename(&staged, path),
    };
    if swapped.is_err() {
        let _ = fs::remove_file(&staged);
    }
    swapped
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn rewrites_report_without_leaving_staged_file() {
        let temp = TempDir::new().expect("tempdir");
        let store = ReportStore::new(temp.path().join("reports"));

        let first = store
            .save("walkthrough", &serde_json::json!({ "run": 1 }))
            .expect("first");
        let second = store
            .save("walkthrough", &serde_json::json!({ "run": 2 }))
            .expect("second");

        assert_eq!(first, second);
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&second).expect("read")).expect("json");
        assert_eq!(written["run"], 2);
        assert!(!second.with_extension("json.partial").exists());
    }

    #[test]
    fn script_names_stay_inside_the_reports_dir() {
        let store = ReportStore::new(PathBuf::from("/cache/reports"));
        assert_eq!(
            store.path_for("../etc/vault run"),
            PathBuf::from("/cache/reports/___etc_vault_run.json")
        );
        assert_eq!(store.path_for(""), PathBuf::from("/cache/reports/session.json"));
    }
}
