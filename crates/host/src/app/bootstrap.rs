use std::env;
use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub(crate) const LAYOUT_ENV_VAR: &str = "PUZZLENET_LAYOUT";
pub(crate) const SCRIPT_ENV_VAR: &str = "PUZZLENET_SCRIPT";
pub(crate) const LATENCY_ENV_VAR: &str = "PUZZLENET_LATENCY_TICKS";

pub(crate) const DEFAULT_LAYOUT_FILE: &str = "vault.json";
pub(crate) const DEFAULT_SCRIPT_FILE: &str = "vault_walkthrough.json";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HostConfig {
    /// Absolute, or relative to the rooms directory.
    pub(crate) layout: PathBuf,
    /// Absolute, or relative to the scripts directory.
    pub(crate) script: PathBuf,
    pub(crate) latency_ticks: u64,
    pub(crate) settle_ticks: u64,
    pub(crate) target_tps: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            layout: PathBuf::from(DEFAULT_LAYOUT_FILE),
            script: PathBuf::from(DEFAULT_SCRIPT_FILE),
            latency_ticks: 2,
            settle_ticks: 256,
            target_tps: 60,
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: HostConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== puzzlenet host startup ===");

    let defaults = HostConfig::default();
    let config = HostConfig {
        layout: env_path(LAYOUT_ENV_VAR).unwrap_or(defaults.layout),
        script: env_path(SCRIPT_ENV_VAR).unwrap_or(defaults.script),
        latency_ticks: parse_latency(env::var(LATENCY_ENV_VAR).ok().as_deref())
            .unwrap_or(defaults.latency_ticks),
        ..defaults
    };
    info!(
        layout = %config.layout.display(),
        script = %config.script.display(),
        latency_ticks = config.latency_ticks,
        "host_config_resolved"
    );

    AppWiring { config }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn parse_latency(raw: Option<&str>) -> Option<u64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<u64>() {
        Ok(ticks) => Some(ticks),
        Err(error) => {
            warn!(var = LATENCY_ENV_VAR, value = raw, error = %error, "env_value_ignored");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_parsing_ignores_blank_and_garbage() {
        assert_eq!(parse_latency(None), None);
        assert_eq!(parse_latency(Some("  ")), None);
        assert_eq!(parse_latency(Some("three")), None);
        assert_eq!(parse_latency(Some(" 3 ")), Some(3));
    }
}
