use std::path::PathBuf;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const ELAPSED_TICKS_ENV_VAR: &str = "COLONY_ELAPSED_TICKS";
const DEFS_ENV_VAR: &str = "COLONY_DEFS";
const DEFAULT_DEFS_PATH: &str = "assets/base/defs.xml";
/// A quarter of a year.
const DEFAULT_ELAPSED_TICKS: u64 = 900_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColonyConfig {
    pub(crate) defs_path: PathBuf,
    /// How long the demo region stays unloaded between unload and reload.
    pub(crate) elapsed_ticks: u64,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            defs_path: PathBuf::from(DEFAULT_DEFS_PATH),
            elapsed_ticks: DEFAULT_ELAPSED_TICKS,
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: ColonyConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Colony Startup ===");

    let config = ColonyConfig {
        defs_path: parse_defs_path(std::env::var(DEFS_ENV_VAR).ok()),
        elapsed_ticks: parse_elapsed_ticks(std::env::var(ELAPSED_TICKS_ENV_VAR).ok()),
    };
    info!(
        defs = %config.defs_path.display(),
        elapsed_ticks = config.elapsed_ticks,
        "colony_config"
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

fn parse_defs_path(raw: Option<String>) -> PathBuf {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEFS_PATH))
}

fn parse_elapsed_ticks(raw: Option<String>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_ELAPSED_TICKS;
    };
    match raw.trim().replace('_', "").parse::<u64>() {
        Ok(ticks) => ticks,
        Err(_) => {
            warn!(
                var = ELAPSED_TICKS_ENV_VAR,
                value = %raw,
                default = DEFAULT_ELAPSED_TICKS,
                "invalid_elapsed_ticks; using default"
            );
            DEFAULT_ELAPSED_TICKS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_ticks_accept_underscores_and_fall_back_on_garbage() {
        assert_eq!(parse_elapsed_ticks(None), DEFAULT_ELAPSED_TICKS);
        assert_eq!(parse_elapsed_ticks(Some(" 60_000 ".to_string())), 60_000);
        assert_eq!(parse_elapsed_ticks(Some("soon".to_string())), DEFAULT_ELAPSED_TICKS);
        assert_eq!(parse_elapsed_ticks(Some("-5".to_string())), DEFAULT_ELAPSED_TICKS);
    }

    #[test]
    fn blank_defs_path_uses_bundled_catalog() {
        assert_eq!(parse_defs_path(None), PathBuf::from(DEFAULT_DEFS_PATH));
        assert_eq!(parse_defs_path(Some("  ".to_string())), PathBuf::from(DEFAULT_DEFS_PATH));
        assert_eq!(
            parse_defs_path(Some("mods/defs.xml".to_string())),
            PathBuf::from("mods/defs.xml")
        );
    }
}
