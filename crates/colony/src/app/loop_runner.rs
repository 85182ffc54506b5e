use std::process::ExitCode;

use persistence::resolve_persistence_paths;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::scenario::{run_scenario, ScenarioError};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let result = resolve_persistence_paths()
        .map_err(ScenarioError::from)
        .and_then(|paths| run_scenario(&app.config, &paths));
    match result {
        Ok(summary) => {
            info!(
                identity = %summary.identity,
                orphans_removed = summary.orphans_removed,
                saved_records = summary.unload.records,
                relocated = summary.unload.relocated,
                restored = summary.restore.restored,
                pulled_back = summary.restore.pulled_back,
                decayed_away = summary.restore.decayed_away,
                things = summary.things_after_restore,
                shutdown_records = summary.shutdown.records,
                world_save = %summary.world_save.display(),
                "colony_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
