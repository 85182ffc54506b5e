use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod classify;
pub mod climate;
pub mod decay;
pub mod defs;
mod error;
pub mod grid;
pub mod host;
pub mod housekeeping;
mod identity;
pub mod memory;
pub mod model;
pub mod references;
pub mod registry;
pub mod snapshot;

pub use classify::{classify, relocated_occupant, Disposition, OccupantPlan, OwnerScope};
pub use climate::{ClimateProfile, SeasonalClimate};
pub use decay::{DecayContext, DecayOutcome, OfflineDecaySimulator};
pub use defs::{load_def_database, DefCompileError, DefDatabase};
pub use error::PersistenceError;
pub use grid::{decode_grid, encode_grid, CellWidth, GridCodecError};
pub use host::{Climate, LiveObject, LiveObjectKind, ReferenceSource, RegionHost, ResidentScope};
pub use housekeeping::{clean_orphaned_identities, find_orphaned_identities, HousekeepingError};
pub use identity::PersistentIdentity;
pub use model::{EntityHandle, MapSize, Position, RegionId, Rotation, Thing, ThingKind};
pub use references::{inject_live_references, ReferenceTable};
pub use registry::{CrossScopeRegistry, RelocationCategory, RelocationRecord, TileRecord};
pub use snapshot::{
    ContentGeneration, RestoreReport, SaveReport, SnapshotStore, StorePhase, TileSnapshot,
};

pub const SAVE_ROOT_ENV_VAR: &str = "PERSISTENT_MAPS_SAVE_ROOT";
const MAPS_DIR: &str = "PersistentMaps";
const SAVES_DIR: &str = "Saves";

/// On-disk layout under the save-data root:
/// `PersistentMaps/<identity>/Tile_<region>.xml` next to the host's `Saves/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistencePaths {
    pub save_data_root: PathBuf,
}

impl PersistencePaths {
    pub fn new(save_data_root: impl Into<PathBuf>) -> Self {
        Self {
            save_data_root: save_data_root.into(),
        }
    }

    pub fn maps_root(&self) -> PathBuf {
        self.save_data_root.join(MAPS_DIR)
    }

    pub fn saves_dir(&self) -> PathBuf {
        self.save_data_root.join(SAVES_DIR)
    }

    pub fn identity_dir(&self, identity: PersistentIdentity) -> PathBuf {
        self.maps_root().join(identity.to_string())
    }

    pub fn snapshot_path(&self, identity: PersistentIdentity, region: RegionId) -> PathBuf {
        self.identity_dir(identity).join(format!("Tile_{region}.xml"))
    }
}

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("{var} must not be empty")]
    EmptyRoot { var: &'static str },
    #[error("failed to resolve current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

/// Save-data root from `PERSISTENT_MAPS_SAVE_ROOT`, falling back to
/// `./save_data` under the working directory.
pub fn resolve_persistence_paths() -> Result<PersistencePaths, PathsError> {
    match env::var(SAVE_ROOT_ENV_VAR) {
        Ok(value) if value.trim().is_empty() => Err(PathsError::EmptyRoot {
            var: SAVE_ROOT_ENV_VAR,
        }),
        Ok(value) => Ok(PersistencePaths::new(absolute(Path::new(value.trim()))?)),
        Err(env::VarError::NotPresent) => {
            let cwd = env::current_dir().map_err(PathsError::CurrentDir)?;
            Ok(PersistencePaths::new(cwd.join("save_data")))
        }
        Err(source) => Err(PathsError::EnvVar {
            var: SAVE_ROOT_ENV_VAR,
            source,
        }),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, PathsError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().map_err(PathsError::CurrentDir)?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_path_is_namespaced_by_identity() {
        let paths = PersistencePaths::new("/data");
        let identity =
            PersistentIdentity::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").expect("identity");
        assert_eq!(
            paths.snapshot_path(identity, RegionId(42)),
            PathBuf::from("/data/PersistentMaps/67e55044-10b1-426f-9247-bb680e5fe0c8/Tile_42.xml")
        );
        assert_eq!(paths.saves_dir(), PathBuf::from("/data/Saves"));
    }
}
