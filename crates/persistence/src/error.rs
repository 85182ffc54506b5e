use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::grid::GridCodecError;
use crate::model::RegionId;
use crate::snapshot::{SnapshotFormatError, StorePhase};

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Snapshot file unreadable, unparseable or inconsistent with the region.
    #[error("snapshot {path} is unusable: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: SnapshotFormatError,
    },
    #[error("unknown {kind} identifier '{name}'")]
    UnknownIdentifier { kind: &'static str, name: String },
    #[error("missing context: {0}")]
    MissingContext(&'static str),
    #[error("live reference source unavailable: {0}")]
    ReferenceSourceUnavailable(String),
    #[error("snapshot i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("grid encoding failed for region {region}: {source}")]
    Grid {
        region: RegionId,
        #[source]
        source: GridCodecError,
    },
    #[error("snapshot store is busy ({current}); refused {requested}")]
    Busy {
        current: StorePhase,
        requested: StorePhase,
    },
}
