mod atomic_io;
mod store;
mod xml;

use thiserror::Error;

use crate::classify::{occupant_plan, OccupantPlan, OwnerScope};
use crate::grid::GridCodecError;
use crate::model::{CreatureProfile, MapSize, Position, RegionId, Rotation, Thing};

pub use store::{
    ContentGeneration, RestoreReport, RestoreRequest, SaveReport, SnapshotStore, StorePhase,
};
pub use xml::{parse_snapshot, render_snapshot};

pub const FORMAT_VERSION: u32 = 2;

/// One unloaded region as it lives on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSnapshot {
    pub region: RegionId,
    pub format_version: u32,
    pub abandoned_at_tick: u64,
    /// Absent only in version-1 files.
    pub map_size: Option<MapSize>,
    pub terrain: Option<Vec<u8>>,
    pub roof: Option<Vec<u8>>,
    pub snow: Option<Vec<u8>>,
    pub pollution: Option<Vec<u8>>,
    pub records: Vec<EntityRecord>,
}

impl TileSnapshot {
    pub fn new(region: RegionId, abandoned_at_tick: u64, map_size: MapSize) -> Self {
        Self {
            region,
            format_version: FORMAT_VERSION,
            abandoned_at_tick,
            map_size: Some(map_size),
            terrain: None,
            roof: None,
            snow: None,
            pollution: None,
            records: Vec::new(),
        }
    }

    /// Puts records in the order they are written: by position, then def.
    pub fn sort_records(&mut self) {
        self.records.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.def_name.cmp(&b.def_name))
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub def_name: String,
    pub stuff: Option<String>,
    pub faction: Option<String>,
    pub position: Position,
    pub rotation: Rotation,
    pub hit_points: i32,
    pub rot_progress: Option<f32>,
    /// Present for creatures written inline inside a container.
    pub creature: Option<CreatureProfile>,
    pub contents: Option<Box<EntityRecord>>,
}

impl EntityRecord {
    /// Captures `thing`, with health clamped to its def. Each level of its
    /// occupant chain is written only when the classifier plans it inline,
    /// and always at the container's position.
    pub fn capture(thing: &Thing, owner: &OwnerScope<'_>) -> Self {
        Self::capture_at(thing, owner, thing.position)
    }

    fn capture_at(thing: &Thing, owner: &OwnerScope<'_>, position: Position) -> Self {
        let hit_points = match owner.defs.thing_def(&thing.def_name) {
            Some(def) => def.clamp_hit_points(thing.hit_points),
            None => thing.hit_points.max(1),
        };
        let contents = thing
            .occupant()
            .filter(|occupant| occupant_plan(Some(*occupant), owner) == OccupantPlan::Inline)
            .map(|occupant| Box::new(Self::capture_at(occupant, owner, position)));
        Self {
            def_name: thing.def_name.clone(),
            stuff: thing.stuff.clone(),
            faction: thing.faction.as_ref().map(|f| f.def_name.clone()),
            position,
            rotation: thing.rotation,
            hit_points,
            rot_progress: thing.rot_progress,
            creature: thing.creature_profile(),
            contents,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotFormatError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("root element must be <PersistentMap>, found <{0}>")]
    InvalidRoot(String),
    #[error("unsupported formatVersion '{0}'")]
    UnsupportedVersion(String),
    #[error("missing element <{0}>")]
    MissingElement(&'static str),
    #[error("invalid value '{value}' for <{field}> at line {line}")]
    InvalidValue {
        field: String,
        value: String,
        line: u32,
    },
    #[error("<{field}> is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("content digest missing; the file is incomplete")]
    MissingDigest,
    #[error("content digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },
    #[error("saved map size {saved} does not match region size {region}")]
    SizeMismatch { saved: MapSize, region: MapSize },
    #[error("<{channel}> does not fit the region: {source}")]
    Grid {
        channel: &'static str,
        #[source]
        source: GridCodecError,
    },
}
