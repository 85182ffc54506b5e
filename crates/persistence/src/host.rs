//! Seams between the persistence core and the simulation that hosts it.

use std::fmt;

use thiserror::Error;

use crate::identity::PersistentIdentity;
use crate::model::{EntityHandle, FactionRef, GridCell, MapSize, Position, RegionId, Thing};
use crate::registry::CrossScopeRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveObjectKind {
    Game,
    GameComponent,
    World,
    WorldComponent,
    Faction,
    Ideology,
    WorldCreature { alive: bool },
    WorldObject,
    Region,
    RegionComponent,
    RegionThing,
}

impl fmt::Display for LiveObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Game => "game",
            Self::GameComponent => "game_component",
            Self::World => "world",
            Self::WorldComponent => "world_component",
            Self::Faction => "faction",
            Self::Ideology => "ideology",
            Self::WorldCreature { alive: true } => "world_creature",
            Self::WorldCreature { alive: false } => "world_creature_dead",
            Self::WorldObject => "world_object",
            Self::Region => "region",
            Self::RegionComponent => "region_component",
            Self::RegionThing => "region_thing",
        };
        f.write_str(label)
    }
}

/// An object that is already alive in memory and may be the target of a
/// reference from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveObject {
    pub load_id: String,
    pub kind: LiveObjectKind,
    pub handle: Option<EntityHandle>,
    /// Set for factions: the def the faction instance was made from.
    pub faction_def: Option<String>,
}

impl LiveObject {
    pub fn new(load_id: impl Into<String>, kind: LiveObjectKind) -> Self {
        Self {
            load_id: load_id.into(),
            kind,
            handle: None,
            faction_def: None,
        }
    }

    pub fn with_handle(mut self, handle: EntityHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn faction(faction: &FactionRef) -> Self {
        Self {
            load_id: faction.load_id.clone(),
            kind: LiveObjectKind::Faction,
            handle: None,
            faction_def: Some(faction.def_name.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReferenceSourceUnavailable(pub String);

/// Read-only view over the live objects a scope owns. Implementors must not
/// mutate anything while enumerating.
pub trait ReferenceSource {
    fn live_objects(&self) -> Result<Vec<LiveObject>, ReferenceSourceUnavailable>;
}

/// One loaded region of the host simulation.
pub trait RegionHost: ReferenceSource {
    fn region_id(&self) -> RegionId;
    fn size(&self) -> MapSize;

    fn terrain(&self, cell: GridCell) -> u16;
    fn set_terrain(&mut self, cell: GridCell, short_hash: u16);
    fn roofed(&self, cell: GridCell) -> bool;
    fn set_roofed(&mut self, cell: GridCell, roofed: bool);
    fn snow_depth(&self, cell: GridCell) -> u8;
    fn set_snow_depth(&mut self, cell: GridCell, depth: u8);
    /// `false` when the pollution layer is not part of this world.
    fn pollution_enabled(&self) -> bool;
    fn polluted(&self, cell: GridCell) -> bool;
    fn set_polluted(&mut self, cell: GridCell, polluted: bool);

    fn thing_handles(&self) -> Vec<EntityHandle>;
    fn thing(&self, handle: EntityHandle) -> Option<&Thing>;
    fn thing_mut(&mut self, handle: EntityHandle) -> Option<&mut Thing>;
    /// Places `thing` in the region, assigning a fresh handle when it carries
    /// none, and returns the handle it lives under.
    fn spawn(&mut self, thing: Thing) -> EntityHandle;
    fn despawn(&mut self, handle: EntityHandle) -> Option<Thing>;

    /// While active, roof-collapse checks and area-revealed notifications are
    /// suppressed.
    fn set_restore_suppression(&mut self, active: bool);

    fn roofed_at(&self, position: Position) -> bool {
        position
            .cell()
            .filter(|cell| self.size().index_of(*cell).is_some())
            .is_some_and(|cell| self.roofed(cell))
    }
}

/// The always-resident scope: outlives every region and travels with the
/// world's own save.
pub trait ResidentScope: ReferenceSource {
    fn persistent_identity(&self) -> Option<PersistentIdentity>;
    fn ticks_game(&self) -> u64;

    fn tracks(&self, handle: EntityHandle) -> bool;
    /// Takes ownership of a creature relocated by reference and returns it
    /// as tracked, with a handle assigned.
    fn adopt(&mut self, thing: Thing) -> &Thing;
    /// Hands a tracked creature back so it can be placed in a region again.
    fn release_tracked(&mut self, handle: EntityHandle) -> Option<Thing>;
    /// Host-side resolver used when the reference table has no match.
    fn faction_for_def(&self, def_name: &str) -> Option<FactionRef>;

    fn registry(&self) -> &CrossScopeRegistry;
    fn registry_mut(&mut self) -> &mut CrossScopeRegistry;
}

/// Environmental sampling used by offline decay.
pub trait Climate {
    /// Degrees Celsius from the seasonal cycle alone.
    fn seasonal_temperature(&self, tick: u64, region: RegionId) -> f32;
    /// Diurnal offset added on top of the seasonal temperature.
    fn sun_cycle_offset(&self, tick: u64, region: RegionId) -> f32;
    /// Annual rainfall in millimetres.
    fn rainfall(&self, region: RegionId) -> f32;

    fn outdoor_temperature(&self, tick: u64, region: RegionId) -> f32 {
        self.seasonal_temperature(tick, region) + self.sun_cycle_offset(tick, region)
    }
}
