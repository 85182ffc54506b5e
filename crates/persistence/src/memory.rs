//! In-memory host used by the demo binary and the tests. It keeps just enough
//! of a world to exercise every seam the store relies on.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::host::{
    LiveObject, LiveObjectKind, ReferenceSource, ReferenceSourceUnavailable, RegionHost,
    ResidentScope,
};
use crate::identity::PersistentIdentity;
use crate::model::{EntityHandle, FactionRef, GridCell, MapSize, RegionId, Thing};
use crate::registry::{CrossScopeRegistry, RelocationRecord};

/// Hands out entity handles shared by the scope and every region opened from
/// it, so a handle is never reused within one world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct HandleAllocator(Rc<Cell<u64>>);

impl HandleAllocator {
    fn starting_at(next: u64) -> Self {
        Self(Rc::new(Cell::new(next.max(1))))
    }

    pub fn next(&self) -> EntityHandle {
        let handle = self.0.get();
        self.0.set(handle.saturating_add(1));
        EntityHandle(handle)
    }

    /// Keeps the counter ahead of handles that came from elsewhere.
    fn observe(&self, handle: EntityHandle) {
        if handle.0 >= self.0.get() {
            self.0.set(handle.0.saturating_add(1));
        }
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl From<u64> for HandleAllocator {
    fn from(next: u64) -> Self {
        Self::starting_at(next)
    }
}

impl From<HandleAllocator> for u64 {
    fn from(allocator: HandleAllocator) -> Self {
        allocator.0.get()
    }
}

#[derive(Debug, Error)]
pub enum WorldSaveError {
    #[error("failed to access world save {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode world save: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse world save {path} at {at}: {source}")]
    Parse {
        path: PathBuf,
        at: String,
        #[source]
        source: serde_json::Error,
    },
}

fn references_available() -> bool {
    true
}

/// The always-resident side of the demo world.
#[derive(Debug, Serialize, Deserialize)]
pub struct MemoryScope {
    persistent_identity: Option<PersistentIdentity>,
    ticks_game: u64,
    factions: Vec<FactionRef>,
    ideologies: Vec<String>,
    world_objects: Vec<String>,
    /// Creatures the world tracks regardless of which regions are loaded.
    world_creatures: Vec<Thing>,
    registry: CrossScopeRegistry,
    handles: HandleAllocator,
    #[serde(skip, default = "references_available")]
    references_available: bool,
}

impl Default for MemoryScope {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScope {
    /// A fresh world with a newly minted identity.
    pub fn new() -> Self {
        Self {
            persistent_identity: Some(PersistentIdentity::mint()),
            ticks_game: 0,
            factions: Vec::new(),
            ideologies: Vec::new(),
            world_objects: Vec::new(),
            world_creatures: Vec::new(),
            registry: CrossScopeRegistry::default(),
            handles: HandleAllocator::default(),
            references_available: true,
        }
    }

    pub fn without_identity() -> Self {
        Self {
            persistent_identity: None,
            ..Self::new()
        }
    }

    pub fn handles(&self) -> &HandleAllocator {
        &self.handles
    }

    pub fn open_region(&self, id: RegionId, size: MapSize) -> MemoryRegion {
        MemoryRegion::new(id, size, self.handles.clone())
    }

    pub fn advance(&mut self, ticks: u64) {
        self.ticks_game = self.ticks_game.saturating_add(ticks);
    }

    pub fn add_faction(&mut self, def_name: &str) -> FactionRef {
        let faction = FactionRef {
            load_id: format!("Faction_{}", self.factions.len() + 1),
            def_name: def_name.to_string(),
        };
        self.factions.push(faction.clone());
        faction
    }

    pub fn add_ideology(&mut self, name: &str) {
        self.ideologies.push(name.to_string());
    }

    pub fn add_world_object(&mut self, name: &str) {
        self.world_objects.push(name.to_string());
    }

    /// Starts tracking a creature world-wide and returns its handle.
    pub fn track(&mut self, creature: Thing) -> EntityHandle {
        self.adopt(creature).handle
    }

    pub fn tracked(&self, handle: EntityHandle) -> Option<&Thing> {
        self.world_creatures.iter().find(|c| c.handle == handle)
    }

    pub fn tracked_mut(&mut self, handle: EntityHandle) -> Option<&mut Thing> {
        self.world_creatures.iter_mut().find(|c| c.handle == handle)
    }

    /// Simulates the host garbage-collecting a world creature.
    pub fn forget_tracked(&mut self, handle: EntityHandle) -> Option<Thing> {
        self.release_tracked(handle)
    }

    pub fn set_references_available(&mut self, available: bool) {
        self.references_available = available;
    }

    pub fn save_to(&self, path: &Path) -> Result<(), WorldSaveError> {
        let json = serde_json::to_string_pretty(self).map_err(WorldSaveError::Encode)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorldSaveError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| WorldSaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "world_saved");
        Ok(())
    }

    /// Loads a world and rebuilds its relocation records, dropping entries
    /// whose creature no longer exists.
    pub fn load_from(path: &Path) -> Result<Self, WorldSaveError> {
        let raw = fs::read_to_string(path).map_err(|source| WorldSaveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut deserializer = serde_json::Deserializer::from_str(&raw);
        let mut scope: Self = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            WorldSaveError::Parse {
                path: path.to_path_buf(),
                at: error.path().to_string(),
                source: error.into_inner(),
            }
        })?;
        for creature in &scope.world_creatures {
            scope.handles.observe(creature.handle);
        }

        let live = scope
            .world_creatures
            .iter()
            .filter(|c| !c.destroyed)
            .map(|c| c.handle)
            .collect::<Vec<_>>();
        let pruned = scope.registry.revalidate_all(|entry| match entry {
            RelocationRecord::ByReference { handle, .. } => live.contains(handle),
            RelocationRecord::ByValue { .. } => true,
        });
        if pruned > 0 {
            warn!(path = %path.display(), pruned, "dangling_relocations_pruned_on_load");
        }
        info!(path = %path.display(), ticks_game = scope.ticks_game, "world_loaded");
        Ok(scope)
    }
}

impl ReferenceSource for MemoryScope {
    fn live_objects(&self) -> Result<Vec<LiveObject>, ReferenceSourceUnavailable> {
        if !self.references_available {
            return Err(ReferenceSourceUnavailable(
                "resident scope does not expose its objects".to_string(),
            ));
        }
        let mut objects = vec![
            LiveObject::new("Game", LiveObjectKind::Game),
            LiveObject::new("GameComponent_Persistence", LiveObjectKind::GameComponent),
            LiveObject::new("World", LiveObjectKind::World),
            LiveObject::new("WorldComponent_TileRecords", LiveObjectKind::WorldComponent),
        ];
        objects.extend(self.factions.iter().map(LiveObject::faction));
        objects.extend(
            self.ideologies
                .iter()
                .map(|name| LiveObject::new(format!("Ideo_{name}"), LiveObjectKind::Ideology)),
        );
        objects.extend(self.world_creatures.iter().map(|creature| {
            LiveObject::new(
                creature.load_id(),
                LiveObjectKind::WorldCreature {
                    alive: !creature.destroyed,
                },
            )
            .with_handle(creature.handle)
        }));
        objects.extend(
            self.world_objects
                .iter()
                .map(|name| LiveObject::new(format!("WorldObject_{name}"), LiveObjectKind::WorldObject)),
        );
        Ok(objects)
    }
}

impl ResidentScope for MemoryScope {
    fn persistent_identity(&self) -> Option<PersistentIdentity> {
        self.persistent_identity
    }

    fn ticks_game(&self) -> u64 {
        self.ticks_game
    }

    fn tracks(&self, handle: EntityHandle) -> bool {
        self.tracked(handle).is_some()
    }

    fn adopt(&mut self, mut thing: Thing) -> &Thing {
        if !thing.handle.is_assigned() {
            thing.handle = self.handles.next();
        }
        thing.spawned = false;
        let idx = match self.world_creatures.iter().position(|c| c.handle == thing.handle) {
            Some(idx) => {
                self.world_creatures[idx] = thing;
                idx
            }
            None => {
                self.world_creatures.push(thing);
                self.world_creatures.len() - 1
            }
        };
        &self.world_creatures[idx]
    }

    fn release_tracked(&mut self, handle: EntityHandle) -> Option<Thing> {
        let idx = self.world_creatures.iter().position(|c| c.handle == handle)?;
        Some(self.world_creatures.remove(idx))
    }

    fn faction_for_def(&self, def_name: &str) -> Option<FactionRef> {
        self.factions.iter().find(|f| f.def_name == def_name).cloned()
    }

    fn registry(&self) -> &CrossScopeRegistry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut CrossScopeRegistry {
        &mut self.registry
    }
}

/// One loaded region of the demo world.
#[derive(Debug)]
pub struct MemoryRegion {
    id: RegionId,
    size: MapSize,
    terrain: Vec<u16>,
    roof: Vec<bool>,
    snow: Vec<u8>,
    pollution: Option<Vec<bool>>,
    things: BTreeMap<EntityHandle, Thing>,
    handles: HandleAllocator,
    suppressed: bool,
    roof_collapse_checks: usize,
    area_revealed_notifications: usize,
    suppressed_side_effects: usize,
}

impl MemoryRegion {
    pub fn new(id: RegionId, size: MapSize, handles: HandleAllocator) -> Self {
        let cells = size.cell_count();
        Self {
            id,
            size,
            terrain: vec![0; cells],
            roof: vec![false; cells],
            snow: vec![0; cells],
            pollution: None,
            things: BTreeMap::new(),
            handles,
            suppressed: false,
            roof_collapse_checks: 0,
            area_revealed_notifications: 0,
            suppressed_side_effects: 0,
        }
    }

    pub fn with_pollution(mut self) -> Self {
        self.pollution = Some(vec![false; self.size.cell_count()]);
        self
    }

    pub fn fill_terrain(&mut self, short_hash: u16) {
        self.terrain.iter_mut().for_each(|cell| *cell = short_hash);
    }

    pub fn things(&self) -> impl Iterator<Item = &Thing> {
        self.things.values()
    }

    pub fn things_named<'a>(&'a self, def_name: &'a str) -> impl Iterator<Item = &'a Thing> + 'a {
        self.things.values().filter(move |t| t.def_name == def_name)
    }

    pub fn roof_collapse_checks(&self) -> usize {
        self.roof_collapse_checks
    }

    pub fn area_revealed_notifications(&self) -> usize {
        self.area_revealed_notifications
    }

    pub fn suppressed_side_effects(&self) -> usize {
        self.suppressed_side_effects
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    fn index(&self, cell: GridCell) -> Option<usize> {
        self.size.index_of(cell)
    }

    fn grid_changed(&mut self, roof_removed: bool) {
        if self.suppressed {
            self.suppressed_side_effects += 1;
            return;
        }
        self.area_revealed_notifications += 1;
        if roof_removed {
            self.roof_collapse_checks += 1;
        }
    }
}

impl ReferenceSource for MemoryRegion {
    fn live_objects(&self) -> Result<Vec<LiveObject>, ReferenceSourceUnavailable> {
        let mut objects = vec![
            LiveObject::new(format!("Map_{}", self.id), LiveObjectKind::Region),
            LiveObject::new(format!("MapComponent_{}", self.id), LiveObjectKind::RegionComponent),
        ];
        for thing in self.things.values() {
            objects.push(
                LiveObject::new(thing.load_id(), LiveObjectKind::RegionThing).with_handle(thing.handle),
            );
            if let Some(occupant) = thing.occupant() {
                objects.push(
                    LiveObject::new(occupant.load_id(), LiveObjectKind::RegionThing)
                        .with_handle(occupant.handle),
                );
            }
        }
        Ok(objects)
    }
}

impl RegionHost for MemoryRegion {
    fn region_id(&self) -> RegionId {
        self.id
    }

    fn size(&self) -> MapSize {
        self.size
    }

    fn terrain(&self, cell: GridCell) -> u16 {
        self.index(cell).map_or(0, |idx| self.terrain[idx])
    }

    fn set_terrain(&mut self, cell: GridCell, short_hash: u16) {
        if let Some(idx) = self.index(cell) {
            self.terrain[idx] = short_hash;
            self.grid_changed(false);
        }
    }

    fn roofed(&self, cell: GridCell) -> bool {
        self.index(cell).is_some_and(|idx| self.roof[idx])
    }

    fn set_roofed(&mut self, cell: GridCell, roofed: bool) {
        if let Some(idx) = self.index(cell) {
            let removed = self.roof[idx] && !roofed;
            self.roof[idx] = roofed;
            self.grid_changed(removed);
        }
    }

    fn snow_depth(&self, cell: GridCell) -> u8 {
        self.index(cell).map_or(0, |idx| self.snow[idx])
    }

    fn set_snow_depth(&mut self, cell: GridCell, depth: u8) {
        if let Some(idx) = self.index(cell) {
            self.snow[idx] = depth;
        }
    }

    fn pollution_enabled(&self) -> bool {
        self.pollution.is_some()
    }

    fn polluted(&self, cell: GridCell) -> bool {
        match (&self.pollution, self.index(cell)) {
            (Some(grid), Some(idx)) => grid[idx],
            _ => false,
        }
    }

    fn set_polluted(&mut self, cell: GridCell, polluted: bool) {
        if let (Some(idx), Some(grid)) = (self.index(cell), self.pollution.as_mut()) {
            grid[idx] = polluted;
        }
    }

    fn thing_handles(&self) -> Vec<EntityHandle> {
        self.things.keys().copied().collect()
    }

    fn thing(&self, handle: EntityHandle) -> Option<&Thing> {
        self.things.get(&handle)
    }

    fn thing_mut(&mut self, handle: EntityHandle) -> Option<&mut Thing> {
        self.things.get_mut(&handle)
    }

    fn spawn(&mut self, mut thing: Thing) -> EntityHandle {
        if thing.handle.is_assigned() && !self.things.contains_key(&thing.handle) {
            self.handles.observe(thing.handle);
        } else {
            thing.handle = self.handles.next();
        }
        thing.spawned = true;
        let handle = thing.handle;
        self.things.insert(handle, thing);
        handle
    }

    fn despawn(&mut self, handle: EntityHandle) -> Option<Thing> {
        let mut thing = self.things.remove(&handle)?;
        thing.spawned = false;
        Some(thing)
    }

    fn set_restore_suppression(&mut self, active: bool) {
        self.suppressed = active;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::model::{CreatureProfile, Position, ThingKind};
    use crate::registry::RelocationCategory;

    fn muffalo() -> Thing {
        Thing::new("Muffalo", ThingKind::Creature(CreatureProfile::default()), 80)
    }

    #[test]
    fn regions_share_the_world_handle_counter() {
        let scope = MemoryScope::new();
        let mut a = scope.open_region(RegionId(1), MapSize::new(2, 2));
        let mut b = scope.open_region(RegionId(2), MapSize::new(2, 2));
        let first = a.spawn(Thing::new("Wall", ThingKind::Structure, 10));
        let second = b.spawn(Thing::new("Wall", ThingKind::Structure, 10));
        assert_ne!(first, second);
        assert!(a.thing(first).is_some_and(|t| t.spawned));
    }

    #[test]
    fn spawn_keeps_free_handles_and_reassigns_taken_ones() {
        let scope = MemoryScope::new();
        let mut region = scope.open_region(RegionId(1), MapSize::new(2, 2));
        let mut wall = Thing::new("Wall", ThingKind::Structure, 10);
        wall.handle = EntityHandle(500);
        assert_eq!(region.spawn(wall.clone()), EntityHandle(500));
        let again = region.spawn(wall);
        assert_ne!(again, EntityHandle(500));
        assert!(scope.handles().next().0 > 500);
    }

    #[test]
    fn suppression_swallows_grid_side_effects() {
        let scope = MemoryScope::new();
        let mut region = scope.open_region(RegionId(1), MapSize::new(1, 1));
        let cell = GridCell { x: 0, y: 0 };
        region.set_roofed(cell, true);
        region.set_roofed(cell, false);
        assert_eq!(region.roof_collapse_checks(), 1);
        region.set_restore_suppression(true);
        region.set_roofed(cell, true);
        region.set_roofed(cell, false);
        assert_eq!(region.roof_collapse_checks(), 1);
        assert_eq!(region.suppressed_side_effects(), 2);
    }

    #[test]
    fn world_save_roundtrip_prunes_dangling_relocations() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("Saves").join("colony.json");
        let mut scope = MemoryScope::new();
        scope.add_faction("PlayerColony");
        scope.advance(4_200);
        let kept = scope.track(muffalo().at(Position::new(1, 1, 0)));
        let gone = scope.track(muffalo());
        let record = scope.registry_mut().get_or_create(RegionId(3));
        record.push(
            RelocationCategory::ResidentCreatures,
            RelocationRecord::ByReference {
                handle: kept,
                load_id: "Thing_Muffalo1".to_string(),
                position: Position::new(1, 1, 0),
            },
        );
        record.push(
            RelocationCategory::ResidentCreatures,
            RelocationRecord::ByReference {
                handle: gone,
                load_id: "Thing_Muffalo2".to_string(),
                position: Position::new(0, 0, 0),
            },
        );
        scope.forget_tracked(gone);
        scope.save_to(&path).expect("save");

        let loaded = MemoryScope::load_from(&path).expect("load");
        assert_eq!(loaded.persistent_identity(), scope.persistent_identity());
        assert_eq!(loaded.ticks_game(), 4_200);
        assert!(loaded.tracks(kept));
        assert_eq!(loaded.registry().get(RegionId(3)).map(|r| r.len()), Some(1));
        assert!(loaded.handles().next().0 > gone.0);
    }

    #[test]
    fn malformed_world_save_reports_json_path() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("broken.json");
        let mut value = serde_json::to_value(MemoryScope::new()).expect("to value");
        value["ticks_game"] = serde_json::json!("soon");
        fs::write(&path, value.to_string()).expect("write");
        match MemoryScope::load_from(&path) {
            Err(WorldSaveError::Parse { at, .. }) => assert_eq!(at, "ticks_game"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unavailable_scope_reports_through_reference_source() {
        let mut scope = MemoryScope::new();
        assert!(scope.live_objects().is_ok());
        scope.set_references_available(false);
        assert!(scope.live_objects().is_err());
    }
}
