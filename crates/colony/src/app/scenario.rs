//! Scripted unload → time passes → reload cycle against the in-memory host.

use std::path::PathBuf;

use persistence::memory::{MemoryRegion, MemoryScope, WorldSaveError};
use persistence::model::{CreatureProfile, FactionRef, GridCell};
use persistence::{
    clean_orphaned_identities, load_def_database, ClimateProfile, ContentGeneration,
    DefCompileError, DefDatabase, HousekeepingError, MapSize, PathsError, PersistenceError,
    PersistencePaths, PersistentIdentity, Position, RegionHost, RegionId, ResidentScope,
    RestoreReport, Rotation, SaveReport, SeasonalClimate, SnapshotStore, Thing, ThingKind,
};
use thiserror::Error;
use tracing::{debug, info};

use super::bootstrap::ColonyConfig;

const HOME_REGION: RegionId = RegionId(1);
const HOME_SIZE: u32 = 12;
const WORLD_SAVE_FILE: &str = "colony.json";
/// Time the player spends in the region before leaving it.
const PLAY_TICKS: u64 = 2_500;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error(transparent)]
    Paths(#[from] PathsError),
    #[error(transparent)]
    Defs(#[from] DefCompileError),
    #[error(transparent)]
    Housekeeping(#[from] HousekeepingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    WorldSave(#[from] WorldSaveError),
    #[error("demo content needs {kind} '{name}' in the def catalog")]
    MissingDemoDef { kind: &'static str, name: &'static str },
    #[error("snapshot for region {0} was not written")]
    SnapshotNotSaved(RegionId),
    #[error("region {0} was suppressed but no restore ran")]
    RestoreMissing(RegionId),
}

#[derive(Debug)]
pub(crate) struct ScenarioSummary {
    pub(crate) identity: PersistentIdentity,
    pub(crate) orphans_removed: usize,
    pub(crate) unload: SaveReport,
    pub(crate) restore: RestoreReport,
    pub(crate) things_after_restore: usize,
    pub(crate) shutdown: SaveReport,
    pub(crate) world_save: PathBuf,
}

pub(crate) fn run_scenario(
    config: &ColonyConfig,
    paths: &PersistencePaths,
) -> Result<ScenarioSummary, ScenarioError> {
    let defs = load_def_database(&config.defs_path)?;
    info!(
        path = %config.defs_path.display(),
        thing_defs = defs.thing_defs().len(),
        "defs_loaded"
    );

    let orphans_removed = clean_orphaned_identities(paths)?.len();
    let world_save = paths.saves_dir().join(WORLD_SAVE_FILE);
    let mut scope = if world_save.is_file() {
        MemoryScope::load_from(&world_save)?
    } else {
        new_world()
    };
    let identity = scope
        .persistent_identity()
        .ok_or(PersistenceError::MissingContext("persistent world identity"))?;
    info!(identity = %identity, ticks_game = scope.ticks_game(), "world_ready");

    let climate = SeasonalClimate::new(ClimateProfile::default());
    let store = SnapshotStore::new(paths.clone(), defs);

    // First visit populates the region; later runs find the shutdown snapshot.
    let (mut region, _) = load_region(&store, &mut scope, &climate)?;
    scope.advance(PLAY_TICKS);
    let unload = store
        .on_before_unload(&mut scope, &mut region)
        .ok_or(ScenarioError::SnapshotNotSaved(HOME_REGION))?;
    drop(region);

    scope.advance(config.elapsed_ticks);
    info!(region = %HOME_REGION, elapsed_ticks = config.elapsed_ticks, "time_passed");

    let (mut region, restore) = load_region(&store, &mut scope, &climate)?;
    let restore = restore.ok_or(ScenarioError::RestoreMissing(HOME_REGION))?;
    let things_after_restore = region.things().count();
    log_region_contents(&region);

    let shutdown = store
        .on_before_unload(&mut scope, &mut region)
        .ok_or(ScenarioError::SnapshotNotSaved(HOME_REGION))?;
    scope.save_to(&world_save)?;

    Ok(ScenarioSummary {
        identity,
        orphans_removed,
        unload,
        restore,
        things_after_restore,
        shutdown,
        world_save,
    })
}

fn new_world() -> MemoryScope {
    let mut scope = MemoryScope::new();
    scope.add_faction("PlayerColony");
    scope.add_faction("OutlanderCivil");
    scope.add_ideology("Starfarers");
    scope.add_world_object("Settlement_Home");
    scope
}

/// Generates the region skeleton, then either populates it or restores it,
/// depending on what the store answers to the structure hook.
fn load_region(
    store: &SnapshotStore,
    scope: &mut MemoryScope,
    climate: &SeasonalClimate,
) -> Result<(MemoryRegion, Option<RestoreReport>), ScenarioError> {
    let defs = store.defs();
    let mut region = scope.open_region(HOME_REGION, MapSize::new(HOME_SIZE, HOME_SIZE));
    region.fill_terrain(terrain_hash(defs, "Soil")?);
    region.spawn(
        Thing::new("SteamGeyser", ThingKind::Structure, max_hit_points(defs, "SteamGeyser")?)
            .at(Position::new(10, 1, 0)),
    );

    match store.on_structure_generated(&*scope, HOME_REGION) {
        ContentGeneration::Proceed => {
            populate(defs, scope, &mut region)?;
            return Ok((region, None));
        }
        ContentGeneration::Suppress => debug!(region = %HOME_REGION, "content_generation_suppressed"),
    }

    let mut report = None;
    for request in store.take_pending_restores() {
        if request.region != region.region_id() {
            continue;
        }
        report = store.restore(scope, &mut region, climate)?;
    }
    Ok((region, report))
}

fn terrain_hash(defs: &DefDatabase, name: &'static str) -> Result<u16, ScenarioError> {
    defs.terrain_by_name(name)
        .map(|def| def.short_hash)
        .ok_or(ScenarioError::MissingDemoDef {
            kind: "terrain",
            name,
        })
}

fn max_hit_points(defs: &DefDatabase, name: &'static str) -> Result<i32, ScenarioError> {
    defs.thing_def(name)
        .map(|def| def.max_hit_points)
        .ok_or(ScenarioError::MissingDemoDef { kind: "thing", name })
}

/// A walled, roofed hut with a cryptosleep casket and loose items, plus a
/// colonist, a wild animal and some dirt outside.
fn populate(
    defs: &DefDatabase,
    scope: &mut MemoryScope,
    region: &mut MemoryRegion,
) -> Result<(), ScenarioError> {
    let sand = terrain_hash(defs, "Sand")?;
    let floor = terrain_hash(defs, "WoodPlankFloor")?;
    let colony = scope
        .faction_for_def("PlayerColony")
        .ok_or(ScenarioError::MissingDemoDef {
            kind: "faction",
            name: "PlayerColony",
        })?;

    for x in 0..HOME_SIZE {
        region.set_terrain(GridCell { x, y: HOME_SIZE - 1 }, sand);
    }
    for y in 2..=6 {
        for x in 2..=6 {
            let cell = GridCell { x, y };
            region.set_roofed(cell, true);
            let edge = x == 2 || x == 6 || y == 2 || y == 6;
            if !edge {
                region.set_terrain(cell, floor);
                continue;
            }
            let position = Position::new(x as i32, y as i32, 0);
            if (x, y) == (4, 2) {
                region.spawn(owned("Door", defs, &colony)?.at(position));
            } else {
                region.spawn(owned("Wall", defs, &colony)?.at(position));
            }
        }
    }

    let sleeper = scope.track(colonist(max_hit_points(defs, "Human")?));
    let mut casket = owned("CryptosleepCasket", defs, &colony)?
        .at(Position::new(3, 4, 0))
        .with_rotation(Rotation::EAST);
    if let Some(mut occupant) = scope.tracked(sleeper).cloned() {
        occupant.spawned = false;
        // The casket was built empty a moment ago.
        let _ = casket.insert_occupant(occupant);
    }
    region.spawn(casket);

    region.spawn(
        Thing::new("Steel", ThingKind::Item, max_hit_points(defs, "Steel")?).at(Position::new(5, 5, 0)),
    );
    region.spawn(
        Thing::new("MealSimple", ThingKind::Item, max_hit_points(defs, "MealSimple")?)
            .at(Position::new(5, 3, 0))
            .with_rot_progress(0.0),
    );
    region.spawn(
        Thing::new("WoodLog", ThingKind::Item, max_hit_points(defs, "WoodLog")?)
            .at(Position::new(9, 9, 0)),
    );
    region.spawn(Thing::new("Filth_Dirt", ThingKind::Filth, 1).at(Position::new(1, 1, 0)));
    region.spawn(colonist(max_hit_points(defs, "Human")?).at(Position::new(8, 3, 0)));
    region.spawn(
        Thing::new(
            "Muffalo",
            ThingKind::Creature(CreatureProfile {
                cross_reference_free: true,
                ..CreatureProfile::default()
            }),
            max_hit_points(defs, "Muffalo")?,
        )
        .at(Position::new(10, 10, 0)),
    );

    info!(region = %region.region_id(), things = region.things().count(), "region_populated");
    Ok(())
}

fn owned(def_name: &'static str, defs: &DefDatabase, faction: &FactionRef) -> Result<Thing, ScenarioError> {
    let kind = if def_name == "CryptosleepCasket" {
        ThingKind::Container { occupant: None }
    } else {
        ThingKind::Structure
    };
    Ok(Thing::new(def_name, kind, max_hit_points(defs, def_name)?).with_faction(faction.clone()))
}

fn colonist(hit_points: i32) -> Thing {
    Thing::new(
        "Human",
        ThingKind::Creature(CreatureProfile {
            player_owned: true,
            humanlike: true,
            ..CreatureProfile::default()
        }),
        hit_points,
    )
}

fn log_region_contents(region: &MemoryRegion) {
    for thing in region.things() {
        debug!(
            thing = %thing.def_name,
            handle = %thing.handle,
            position = %thing.position,
            hit_points = thing.hit_points,
            occupant = thing.occupant().map(|o| o.def_name.as_str()).unwrap_or("-"),
            "region_thing"
        );
    }
    info!(region = %region.region_id(), things = region.things().count(), "region_contents");
}
