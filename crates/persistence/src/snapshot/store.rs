use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use super::atomic_io::write_text_atomic;
use super::xml::{parse_snapshot, render_snapshot};
use super::{EntityRecord, SnapshotFormatError, TileSnapshot};
use crate::classify::{classify, relocated_occupant, Disposition, OwnerScope};
use crate::decay::{DecayContext, OfflineDecaySimulator};
use crate::defs::{DefDatabase, ThingCategory, ThingDef};
use crate::error::PersistenceError;
use crate::grid::{decode_values, encode_grid, CellWidth};
use crate::host::{Climate, ReferenceSource, RegionHost, ResidentScope};
use crate::identity::PersistentIdentity;
use crate::model::{EntityHandle, MapSize, RegionId, Thing, ThingKind};
use crate::references::{inject_live_references, ReferenceTable};
use crate::registry::{RelocationCategory, RelocationRecord, TileRecord};
use crate::PersistencePaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Idle,
    Saving(RegionId),
    Restoring(RegionId),
}

impl fmt::Display for StorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Saving(region) => write!(f, "saving region {region}"),
            Self::Restoring(region) => write!(f, "restoring region {region}"),
        }
    }
}

/// Answer to the host after a region's structural skeleton was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentGeneration {
    /// No snapshot: populate the region as usual.
    Proceed,
    /// A snapshot exists and a restore was queued; skip content population.
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreRequest {
    pub region: RegionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub records: usize,
    pub relocated: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub path: PathBuf,
    pub elapsed_ticks: u64,
    pub cleared: usize,
    pub restored: usize,
    pub skipped: usize,
    pub pulled_back: usize,
    pub retained: usize,
    pub pruned: usize,
    pub decayed_away: usize,
    pub unknown_terrain_cells: usize,
    pub degraded_references: bool,
}

/// Saves regions on unload and restores them once their skeleton exists
/// again. One operation at a time; a nested request is refused with `Busy`.
pub struct SnapshotStore {
    paths: PersistencePaths,
    defs: DefDatabase,
    phase: Cell<StorePhase>,
    pending: RefCell<VecDeque<RestoreRequest>>,
}

struct PhaseGuard<'a> {
    phase: &'a Cell<StorePhase>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.phase.set(StorePhase::Idle);
    }
}

/// Keeps restore suppression on for as long as it lives.
struct SuppressedRegion<'a, R: RegionHost> {
    region: &'a mut R,
}

impl<'a, R: RegionHost> SuppressedRegion<'a, R> {
    fn new(region: &'a mut R) -> Self {
        region.set_restore_suppression(true);
        Self { region }
    }
}

impl<R: RegionHost> Deref for SuppressedRegion<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.region
    }
}

impl<R: RegionHost> DerefMut for SuppressedRegion<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.region
    }
}

impl<R: RegionHost> Drop for SuppressedRegion<'_, R> {
    fn drop(&mut self) {
        self.region.set_restore_suppression(false);
    }
}

enum PlannedMove {
    Whole {
        handle: EntityHandle,
        category: RelocationCategory,
        by_value: bool,
    },
    /// The occupant `depth` levels down inside `container`.
    Occupant {
        container: EntityHandle,
        depth: usize,
        category: RelocationCategory,
    },
}

/// Grids decoded and checked against the region before anything is applied.
struct DecodedGrids {
    terrain: Option<Vec<u16>>,
    roof: Option<Vec<u16>>,
    snow: Option<Vec<u16>>,
    pollution: Option<Vec<u16>>,
}

impl SnapshotStore {
    pub fn new(paths: PersistencePaths, defs: DefDatabase) -> Self {
        Self {
            paths,
            defs,
            phase: Cell::new(StorePhase::Idle),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    pub fn defs(&self) -> &DefDatabase {
        &self.defs
    }

    pub fn paths(&self) -> &PersistencePaths {
        &self.paths
    }

    pub fn phase(&self) -> StorePhase {
        self.phase.get()
    }

    pub fn is_restoring(&self) -> bool {
        matches!(self.phase.get(), StorePhase::Restoring(_))
    }

    pub fn snapshot_exists(&self, identity: PersistentIdentity, region: RegionId) -> bool {
        self.paths.snapshot_path(identity, region).is_file()
    }

    fn enter(&self, requested: StorePhase) -> Result<PhaseGuard<'_>, PersistenceError> {
        let current = self.phase.get();
        if current != StorePhase::Idle {
            return Err(PersistenceError::Busy { current, requested });
        }
        self.phase.set(requested);
        Ok(PhaseGuard { phase: &self.phase })
    }

    /// Pre-unload hook. Failures are logged and swallowed.
    pub fn on_before_unload<S, R>(&self, scope: &mut S, region: &mut R) -> Option<SaveReport>
    where
        S: ResidentScope,
        R: RegionHost,
    {
        match self.save(scope, region) {
            Ok(report) => Some(report),
            Err(err) => {
                error!(region = %region.region_id(), error = %err, "snapshot_save_failed");
                None
            }
        }
    }

    /// Post-structure hook: vetoes content generation and queues a restore
    /// when a snapshot exists for the region.
    pub fn on_structure_generated<S>(&self, scope: &S, region: RegionId) -> ContentGeneration
    where
        S: ResidentScope,
    {
        let Some(identity) = scope.persistent_identity() else {
            warn!(region = %region, "structure_generated_without_identity");
            return ContentGeneration::Proceed;
        };
        if !self.snapshot_exists(identity, region) {
            return ContentGeneration::Proceed;
        }
        let mut pending = self.pending.borrow_mut();
        if !pending.iter().any(|request| request.region == region) {
            pending.push_back(RestoreRequest { region });
        }
        debug!(region = %region, queued = pending.len(), "restore_queued");
        ContentGeneration::Suppress
    }

    /// Drains the queued restores. The host calls this once its structural
    /// batch has fully settled.
    pub fn take_pending_restores(&self) -> Vec<RestoreRequest> {
        self.pending.borrow_mut().drain(..).collect()
    }

    pub fn save<S, R>(&self, scope: &mut S, region: &mut R) -> Result<SaveReport, PersistenceError>
    where
        S: ResidentScope,
        R: RegionHost,
    {
        let region_id = region.region_id();
        let _guard = self.enter(StorePhase::Saving(region_id))?;
        let identity = scope
            .persistent_identity()
            .ok_or(PersistenceError::MissingContext("persistent world identity"))?;
        let path = self.paths.snapshot_path(identity, region_id);

        let mut snapshot = TileSnapshot::new(region_id, scope.ticks_game(), region.size());
        self.encode_grids(&*region, &mut snapshot)?;

        let mut moves = Vec::<PlannedMove>::new();
        let mut discarded = 0usize;
        {
            let owner = OwnerScope::new(&self.defs, |handle| scope.tracks(handle));
            for handle in region.thing_handles() {
                let Some(thing) = region.thing(handle) else {
                    continue;
                };
                match classify(thing, &owner) {
                    Disposition::Serialize { .. } => {
                        snapshot.records.push(EntityRecord::capture(thing, &owner));
                        if let Some((depth, category)) = relocated_occupant(thing, &owner) {
                            moves.push(PlannedMove::Occupant {
                                container: handle,
                                depth,
                                category,
                            });
                        }
                    }
                    Disposition::RelocateByReference(category) => moves.push(PlannedMove::Whole {
                        handle,
                        category,
                        by_value: false,
                    }),
                    Disposition::RelocateByValue(category) => moves.push(PlannedMove::Whole {
                        handle,
                        category,
                        by_value: true,
                    }),
                    Disposition::Discard(reason) => {
                        debug!(thing = %thing.def_name, handle = %handle, reason = %reason, "thing_discarded");
                        discarded += 1;
                    }
                }
            }
        }
        snapshot.sort_records();

        write_text_atomic(&path, &render_snapshot(&snapshot)).map_err(|source| {
            PersistenceError::Io {
                path: path.clone(),
                source,
            }
        })?;

        let relocated = apply_moves(scope, region, moves);
        info!(
            region = %region_id,
            path = %path.display(),
            records = snapshot.records.len(),
            relocated,
            discarded,
            abandoned_at_tick = snapshot.abandoned_at_tick,
            "snapshot_saved"
        );
        Ok(SaveReport {
            path,
            records: snapshot.records.len(),
            relocated,
            discarded,
        })
    }

    fn encode_grids<R: RegionHost>(
        &self,
        region: &R,
        snapshot: &mut TileSnapshot,
    ) -> Result<(), PersistenceError> {
        let size = region.size();
        let region_id = region.region_id();
        let grid_err = |source| PersistenceError::Grid {
            region: region_id,
            source,
        };
        snapshot.terrain =
            Some(encode_grid(size, CellWidth::Short, |cell| region.terrain(cell)).map_err(grid_err)?);
        snapshot.roof = Some(
            encode_grid(size, CellWidth::Byte, |cell| u16::from(region.roofed(cell)))
                .map_err(grid_err)?,
        );
        snapshot.snow = Some(
            encode_grid(size, CellWidth::Byte, |cell| u16::from(region.snow_depth(cell)))
                .map_err(grid_err)?,
        );
        if region.pollution_enabled() {
            snapshot.pollution = Some(
                encode_grid(size, CellWidth::Byte, |cell| u16::from(region.polluted(cell)))
                    .map_err(grid_err)?,
            );
        }
        Ok(())
    }

    /// Restores a region from its snapshot. `Ok(None)` when there is nothing
    /// to restore. A format error leaves the region untouched.
    pub fn restore<S, R, C>(
        &self,
        scope: &mut S,
        region: &mut R,
        climate: &C,
    ) -> Result<Option<RestoreReport>, PersistenceError>
    where
        S: ResidentScope,
        R: RegionHost,
        C: Climate + ?Sized,
    {
        let region_id = region.region_id();
        let _guard = self.enter(StorePhase::Restoring(region_id))?;
        let identity = scope
            .persistent_identity()
            .ok_or(PersistenceError::MissingContext("persistent world identity"))?;
        let path = self.paths.snapshot_path(identity, region_id);
        if !path.is_file() {
            debug!(region = %region_id, path = %path.display(), "no_snapshot_to_restore");
            return Ok(None);
        }

        let table = {
            let sources: [&dyn ReferenceSource; 2] = [&*scope, &*region];
            inject_live_references(&sources)
        };

        let raw = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        let format_err = |source| PersistenceError::Format {
            path: path.clone(),
            source,
        };
        let snapshot = parse_snapshot(&raw, region_id).map_err(format_err)?;
        let grids = decode_grids(&snapshot, region.size()).map_err(format_err)?;

        let now = scope.ticks_game();
        let elapsed_ticks = match now.checked_sub(snapshot.abandoned_at_tick) {
            Some(elapsed) => elapsed,
            None => {
                warn!(
                    region = %region_id,
                    now,
                    abandoned_at_tick = snapshot.abandoned_at_tick,
                    "clock_behind_snapshot; skipping offline decay"
                );
                0
            }
        };
        let mut report = RestoreReport {
            path: path.clone(),
            elapsed_ticks,
            degraded_references: table.is_degraded(),
            ..RestoreReport::default()
        };

        let mut region = SuppressedRegion::new(region);
        report.unknown_terrain_cells = self.apply_grids(&mut *region, &grids);
        report.cleared = self.clear_reconstructible(&mut *region);

        let mut restored = Vec::<EntityHandle>::new();
        for record in &snapshot.records {
            match self.rebuild(record, &table, &*scope) {
                Ok(thing) if region.size().contains(thing.position) => {
                    restored.push(region.spawn(thing));
                }
                Ok(thing) => {
                    warn!(thing = %thing.def_name, position = %thing.position, "saved_thing_out_of_bounds");
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(region = %region_id, error = %err, "saved_thing_skipped");
                    report.skipped += 1;
                }
            }
        }
        report.restored = restored.len();

        let simulator = OfflineDecaySimulator::new(climate);
        let rainfall = climate.rainfall(region_id);
        for handle in restored {
            let roofed = match region.thing(handle) {
                Some(thing) => region.roofed_at(thing.position),
                None => continue,
            };
            let Some(thing) = region.thing_mut(handle) else {
                continue;
            };
            let context = DecayContext {
                region: region_id,
                start_tick: snapshot.abandoned_at_tick,
                elapsed_ticks,
                rainfall,
                roofed,
            };
            let destroyed = match self.defs.thing_def(&thing.def_name) {
                Some(def) => simulator.apply(thing, def, &context).destroyed,
                None => false,
            };
            if destroyed {
                region.despawn(handle);
                report.decayed_away += 1;
                continue;
            }
            report.decayed_away += self.decay_contents(&simulator, thing, &context);
        }

        self.pull_back(scope, &mut *region, &table, &mut report);
        drop(region);

        info!(
            region = %region_id,
            path = %path.display(),
            restored = report.restored,
            skipped = report.skipped,
            pulled_back = report.pulled_back,
            retained = report.retained,
            pruned = report.pruned,
            decayed_away = report.decayed_away,
            elapsed_ticks,
            "snapshot_restored"
        );
        Ok(Some(report))
    }

    /// Deletes a region's snapshot for good and releases its relocation
    /// record. Entries still in the record stay with the resident scope.
    pub fn forget_region<S: ResidentScope>(
        &self,
        scope: &mut S,
        region: RegionId,
    ) -> Result<Option<TileRecord>, PersistenceError> {
        let identity = scope
            .persistent_identity()
            .ok_or(PersistenceError::MissingContext("persistent world identity"))?;
        let path = self.paths.snapshot_path(identity, region);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(PersistenceError::Io { path, source }),
        }
        let released = scope.registry_mut().release(region);
        info!(region = %region, path = %path.display(), "region_forgotten");
        Ok(released)
    }

    fn apply_grids<R: RegionHost>(&self, region: &mut R, grids: &DecodedGrids) -> usize {
        let size = region.size();
        let mut unknown_terrain = 0usize;
        for (idx, cell) in size.cells().enumerate() {
            if let Some(value) = grids.terrain.as_ref().and_then(|values| values.get(idx)) {
                if self.defs.terrain_by_hash(*value).is_some() {
                    region.set_terrain(cell, *value);
                } else {
                    unknown_terrain += 1;
                }
            }
            if let Some(value) = grids.roof.as_ref().and_then(|values| values.get(idx)) {
                region.set_roofed(cell, *value != 0);
            }
            if let Some(value) = grids.snow.as_ref().and_then(|values| values.get(idx)) {
                region.set_snow_depth(cell, u8::try_from(*value).unwrap_or(u8::MAX));
            }
            if region.pollution_enabled() {
                if let Some(value) = grids.pollution.as_ref().and_then(|values| values.get(idx)) {
                    region.set_polluted(cell, *value == 1);
                }
            }
        }
        if unknown_terrain > 0 {
            warn!(
                region = %region.region_id(),
                cells = unknown_terrain,
                "unknown_terrain_left_as_generated"
            );
        }
        unknown_terrain
    }

    /// Removes whatever the host placed that a snapshot record could stand
    /// for, so restoring never doubles a thing.
    fn clear_reconstructible<R: RegionHost>(&self, region: &mut R) -> usize {
        let doomed = region
            .thing_handles()
            .into_iter()
            .filter(|handle| {
                region.thing(*handle).is_some_and(|thing| {
                    matches!(
                        thing.kind,
                        ThingKind::Structure | ThingKind::Item | ThingKind::Container { .. }
                    ) && self
                        .defs
                        .thing_def(&thing.def_name)
                        .is_some_and(|def| def.destroyable)
                })
            })
            .collect::<Vec<_>>();
        for handle in &doomed {
            region.despawn(*handle);
        }
        doomed.len()
    }

    fn rebuild<S: ResidentScope>(
        &self,
        record: &EntityRecord,
        table: &ReferenceTable,
        scope: &S,
    ) -> Result<Thing, PersistenceError> {
        let def = self.known_thing_def(&record.def_name, "thing")?;
        if let Some(stuff) = &record.stuff {
            self.known_thing_def(stuff, "material")?;
        }
        let kind = match def.category {
            ThingCategory::Structure => ThingKind::Structure,
            ThingCategory::Item => ThingKind::Item,
            ThingCategory::Container => ThingKind::Container {
                occupant: self.rebuild_contents(record, table, scope),
            },
            ThingCategory::Creature => ThingKind::Creature(record.creature.unwrap_or_default()),
            other => {
                return Err(PersistenceError::UnknownIdentifier {
                    kind: "restorable category",
                    name: format!("{other:?}"),
                })
            }
        };

        let mut thing = Thing::new(def.def_name.clone(), kind, def.clamp_hit_points(record.hit_points))
            .at(record.position)
            .with_rotation(record.rotation);
        thing.stuff = record.stuff.clone();
        thing.rot_progress = record.rot_progress;
        if let Some(faction_def) = &record.faction {
            thing.faction = table
                .faction_for_def(faction_def)
                .or_else(|| scope.faction_for_def(faction_def));
            if thing.faction.is_none() {
                warn!(thing = %def.def_name, faction = %faction_def, "faction_unresolved; restoring unowned");
            }
        }
        Ok(thing)
    }

    fn rebuild_contents<S: ResidentScope>(
        &self,
        record: &EntityRecord,
        table: &ReferenceTable,
        scope: &S,
    ) -> Option<Box<Thing>> {
        let contents = record.contents.as_deref()?;
        match self.rebuild(contents, table, scope) {
            Ok(mut occupant) => {
                occupant.position = record.position;
                Some(Box::new(occupant))
            }
            Err(err) => {
                warn!(container = %record.def_name, error = %err, "container_contents_dropped");
                None
            }
        }
    }

    /// Decays each level of a container chain as sheltered. A level that
    /// decays away is removed together with anything inside it.
    fn decay_contents<C: Climate + ?Sized>(
        &self,
        simulator: &OfflineDecaySimulator<'_, C>,
        holder: &mut Thing,
        context: &DecayContext,
    ) -> usize {
        let container = holder.def_name.clone();
        let Some(occupant) = holder.occupant_mut() else {
            return 0;
        };
        let interior = DecayContext {
            roofed: true,
            ..*context
        };
        let destroyed = match self.defs.thing_def(&occupant.def_name) {
            Some(def) => simulator.apply(occupant, def, &interior).destroyed,
            None => false,
        };
        if destroyed {
            debug!(container = %container, thing = %occupant.def_name, "contents_decayed_away");
            holder.take_occupant();
            return 1;
        }
        self.decay_contents(simulator, occupant, context)
    }

    fn known_thing_def(&self, def_name: &str, kind: &'static str) -> Result<&ThingDef, PersistenceError> {
        self.defs
            .thing_def(def_name)
            .ok_or_else(|| PersistenceError::UnknownIdentifier {
                kind,
                name: def_name.to_string(),
            })
    }

    /// Brings relocated things back. Entries that cannot be placed are kept
    /// for the next restore; entries whose target is gone are pruned.
    fn pull_back<S, R>(
        &self,
        scope: &mut S,
        region: &mut R,
        table: &ReferenceTable,
        report: &mut RestoreReport,
    ) where
        S: ResidentScope,
        R: RegionHost,
    {
        let region_id = region.region_id();
        let Some(mut record) = scope.registry_mut().release(region_id) else {
            return;
        };
        let mut retained = TileRecord::new(region_id);

        for category in RelocationCategory::ALL {
            for entry in record.take(category) {
                let position = entry.position();
                if !region.size().contains(position) {
                    warn!(region = %region_id, position = %position, "relocation_out_of_bounds");
                    retained.push(category, entry);
                    continue;
                }
                let thing = match entry {
                    RelocationRecord::ByReference { handle, load_id, .. } => {
                        if !table.resolves_live_creature(handle) {
                            if table.is_degraded() {
                                retained.push(
                                    category,
                                    RelocationRecord::ByReference {
                                        handle,
                                        load_id,
                                        position,
                                    },
                                );
                            } else {
                                debug!(handle = %handle, load_id = %load_id, "relocation_pruned");
                                report.pruned += 1;
                            }
                            continue;
                        }
                        match scope.release_tracked(handle) {
                            Some(thing) => thing,
                            None => {
                                warn!(handle = %handle, load_id = %load_id, "tracked_creature_not_released");
                                retained.push(
                                    category,
                                    RelocationRecord::ByReference {
                                        handle,
                                        load_id,
                                        position,
                                    },
                                );
                                continue;
                            }
                        }
                    }
                    RelocationRecord::ByValue { thing, .. } => thing,
                };
                place_relocated(region, thing.at(position), category);
                report.pulled_back += 1;
            }
        }

        let (retained, dropped) = retained
            .rebuilt(|entry| table.is_degraded() || table.resolves_live_creature(entry.handle()));
        report.pruned += dropped;
        report.retained = retained.len();
        if !retained.is_empty() {
            *scope.registry_mut().get_or_create(region_id) = retained;
        }
    }
}

fn decode_grids(snapshot: &TileSnapshot, size: MapSize) -> Result<DecodedGrids, SnapshotFormatError> {
    if let Some(saved) = snapshot.map_size {
        if saved != size {
            return Err(SnapshotFormatError::SizeMismatch {
                saved,
                region: size,
            });
        }
    }
    let decode = |channel: &'static str, bytes: &Option<Vec<u8>>, width: CellWidth| {
        bytes
            .as_deref()
            .map(|bytes| decode_values(bytes, size, width))
            .transpose()
            .map_err(|source| SnapshotFormatError::Grid { channel, source })
    };
    Ok(DecodedGrids {
        terrain: decode("terrainData", &snapshot.terrain, CellWidth::Short)?,
        roof: decode("roofData", &snapshot.roof, CellWidth::Byte)?,
        snow: decode("snowData", &snapshot.snow, CellWidth::Byte)?,
        pollution: decode("pollutionData", &snapshot.pollution, CellWidth::Byte)?,
    })
}

fn apply_moves<S, R>(scope: &mut S, region: &mut R, moves: Vec<PlannedMove>) -> usize
where
    S: ResidentScope,
    R: RegionHost,
{
    let region_id = region.region_id();
    let mut relocated = 0usize;
    for planned in moves {
        let handle = match &planned {
            PlannedMove::Whole { handle, .. } => Some(*handle),
            PlannedMove::Occupant {
                container, depth, ..
            } => region
                .thing(*container)
                .and_then(|holder| holder.nested_occupant(*depth))
                .map(|occupant| occupant.handle),
        };
        let Some(handle) = handle else {
            continue;
        };
        if handle.is_assigned() && scope.registry().locate(handle).is_some() {
            warn!(handle = %handle, "thing_already_relocated; left in place");
            continue;
        }

        let (thing, category, by_value) = match planned {
            PlannedMove::Whole {
                handle,
                category,
                by_value,
            } => match region.despawn(handle) {
                Some(thing) => (thing, category, by_value),
                None => continue,
            },
            PlannedMove::Occupant {
                container,
                depth,
                category,
            } => {
                let Some(holder) = region.thing_mut(container) else {
                    continue;
                };
                let position = holder.position;
                match holder.take_nested_occupant(depth) {
                    Some(occupant) => (occupant.at(position), category, false),
                    None => continue,
                }
            }
        };
        let entry = if by_value {
            RelocationRecord::by_value(thing)
        } else {
            RelocationRecord::by_reference(scope.adopt(thing))
        };
        scope.registry_mut().get_or_create(region_id).push(category, entry);
        relocated += 1;
    }
    relocated
}

/// Suspended occupants go back into the innermost empty container on their
/// cell when one exists; everything else is placed directly.
fn place_relocated<R: RegionHost>(region: &mut R, thing: Thing, category: RelocationCategory) {
    if category.is_suspended() {
        let on_cell = region
            .thing_handles()
            .into_iter()
            .filter(|handle| {
                region
                    .thing(*handle)
                    .is_some_and(|candidate| candidate.position == thing.position)
            })
            .collect::<Vec<_>>();
        for handle in on_cell {
            if let Some(holder) = region.thing_mut(handle).and_then(Thing::vacant_holder_mut) {
                if let Err(thing) = holder.insert_occupant(thing) {
                    region.spawn(thing);
                }
                return;
            }
        }
    }
    region.spawn(thing);
}
