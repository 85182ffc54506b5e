use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{EntityHandle, Position, RegionId, Thing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationCategory {
    /// Wild creatures with no outside references, kept by value.
    ParkedWildlife,
    /// Non-player creatures the resident scope already tracks.
    ResidentCreatures,
    PlayerCreatures,
    /// Player humanlikes taken out of suspended-animation containers.
    SuspendedColonists,
    /// Every other creature taken out of a container.
    SuspendedOccupants,
}

impl RelocationCategory {
    pub const ALL: [Self; 5] = [
        Self::ParkedWildlife,
        Self::ResidentCreatures,
        Self::PlayerCreatures,
        Self::SuspendedColonists,
        Self::SuspendedOccupants,
    ];

    /// Occupants go back into a container at their position when one exists.
    pub fn is_suspended(self) -> bool {
        matches!(self, Self::SuspendedColonists | Self::SuspendedOccupants)
    }
}

impl fmt::Display for RelocationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ParkedWildlife => "parked_wildlife",
            Self::ResidentCreatures => "resident_creatures",
            Self::PlayerCreatures => "player_creatures",
            Self::SuspendedColonists => "suspended_colonists",
            Self::SuspendedOccupants => "suspended_occupants",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RelocationRecord {
    /// The resident scope owns the thing; only the handle is kept here.
    ByReference {
        handle: EntityHandle,
        load_id: String,
        position: Position,
    },
    /// The thing itself, deep-saved inside the record.
    ByValue { thing: Thing, position: Position },
}

impl RelocationRecord {
    pub fn by_reference(thing: &Thing) -> Self {
        Self::ByReference {
            handle: thing.handle,
            load_id: thing.load_id(),
            position: thing.position,
        }
    }

    pub fn by_value(thing: Thing) -> Self {
        let position = thing.position;
        Self::ByValue { thing, position }
    }

    pub fn handle(&self) -> EntityHandle {
        match self {
            Self::ByReference { handle, .. } => *handle,
            Self::ByValue { thing, .. } => thing.handle,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Self::ByReference { position, .. } | Self::ByValue { position, .. } => *position,
        }
    }
}

/// Relocations of one unloaded region, partitioned by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub region: RegionId,
    #[serde(default)]
    parked_wildlife: Vec<RelocationRecord>,
    #[serde(default)]
    resident_creatures: Vec<RelocationRecord>,
    #[serde(default)]
    player_creatures: Vec<RelocationRecord>,
    #[serde(default)]
    suspended_colonists: Vec<RelocationRecord>,
    #[serde(default)]
    suspended_occupants: Vec<RelocationRecord>,
}

impl TileRecord {
    pub fn new(region: RegionId) -> Self {
        Self {
            region,
            parked_wildlife: Vec::new(),
            resident_creatures: Vec::new(),
            player_creatures: Vec::new(),
            suspended_colonists: Vec::new(),
            suspended_occupants: Vec::new(),
        }
    }

    pub fn entries(&self, category: RelocationCategory) -> &[RelocationRecord] {
        match category {
            RelocationCategory::ParkedWildlife => &self.parked_wildlife,
            RelocationCategory::ResidentCreatures => &self.resident_creatures,
            RelocationCategory::PlayerCreatures => &self.player_creatures,
            RelocationCategory::SuspendedColonists => &self.suspended_colonists,
            RelocationCategory::SuspendedOccupants => &self.suspended_occupants,
        }
    }

    fn entries_mut(&mut self, category: RelocationCategory) -> &mut Vec<RelocationRecord> {
        match category {
            RelocationCategory::ParkedWildlife => &mut self.parked_wildlife,
            RelocationCategory::ResidentCreatures => &mut self.resident_creatures,
            RelocationCategory::PlayerCreatures => &mut self.player_creatures,
            RelocationCategory::SuspendedColonists => &mut self.suspended_colonists,
            RelocationCategory::SuspendedOccupants => &mut self.suspended_occupants,
        }
    }

    pub fn push(&mut self, category: RelocationCategory, record: RelocationRecord) {
        self.entries_mut(category).push(record);
    }

    /// Moves every entry of `category` out of the record.
    pub fn take(&mut self, category: RelocationCategory) -> Vec<RelocationRecord> {
        std::mem::take(self.entries_mut(category))
    }

    pub fn len(&self) -> usize {
        RelocationCategory::ALL
            .iter()
            .map(|category| self.entries(*category).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        handle.is_assigned()
            && RelocationCategory::ALL
                .iter()
                .any(|category| self.entries(*category).iter().any(|r| r.handle() == handle))
    }

    /// Builds a fresh record holding each identity once, in category order,
    /// and only by-reference entries for which `resolves` holds. Returns the
    /// record and how many entries were dropped.
    pub fn rebuilt(self, resolves: impl Fn(&RelocationRecord) -> bool) -> (Self, usize) {
        let mut fresh = Self::new(self.region);
        let mut seen = HashSet::<EntityHandle>::new();
        let mut dropped = 0;
        let mut source = self;
        for category in RelocationCategory::ALL {
            for record in source.take(category) {
                let handle = record.handle();
                let duplicate = handle.is_assigned() && !seen.insert(handle);
                let dangling = matches!(record, RelocationRecord::ByReference { .. })
                    && !resolves(&record);
                if duplicate || dangling {
                    dropped += 1;
                    continue;
                }
                fresh.push(category, record);
            }
        }
        (fresh, dropped)
    }
}

/// Region id → relocation record, persisted with the resident scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<TileRecord>", into = "Vec<TileRecord>")]
pub struct CrossScopeRegistry {
    records: BTreeMap<RegionId, TileRecord>,
}

impl CrossScopeRegistry {
    pub fn get_or_create(&mut self, region: RegionId) -> &mut TileRecord {
        self.records
            .entry(region)
            .or_insert_with(|| TileRecord::new(region))
    }

    pub fn get(&self, region: RegionId) -> Option<&TileRecord> {
        self.records.get(&region)
    }

    pub fn get_mut(&mut self, region: RegionId) -> Option<&mut TileRecord> {
        self.records.get_mut(&region)
    }

    pub fn release(&mut self, region: RegionId) -> Option<TileRecord> {
        self.records.remove(&region)
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.records.keys().copied()
    }

    /// Region and category a handle is currently parked under, if any.
    pub fn locate(&self, handle: EntityHandle) -> Option<(RegionId, RelocationCategory)> {
        self.records.values().find_map(|record| {
            RelocationCategory::ALL
                .into_iter()
                .find(|category| {
                    record
                        .entries(*category)
                        .iter()
                        .any(|entry| entry.handle() == handle)
                })
                .map(|category| (record.region, category))
        })
    }

    /// Replaces the region's record with a rebuilt one. Returns the number of
    /// dropped entries.
    pub fn revalidate(
        &mut self,
        region: RegionId,
        resolves: impl Fn(&RelocationRecord) -> bool,
    ) -> usize {
        let Some(record) = self.records.remove(&region) else {
            return 0;
        };
        let (fresh, dropped) = record.rebuilt(resolves);
        self.records.insert(region, fresh);
        dropped
    }

    /// Revalidates every region, e.g. after the resident scope was loaded.
    pub fn revalidate_all(&mut self, resolves: impl Fn(&RelocationRecord) -> bool) -> usize {
        let regions = self.records.keys().copied().collect::<Vec<_>>();
        regions
            .into_iter()
            .map(|region| self.revalidate(region, &resolves))
            .sum()
    }
}

impl From<Vec<TileRecord>> for CrossScopeRegistry {
    fn from(records: Vec<TileRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.region, record))
                .collect(),
        }
    }
}

impl From<CrossScopeRegistry> for Vec<TileRecord> {
    fn from(registry: CrossScopeRegistry) -> Self {
        registry.records.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreatureProfile, ThingKind};

    fn creature(handle: u64) -> Thing {
        let mut thing = Thing::new("Muffalo", ThingKind::Creature(CreatureProfile::default()), 80)
            .at(Position::new(3, 4, 0));
        thing.handle = EntityHandle(handle);
        thing
    }

    #[test]
    fn get_or_create_then_release() {
        let mut registry = CrossScopeRegistry::default();
        assert!(registry.get(RegionId(7)).is_none());
        registry
            .get_or_create(RegionId(7))
            .push(RelocationCategory::PlayerCreatures, RelocationRecord::by_reference(&creature(1)));
        assert_eq!(registry.get_or_create(RegionId(7)).len(), 1);
        assert_eq!(
            registry.locate(EntityHandle(1)),
            Some((RegionId(7), RelocationCategory::PlayerCreatures))
        );
        assert!(registry.release(RegionId(7)).is_some());
        assert!(registry.get(RegionId(7)).is_none());
    }

    #[test]
    fn rebuild_drops_duplicates_and_dangling_references() {
        let mut record = TileRecord::new(RegionId(1));
        record.push(
            RelocationCategory::PlayerCreatures,
            RelocationRecord::by_reference(&creature(1)),
        );
        record.push(
            RelocationCategory::SuspendedColonists,
            RelocationRecord::by_reference(&creature(1)),
        );
        record.push(
            RelocationCategory::ResidentCreatures,
            RelocationRecord::by_reference(&creature(2)),
        );
        record.push(
            RelocationCategory::ParkedWildlife,
            RelocationRecord::by_value(creature(3)),
        );

        let (fresh, dropped) = record.rebuilt(|entry| entry.handle() != EntityHandle(2));
        assert_eq!(dropped, 2);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh.entries(RelocationCategory::ParkedWildlife).len(), 1);
        assert_eq!(fresh.entries(RelocationCategory::PlayerCreatures).len(), 1);
        assert!(fresh.entries(RelocationCategory::SuspendedColonists).is_empty());
    }

    #[test]
    fn by_value_entries_survive_resolution_pass() {
        let mut registry = CrossScopeRegistry::default();
        registry
            .get_or_create(RegionId(4))
            .push(RelocationCategory::ParkedWildlife, RelocationRecord::by_value(creature(9)));
        assert_eq!(registry.revalidate_all(|_| false), 0);
        assert_eq!(registry.get(RegionId(4)).map(TileRecord::len), Some(1));
    }

    #[test]
    fn registry_json_roundtrip_keeps_records() {
        let mut registry = CrossScopeRegistry::default();
        registry
            .get_or_create(RegionId(12))
            .push(RelocationCategory::ParkedWildlife, RelocationRecord::by_value(creature(5)));
        let json = serde_json::to_string(&registry).expect("serialize");
        assert!(json.contains("\"mode\":\"by_value\""));
        let back: CrossScopeRegistry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, registry);
    }
}
