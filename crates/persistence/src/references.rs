use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, error};

use crate::host::{LiveObject, LiveObjectKind, ReferenceSource};
use crate::model::{EntityHandle, FactionRef};

/// Lookup table consulted while snapshot records are rebuilt. Filled from
/// objects that are already alive; nothing registered here is ever
/// deserialized again.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    by_load_id: HashMap<String, LiveObject>,
    by_handle: HashMap<EntityHandle, String>,
    first_faction_by_def: HashMap<String, String>,
    unavailable: Vec<String>,
}

impl ReferenceTable {
    /// Returns `false` when the load id was already registered; the first
    /// registration wins.
    pub fn register(&mut self, object: LiveObject) -> bool {
        match self.by_load_id.entry(object.load_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                if let Some(handle) = object.handle.filter(|h| h.is_assigned()) {
                    self.by_handle
                        .entry(handle)
                        .or_insert_with(|| object.load_id.clone());
                }
                if let (LiveObjectKind::Faction, Some(def_name)) =
                    (object.kind, object.faction_def.as_ref())
                {
                    self.first_faction_by_def
                        .entry(def_name.clone())
                        .or_insert_with(|| object.load_id.clone());
                }
                slot.insert(object);
                true
            }
        }
    }

    pub fn resolve(&self, load_id: &str) -> Option<&LiveObject> {
        self.by_load_id.get(load_id)
    }

    pub fn resolve_handle(&self, handle: EntityHandle) -> Option<&LiveObject> {
        self.by_handle
            .get(&handle)
            .and_then(|load_id| self.by_load_id.get(load_id))
    }

    /// A tracked creature that is still alive in the resident scope.
    pub fn resolves_live_creature(&self, handle: EntityHandle) -> bool {
        matches!(
            self.resolve_handle(handle).map(|object| object.kind),
            Some(LiveObjectKind::WorldCreature { alive: true })
        )
    }

    /// First registered faction instance made from `def_name`.
    pub fn faction_for_def(&self, def_name: &str) -> Option<FactionRef> {
        self.first_faction_by_def
            .get(def_name)
            .map(|load_id| FactionRef {
                load_id: load_id.clone(),
                def_name: def_name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.by_load_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_load_id.is_empty()
    }

    /// True when at least one source could not be enumerated; references into
    /// that source will not resolve.
    pub fn is_degraded(&self) -> bool {
        !self.unavailable.is_empty()
    }

    pub fn unavailable_sources(&self) -> &[String] {
        &self.unavailable
    }
}

/// Indexes every live object the sources expose. A source that cannot be
/// enumerated is logged and skipped; the table is then degraded, not absent.
pub fn inject_live_references(sources: &[&dyn ReferenceSource]) -> ReferenceTable {
    let mut table = ReferenceTable::default();
    let mut duplicates = 0usize;
    for source in sources {
        match source.live_objects() {
            Ok(objects) => {
                for object in objects {
                    if !table.register(object) {
                        duplicates += 1;
                    }
                }
            }
            Err(err) => {
                error!(
                    reason = %err,
                    "live_reference_source_unavailable; cross-scope references will not resolve"
                );
                table.unavailable.push(err.0);
            }
        }
    }
    debug!(
        registered = table.len(),
        duplicates,
        degraded = table.is_degraded(),
        "live_references_injected"
    );
    table
}
