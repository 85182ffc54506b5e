use std::fmt;

use crate::defs::DefDatabase;
use crate::model::{EntityHandle, Thing, ThingKind};
use crate::registry::RelocationCategory;

/// What the classifier needs to know about the scope that owns a region.
pub struct OwnerScope<'a> {
    pub defs: &'a DefDatabase,
    tracked: Box<dyn Fn(EntityHandle) -> bool + 'a>,
}

impl<'a> OwnerScope<'a> {
    pub fn new(defs: &'a DefDatabase, tracked: impl Fn(EntityHandle) -> bool + 'a) -> Self {
        Self {
            defs,
            tracked: Box::new(tracked),
        }
    }

    pub fn tracks(&self, handle: EntityHandle) -> bool {
        handle.is_assigned() && (self.tracked)(handle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Serialize { occupant: OccupantPlan },
    RelocateByReference(RelocationCategory),
    RelocateByValue(RelocationCategory),
    Discard(DiscardReason),
}

/// How the occupant of a serialized container is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupantPlan {
    /// Not a container, or an empty one.
    Empty,
    /// Written inside the container's record.
    Inline,
    /// Moved to the resident scope by reference and left out of the record.
    Relocate(RelocationCategory),
    /// Neither written nor relocated.
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Destroyed,
    NotSpawned,
    Transient,
    Visitor,
    Corpse,
    UntrackedCreature,
    UnknownDef,
    Indestructible,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Destroyed => "destroyed",
            Self::NotSpawned => "not_spawned",
            Self::Transient => "transient",
            Self::Visitor => "visitor",
            Self::Corpse => "corpse",
            Self::UntrackedCreature => "untracked_creature",
            Self::UnknownDef => "unknown_def",
            Self::Indestructible => "indestructible",
        };
        f.write_str(label)
    }
}

pub fn classify(thing: &Thing, owner: &OwnerScope<'_>) -> Disposition {
    if thing.destroyed {
        return Disposition::Discard(DiscardReason::Destroyed);
    }
    if !thing.spawned {
        return Disposition::Discard(DiscardReason::NotSpawned);
    }

    match &thing.kind {
        ThingKind::Creature(profile) => {
            if owner.tracks(thing.handle) {
                let category = if profile.player_owned {
                    RelocationCategory::PlayerCreatures
                } else {
                    RelocationCategory::ResidentCreatures
                };
                return Disposition::RelocateByReference(category);
            }
            if profile.cross_reference_free && !profile.player_owned {
                return Disposition::RelocateByValue(RelocationCategory::ParkedWildlife);
            }
            if profile.visitor {
                return Disposition::Discard(DiscardReason::Visitor);
            }
            if profile.player_owned {
                return Disposition::RelocateByReference(RelocationCategory::PlayerCreatures);
            }
            Disposition::Discard(DiscardReason::UntrackedCreature)
        }
        ThingKind::Effect
        | ThingKind::Projectile
        | ThingKind::Filth
        | ThingKind::ConstructionPlaceholder => Disposition::Discard(DiscardReason::Transient),
        ThingKind::Corpse => Disposition::Discard(DiscardReason::Corpse),
        ThingKind::Container { occupant } => {
            let plan = occupant_plan(occupant.as_deref(), owner);
            serialize_if_reconstructible(thing, owner, plan)
        }
        ThingKind::Structure | ThingKind::Item => {
            serialize_if_reconstructible(thing, owner, OccupantPlan::Empty)
        }
    }
}

fn serialize_if_reconstructible(
    thing: &Thing,
    owner: &OwnerScope<'_>,
    occupant: OccupantPlan,
) -> Disposition {
    match owner.defs.thing_def(&thing.def_name) {
        None => Disposition::Discard(DiscardReason::UnknownDef),
        Some(def) if !def.destroyable => Disposition::Discard(DiscardReason::Indestructible),
        Some(_) => Disposition::Serialize { occupant },
    }
}

/// Every occupant shape is listed explicitly; see DESIGN.md for the table.
pub fn occupant_plan(occupant: Option<&Thing>, owner: &OwnerScope<'_>) -> OccupantPlan {
    let Some(occupant) = occupant else {
        return OccupantPlan::Empty;
    };
    if occupant.destroyed {
        return OccupantPlan::Drop;
    }
    match &occupant.kind {
        ThingKind::Creature(profile) => {
            let suspended = if profile.player_owned && profile.humanlike {
                RelocationCategory::SuspendedColonists
            } else {
                RelocationCategory::SuspendedOccupants
            };
            if owner.tracks(occupant.handle) || profile.player_owned {
                OccupantPlan::Relocate(suspended)
            } else if profile.cross_reference_free {
                OccupantPlan::Inline
            } else {
                OccupantPlan::Relocate(RelocationCategory::SuspendedOccupants)
            }
        }
        ThingKind::Corpse
        | ThingKind::Effect
        | ThingKind::Projectile
        | ThingKind::Filth
        | ThingKind::ConstructionPlaceholder => OccupantPlan::Drop,
        // A nested container is written itself; its own occupant is planned
        // one level down.
        ThingKind::Structure | ThingKind::Item | ThingKind::Container { .. } => {
            OccupantPlan::Inline
        }
    }
}

/// The one occupant in a container chain that has to move to the resident
/// scope, as its depth below `container` (0 is the direct occupant) and its
/// category. Levels planned `Drop` end the walk.
pub fn relocated_occupant(
    container: &Thing,
    owner: &OwnerScope<'_>,
) -> Option<(usize, RelocationCategory)> {
    let mut holder = container;
    let mut depth = 0;
    while let Some(occupant) = holder.occupant() {
        match occupant_plan(Some(occupant), owner) {
            OccupantPlan::Relocate(category) => return Some((depth, category)),
            OccupantPlan::Inline => {
                holder = occupant;
                depth += 1;
            }
            OccupantPlan::Empty | OccupantPlan::Drop => return None,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::defs::{ThingCategory, ThingDef};
    use crate::model::CreatureProfile;

    fn defs() -> DefDatabase {
        DefDatabase::from_defs(
            vec![
                ThingDef::new("Wall", ThingCategory::Structure, 300),
                ThingDef::new("Steel", ThingCategory::Item, 100),
                ThingDef::new("CryptosleepCasket", ThingCategory::Container, 250),
                ThingDef::new("Crate", ThingCategory::Container, 100),
                ThingDef::new("AncientShrine", ThingCategory::Container, 500).indestructible(),
                ThingDef::new("SteamGeyser", ThingCategory::Structure, 1).indestructible(),
            ],
            Vec::new(),
            Vec::new(),
        )
    }

    fn spawned(mut thing: Thing, handle: u64) -> Thing {
        thing.handle = EntityHandle(handle);
        thing.spawned = true;
        thing
    }

    fn creature(profile: CreatureProfile, handle: u64) -> Thing {
        spawned(Thing::new("Human", ThingKind::Creature(profile), 100), handle)
    }

    fn colonist() -> CreatureProfile {
        CreatureProfile {
            player_owned: true,
            humanlike: true,
            ..CreatureProfile::default()
        }
    }

    fn casket(occupant: Option<Thing>) -> Thing {
        spawned(
            Thing::new(
                "CryptosleepCasket",
                ThingKind::Container {
                    occupant: occupant.map(Box::new),
                },
                250,
            ),
            50,
        )
    }

    #[test]
    fn destroyed_or_unplaced_things_are_discarded() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let mut wall = spawned(Thing::new("Wall", ThingKind::Structure, 300), 1);
        wall.destroyed = true;
        assert_eq!(
            classify(&wall, &owner),
            Disposition::Discard(DiscardReason::Destroyed)
        );
        let loose = Thing::new("Wall", ThingKind::Structure, 300);
        assert_eq!(
            classify(&loose, &owner),
            Disposition::Discard(DiscardReason::NotSpawned)
        );
    }

    #[test]
    fn player_creature_relocates_by_reference() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        assert_eq!(
            classify(&creature(colonist(), 7), &owner),
            Disposition::RelocateByReference(RelocationCategory::PlayerCreatures)
        );
    }

    #[test]
    fn tracked_creature_relocates_by_reference_even_when_wild() {
        let defs = defs();
        let tracked = HashSet::from([EntityHandle(8)]);
        let owner = OwnerScope::new(&defs, |handle| tracked.contains(&handle));
        let profile = CreatureProfile {
            cross_reference_free: true,
            ..CreatureProfile::default()
        };
        assert_eq!(
            classify(&creature(profile, 8), &owner),
            Disposition::RelocateByReference(RelocationCategory::ResidentCreatures)
        );
        assert_eq!(
            classify(&creature(profile, 9), &owner),
            Disposition::RelocateByValue(RelocationCategory::ParkedWildlife)
        );
    }

    #[test]
    fn visitors_and_untracked_creatures_are_discarded() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let visitor = CreatureProfile {
            visitor: true,
            humanlike: true,
            ..CreatureProfile::default()
        };
        assert_eq!(
            classify(&creature(visitor, 3), &owner),
            Disposition::Discard(DiscardReason::Visitor)
        );
        assert_eq!(
            classify(&creature(CreatureProfile::default(), 4), &owner),
            Disposition::Discard(DiscardReason::UntrackedCreature)
        );
    }

    #[test]
    fn transients_and_corpses_are_discarded() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let filth = spawned(Thing::new("Filth_Dirt", ThingKind::Filth, 1), 2);
        assert_eq!(
            classify(&filth, &owner),
            Disposition::Discard(DiscardReason::Transient)
        );
        let corpse = spawned(Thing::new("Corpse_Human", ThingKind::Corpse, 100), 3);
        assert_eq!(
            classify(&corpse, &owner),
            Disposition::Discard(DiscardReason::Corpse)
        );
    }

    #[test]
    fn ordinary_structures_serialize_and_unknown_or_indestructible_do_not() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let wall = spawned(Thing::new("Wall", ThingKind::Structure, 300), 1);
        assert_eq!(
            classify(&wall, &owner),
            Disposition::Serialize {
                occupant: OccupantPlan::Empty
            }
        );
        let geyser = spawned(Thing::new("SteamGeyser", ThingKind::Structure, 1), 2);
        assert_eq!(
            classify(&geyser, &owner),
            Disposition::Discard(DiscardReason::Indestructible)
        );
        let modded = spawned(Thing::new("RemovedModWall", ThingKind::Structure, 1), 3);
        assert_eq!(
            classify(&modded, &owner),
            Disposition::Discard(DiscardReason::UnknownDef)
        );
    }

    #[test]
    fn casket_with_tracked_colonist_serializes_without_occupant() {
        let defs = defs();
        let tracked = HashSet::from([EntityHandle(11)]);
        let owner = OwnerScope::new(&defs, |handle| tracked.contains(&handle));
        let mut sleeper = Thing::new("Human", ThingKind::Creature(colonist()), 100);
        sleeper.handle = EntityHandle(11);
        assert_eq!(
            classify(&casket(Some(sleeper)), &owner),
            Disposition::Serialize {
                occupant: OccupantPlan::Relocate(RelocationCategory::SuspendedColonists)
            }
        );
    }

    #[test]
    fn container_occupant_table() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let plan = |occupant: Thing| match classify(&casket(Some(occupant)), &owner) {
            Disposition::Serialize { occupant } => occupant,
            other => panic!("casket should serialize, got {other:?}"),
        };

        let stranger = Thing::new(
            "Human",
            ThingKind::Creature(CreatureProfile {
                humanlike: true,
                ..CreatureProfile::default()
            }),
            100,
        );
        assert_eq!(
            plan(stranger),
            OccupantPlan::Relocate(RelocationCategory::SuspendedOccupants)
        );

        let animal = Thing::new(
            "Muffalo",
            ThingKind::Creature(CreatureProfile {
                cross_reference_free: true,
                ..CreatureProfile::default()
            }),
            100,
        );
        assert_eq!(plan(animal), OccupantPlan::Inline);
        assert_eq!(
            plan(Thing::new("Steel", ThingKind::Item, 100)),
            OccupantPlan::Inline
        );
        assert_eq!(
            plan(Thing::new("Corpse_Human", ThingKind::Corpse, 100)),
            OccupantPlan::Drop
        );

        let nested_sleeper = Thing::new(
            "Crate",
            ThingKind::Container {
                occupant: Some(Box::new(Thing::new(
                    "Human",
                    ThingKind::Creature(colonist()),
                    100,
                ))),
            },
            100,
        );
        let outer = casket(Some(nested_sleeper.clone()));
        assert_eq!(plan(nested_sleeper), OccupantPlan::Inline);
        assert_eq!(
            relocated_occupant(&outer, &owner),
            Some((1, RelocationCategory::SuspendedColonists))
        );

        let nested_goods = Thing::new(
            "Crate",
            ThingKind::Container {
                occupant: Some(Box::new(Thing::new("Steel", ThingKind::Item, 100))),
            },
            100,
        );
        let outer = casket(Some(nested_goods.clone()));
        assert_eq!(plan(nested_goods), OccupantPlan::Inline);
        assert_eq!(relocated_occupant(&outer, &owner), None);

        let nested_remains = Thing::new(
            "Crate",
            ThingKind::Container {
                occupant: Some(Box::new(Thing::new("Corpse_Human", ThingKind::Corpse, 100))),
            },
            100,
        );
        assert_eq!(relocated_occupant(&casket(Some(nested_remains)), &owner), None);
        assert_eq!(
            classify(&casket(None), &owner),
            Disposition::Serialize {
                occupant: OccupantPlan::Empty
            }
        );
    }

    #[test]
    fn indestructible_container_is_discarded() {
        let defs = defs();
        let owner = OwnerScope::new(&defs, |_| false);
        let shrine = spawned(
            Thing::new("AncientShrine", ThingKind::Container { occupant: None }, 500),
            4,
        );
        assert_eq!(
            classify(&shrine, &owner),
            Disposition::Discard(DiscardReason::Indestructible)
        );
    }
}
