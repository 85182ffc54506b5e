use std::collections::HashMap;

/// What a def describes. Drives both classification and how a saved record is
/// turned back into a thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingCategory {
    Structure,
    Container,
    Item,
    Creature,
    Corpse,
    Filth,
    Effect,
    Projectile,
    ConstructionPlaceholder,
}

impl ThingCategory {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "Structure" => Self::Structure,
            "Container" => Self::Container,
            "Item" => Self::Item,
            "Creature" => Self::Creature,
            "Corpse" => Self::Corpse,
            "Filth" => Self::Filth,
            "Effect" => Self::Effect,
            "Projectile" => Self::Projectile,
            "ConstructionPlaceholder" => Self::ConstructionPlaceholder,
            _ => return None,
        })
    }

    pub const ALLOWED_VALUES: &'static str = "Structure, Container, Item, Creature, Corpse, Filth, Effect, Projectile, ConstructionPlaceholder";
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThingDef {
    pub def_name: String,
    pub label: String,
    pub category: ThingCategory,
    pub max_hit_points: i32,
    pub destroyable: bool,
    /// Rot progress at which the thing spoils away. `None` for non-perishables.
    pub ticks_to_rot_start: Option<f32>,
}

impl ThingDef {
    pub fn new(def_name: impl Into<String>, category: ThingCategory, max_hit_points: i32) -> Self {
        let def_name = def_name.into();
        Self {
            label: def_name.clone(),
            def_name,
            category,
            max_hit_points,
            destroyable: true,
            ticks_to_rot_start: None,
        }
    }

    pub fn indestructible(mut self) -> Self {
        self.destroyable = false;
        self
    }

    pub fn perishable(mut self, ticks_to_rot_start: f32) -> Self {
        self.ticks_to_rot_start = Some(ticks_to_rot_start);
        self
    }

    /// Health a restored thing of this def may carry: `[1, max_hit_points]`.
    pub fn clamp_hit_points(&self, hit_points: i32) -> i32 {
        hit_points.clamp(1, self.max_hit_points.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainDef {
    pub def_name: String,
    pub short_hash: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactionDef {
    pub def_name: String,
    pub label: String,
}

#[derive(Debug, Default, Clone)]
pub struct DefDatabase {
    thing_defs: Vec<ThingDef>,
    thing_ids_by_name: HashMap<String, usize>,
    terrain_by_hash: HashMap<u16, TerrainDef>,
    faction_defs: HashMap<String, FactionDef>,
}

impl DefDatabase {
    pub fn from_defs(
        thing_defs: Vec<ThingDef>,
        terrain_defs: Vec<TerrainDef>,
        faction_defs: Vec<FactionDef>,
    ) -> Self {
        let mut thing_ids_by_name = HashMap::with_capacity(thing_defs.len());
        for (idx, def) in thing_defs.iter().enumerate() {
            thing_ids_by_name.insert(def.def_name.clone(), idx);
        }
        let terrain_by_hash = terrain_defs
            .into_iter()
            .map(|def| (def.short_hash, def))
            .collect();
        let faction_defs = faction_defs
            .into_iter()
            .map(|def| (def.def_name.clone(), def))
            .collect();
        Self {
            thing_defs,
            thing_ids_by_name,
            terrain_by_hash,
            faction_defs,
        }
    }

    pub fn thing_def(&self, def_name: &str) -> Option<&ThingDef> {
        self.thing_ids_by_name
            .get(def_name)
            .and_then(|idx| self.thing_defs.get(*idx))
    }

    pub fn thing_defs(&self) -> &[ThingDef] {
        &self.thing_defs
    }

    pub fn terrain_by_hash(&self, short_hash: u16) -> Option<&TerrainDef> {
        self.terrain_by_hash.get(&short_hash)
    }

    pub fn terrain_by_name(&self, def_name: &str) -> Option<&TerrainDef> {
        self.terrain_by_hash
            .values()
            .find(|def| def.def_name == def_name)
    }

    pub fn faction_def(&self, def_name: &str) -> Option<&FactionDef> {
        self.faction_defs.get(def_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_health_between_one_and_max() {
        let wall = ThingDef::new("Wall", ThingCategory::Structure, 100);
        assert_eq!(wall.clamp_hit_points(0), 1);
        assert_eq!(wall.clamp_hit_points(-20), 1);
        assert_eq!(wall.clamp_hit_points(50), 50);
        assert_eq!(wall.clamp_hit_points(150), 100);
    }

    #[test]
    fn lookups_resolve_by_name_and_hash() {
        let db = DefDatabase::from_defs(
            vec![ThingDef::new("Wall", ThingCategory::Structure, 300)],
            vec![TerrainDef {
                def_name: "Soil".to_string(),
                short_hash: 300,
            }],
            vec![FactionDef {
                def_name: "PlayerColony".to_string(),
                label: "colony".to_string(),
            }],
        );
        assert_eq!(db.thing_def("Wall").map(|d| d.max_hit_points), Some(300));
        assert!(db.thing_def("Door").is_none());
        assert_eq!(db.terrain_by_hash(300).map(|d| d.def_name.as_str()), Some("Soil"));
        assert_eq!(db.terrain_by_name("Soil").map(|d| d.short_hash), Some(300));
        assert!(db.faction_def("PlayerColony").is_some());
    }
}
