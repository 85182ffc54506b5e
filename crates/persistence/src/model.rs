use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a world tile that can host a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub x: u32,
    pub y: u32,
}

/// Cell grid dimensions of a region. Grids are stored row-major:
/// the index of `(x, y)` is `y * width + x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSize {
    pub width: u32,
    pub height: u32,
}

impl MapSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn index_of(&self, cell: GridCell) -> Option<usize> {
        if cell.x >= self.width || cell.y >= self.height {
            return None;
        }
        Some(cell.y as usize * self.width as usize + cell.x as usize)
    }

    pub fn cells(&self) -> impl Iterator<Item = GridCell> {
        let width = self.width;
        (0..self.height).flat_map(move |y| (0..width).map(move |x| GridCell { x, y }))
    }

    pub fn contains(&self, position: Position) -> bool {
        position
            .cell()
            .is_some_and(|cell| self.index_of(cell).is_some())
    }
}

impl fmt::Display for MapSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Integer placement of a thing. `x`/`y` address the cell grid, `z` is the
/// vertical layer and is zero for everything placed on the ground.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn cell(&self) -> Option<GridCell> {
        let x = u32::try_from(self.x).ok()?;
        let y = u32::try_from(self.y).ok()?;
        Some(GridCell { x, y })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Quarter-turn rotation, always in `0..=3`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rotation(u8);

impl Rotation {
    pub const NORTH: Self = Self(0);
    pub const EAST: Self = Self(1);
    pub const SOUTH: Self = Self(2);
    pub const WEST: Self = Self(3);

    /// Out-of-range values wrap, so `-1` is west and `5` is east.
    pub fn from_int(value: i32) -> Self {
        Self(value.rem_euclid(4) as u8)
    }

    pub fn as_int(self) -> i32 {
        i32::from(self.0)
    }
}

/// Host-assigned identity of a thing. Zero means "not yet spawned anywhere".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

impl EntityHandle {
    pub const UNASSIGNED: Self = Self(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live faction as seen from a thing: the faction instance's load id plus
/// the def it was created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionRef {
    pub load_id: String,
    pub def_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureProfile {
    pub player_owned: bool,
    pub humanlike: bool,
    /// Non-player guest, trader or raider that is only passing through.
    pub visitor: bool,
    /// No relations, ideology roles or faction membership point at this
    /// creature from outside the region.
    pub cross_reference_free: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ThingKind {
    Structure,
    Item,
    ConstructionPlaceholder,
    Effect,
    Projectile,
    Filth,
    Corpse,
    Creature(CreatureProfile),
    Container { occupant: Option<Box<Thing>> },
}

impl ThingKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Item => "item",
            Self::ConstructionPlaceholder => "construction_placeholder",
            Self::Effect => "effect",
            Self::Projectile => "projectile",
            Self::Filth => "filth",
            Self::Corpse => "corpse",
            Self::Creature(_) => "creature",
            Self::Container { .. } => "container",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    pub handle: EntityHandle,
    pub def_name: String,
    pub stuff: Option<String>,
    pub faction: Option<FactionRef>,
    pub position: Position,
    pub rotation: Rotation,
    pub hit_points: i32,
    pub rot_progress: Option<f32>,
    pub kind: ThingKind,
    pub spawned: bool,
    pub destroyed: bool,
}

impl Thing {
    pub fn new(def_name: impl Into<String>, kind: ThingKind, hit_points: i32) -> Self {
        Self {
            handle: EntityHandle::UNASSIGNED,
            def_name: def_name.into(),
            stuff: None,
            faction: None,
            position: Position::default(),
            rotation: Rotation::NORTH,
            hit_points,
            rot_progress: None,
            kind,
            spawned: false,
            destroyed: false,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_stuff(mut self, stuff: impl Into<String>) -> Self {
        self.stuff = Some(stuff.into());
        self
    }

    pub fn with_faction(mut self, faction: FactionRef) -> Self {
        self.faction = Some(faction);
        self
    }

    pub fn with_rot_progress(mut self, rot_progress: f32) -> Self {
        self.rot_progress = Some(rot_progress);
        self
    }

    /// Reference id other objects use to point at this thing.
    pub fn load_id(&self) -> String {
        format!("Thing_{}{}", self.def_name, self.handle.0)
    }

    pub fn creature_profile(&self) -> Option<CreatureProfile> {
        match self.kind {
            ThingKind::Creature(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn occupant(&self) -> Option<&Thing> {
        match &self.kind {
            ThingKind::Container { occupant } => occupant.as_deref(),
            _ => None,
        }
    }

    pub fn occupant_mut(&mut self) -> Option<&mut Thing> {
        match &mut self.kind {
            ThingKind::Container { occupant } => occupant.as_deref_mut(),
            _ => None,
        }
    }

    pub fn take_occupant(&mut self) -> Option<Thing> {
        match &mut self.kind {
            ThingKind::Container { occupant } => occupant.take().map(|boxed| *boxed),
            _ => None,
        }
    }

    /// Occupant `depth` levels down the container chain. Depth 0 is this
    /// thing's own occupant.
    pub fn nested_occupant(&self, depth: usize) -> Option<&Thing> {
        let mut occupant = self.occupant()?;
        for _ in 0..depth {
            occupant = occupant.occupant()?;
        }
        Some(occupant)
    }

    pub fn take_nested_occupant(&mut self, depth: usize) -> Option<Thing> {
        if depth == 0 {
            return self.take_occupant();
        }
        self.occupant_mut()?.take_nested_occupant(depth - 1)
    }

    /// Innermost empty container in this thing's occupant chain.
    pub fn vacant_holder_mut(&mut self) -> Option<&mut Thing> {
        if matches!(self.kind, ThingKind::Container { occupant: None }) {
            return Some(self);
        }
        self.occupant_mut()?.vacant_holder_mut()
    }

    /// Puts `occupant` inside this thing. Hands it back when this is not a
    /// container or the container is already occupied.
    pub fn insert_occupant(&mut self, occupant: Thing) -> Result<(), Thing> {
        match &mut self.kind {
            ThingKind::Container { occupant: slot } if slot.is_none() => {
                *slot = Some(Box::new(occupant));
                Ok(())
            }
            _ => Err(occupant),
        }
    }
}
