use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::movement::Direction;

pub type TileId = i32;

/// Tile id meaning "nothing to draw or collide with".
pub const EMPTY_TILE: TileId = -1;

/// Per-tile behaviour bits supplied by the tileset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileFlags(pub u8);

impl TileFlags {
    pub const NONE: Self = Self(0);
    pub const SOLID: Self = Self(1 << 0);
    pub const ENCOUNTER: Self = Self(1 << 1);
    pub const LEDGE_DOWN: Self = Self(1 << 2);
    pub const LEDGE_LEFT: Self = Self(1 << 3);
    pub const LEDGE_RIGHT: Self = Self(1 << 4);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Ledge bit for a ledge that is jumped while travelling `direction`.
    /// There is no upward-facing ledge.
    pub fn ledge_for(direction: Direction) -> Option<Self> {
        match direction {
            Direction::Down => Some(Self::LEDGE_DOWN),
            Direction::Left => Some(Self::LEDGE_LEFT),
            Direction::Right => Some(Self::LEDGE_RIGHT),
            Direction::Up => None,
        }
    }
}

impl BitOr for TileFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TileFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl Default for TileSize {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
        }
    }
}

/// Read-only tile capability consumed by maps and movement.
///
/// Implementations must be pure: the same id always yields the same flags.
pub trait TileQuery: fmt::Debug + Send + Sync {
    fn tile_size(&self) -> TileSize;

    fn flags(&self, tile: TileId) -> TileFlags;

    fn is_solid(&self, tile: TileId) -> bool {
        self.flags(tile).contains(TileFlags::SOLID)
    }

    fn is_encounter(&self, tile: TileId) -> bool {
        self.flags(tile).contains(TileFlags::ENCOUNTER)
    }

    /// True when `tile` is a ledge jumped while travelling `direction`.
    fn is_ledge(&self, tile: TileId, direction: Direction) -> bool {
        TileFlags::ledge_for(direction).is_some_and(|bit| self.flags(tile).contains(bit))
    }
}

/// Table-backed tileset: ids missing from the table carry no flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TileSet {
    name: String,
    tile_size: TileSize,
    flags: HashMap<TileId, TileFlags>,
}

impl TileSet {
    pub fn new(name: impl Into<String>, tile_size: TileSize) -> Self {
        Self {
            name: name.into(),
            tile_size,
            flags: HashMap::new(),
        }
    }

    pub fn with_flags(mut self, tile: TileId, flags: TileFlags) -> Self {
        self.set_flags(tile, flags);
        self
    }

    pub fn set_flags(&mut self, tile: TileId, flags: TileFlags) {
        if tile == EMPTY_TILE {
            return;
        }
        if flags.is_empty() {
            self.flags.remove(&tile);
        } else {
            self.flags.insert(tile, flags);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flagged_tile_count(&self) -> usize {
        self.flags.len()
    }
}

impl TileQuery for TileSet {
    fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    fn flags(&self, tile: TileId) -> TileFlags {
        self.flags.get(&tile).copied().unwrap_or(TileFlags::NONE)
    }
}
