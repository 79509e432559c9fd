use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tileset::{TileId, TileQuery, TileSize, EMPTY_TILE};
use crate::movement::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

/// Map edge a connection hangs off.
///
/// `North` lies past the top row (`y >= height`), `South` below row 0,
/// `East` past the last column and `West` left of column 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    North,
    South,
    East,
    West,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::North, Edge::South, Edge::East, Edge::West];

    pub const fn index(self) -> usize {
        match self {
            Edge::North => 0,
            Edge::South => 1,
            Edge::East => 2,
            Edge::West => 3,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Edge::North => Edge::South,
            Edge::South => Edge::North,
            Edge::East => Edge::West,
            Edge::West => Edge::East,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Edge::North => "north",
            Edge::South => "south",
            Edge::East => "east",
            Edge::West => "west",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Edge::ALL.into_iter().find(|edge| edge.name() == raw)
    }

    pub const fn toward(direction: Direction) -> Self {
        match direction {
            Direction::Up => Edge::North,
            Direction::Down => Edge::South,
            Direction::Right => Edge::East,
            Direction::Left => Edge::West,
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved link to a neighbouring map.
///
/// `offset` is subtracted from the coordinate running along the edge
/// (x for north/south, y for east/west) when crossing into the neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConnection {
    pub map: MapId,
    pub offset: i32,
}

/// Connection as authored, before the target name is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub edge: Edge,
    pub target: String,
    pub offset: i32,
}

/// Construction input. `layers` are stored bottom row first.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub layer_count: usize,
    pub layers: Vec<Vec<TileId>>,
    pub connections: Vec<ConnectionSpec>,
    pub music: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileMapError {
    #[error("map name must not be empty")]
    EmptyName,
    #[error("map '{map}' has zero size ({width}x{height})")]
    ZeroSize { map: String, width: u32, height: u32 },
    #[error("map '{map}' layer count mismatch: declared {declared}, supplied {supplied}")]
    LayerCountMismatch {
        map: String,
        declared: usize,
        supplied: usize,
    },
    #[error("map '{map}' tile count mismatch on layer {layer}: expected {expected}, got {actual}")]
    TileCountMismatch {
        map: String,
        layer: usize,
        expected: usize,
        actual: usize,
    },
    #[error("map '{map}' declares the {edge} connection more than once")]
    DuplicateConnection { map: String, edge: Edge },
}

/// Fixed-size layered tile grid plus its edge connections.
pub struct TileMap {
    name: String,
    width: u32,
    height: u32,
    tiles: Vec<Vec<TileId>>,
    tileset: Arc<dyn TileQuery>,
    connection_specs: Vec<ConnectionSpec>,
    connections: [Option<MapConnection>; 4],
    music: Option<String>,
}

impl TileMap {
    pub fn new(data: MapData, tileset: Arc<dyn TileQuery>) -> Result<Self, TileMapError> {
        let MapData {
            name,
            width,
            height,
            layer_count,
            layers,
            connections,
            music,
        } = data;

        if name.trim().is_empty() {
            return Err(TileMapError::EmptyName);
        }
        if width == 0 || height == 0 {
            return Err(TileMapError::ZeroSize {
                map: name,
                width,
                height,
            });
        }
        if layers.len() != layer_count {
            return Err(TileMapError::LayerCountMismatch {
                map: name,
                declared: layer_count,
                supplied: layers.len(),
            });
        }
        let expected = width as usize * height as usize;
        for (layer, tiles) in layers.iter().enumerate() {
            if tiles.len() != expected {
                return Err(TileMapError::TileCountMismatch {
                    map: name,
                    layer,
                    expected,
                    actual: tiles.len(),
                });
            }
        }
        for (idx, spec) in connections.iter().enumerate() {
            if connections[..idx].iter().any(|seen| seen.edge == spec.edge) {
                return Err(TileMapError::DuplicateConnection {
                    map: name,
                    edge: spec.edge,
                });
            }
        }

        Ok(Self {
            name,
            width,
            height,
            tiles: layers,
            tileset,
            connection_specs: connections,
            connections: [None; 4],
            music,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layer_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tile_size(&self) -> TileSize {
        self.tileset.tile_size()
    }

    pub fn pixel_width(&self) -> u32 {
        self.width * self.tile_size().width
    }

    pub fn pixel_height(&self) -> u32 {
        self.height * self.tile_size().height
    }

    pub fn tileset(&self) -> &Arc<dyn TileQuery> {
        &self.tileset
    }

    pub fn music(&self) -> Option<&str> {
        self.music.as_deref()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.index_of(x, y).is_some()
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Tile id at a layer and cell; [`EMPTY_TILE`] for anything out of range.
    pub fn tile(&self, layer: usize, x: i32, y: i32) -> TileId {
        let Some(index) = self.index_of(x, y) else {
            return EMPTY_TILE;
        };
        self.tiles
            .get(layer)
            .and_then(|tiles| tiles.get(index))
            .copied()
            .unwrap_or(EMPTY_TILE)
    }

    fn occupied_tiles(&self, x: i32, y: i32) -> impl Iterator<Item = TileId> + '_ {
        let index = self.index_of(x, y);
        self.tiles
            .iter()
            .filter_map(move |layer| index.and_then(|index| layer.get(index).copied()))
            .filter(|tile| *tile != EMPTY_TILE)
    }

    /// Plain in-map passability: out of range or any solid layer blocks.
    pub fn can_move(&self, x: i32, y: i32) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        !self
            .occupied_tiles(x, y)
            .any(|tile| self.tileset.is_solid(tile))
    }

    pub fn is_encounter(&self, x: i32, y: i32) -> bool {
        self.occupied_tiles(x, y)
            .any(|tile| self.tileset.is_encounter(tile))
    }

    /// True when any layer at (x, y) is a ledge jumped while travelling `direction`.
    pub fn has_ledge(&self, x: i32, y: i32, direction: Direction) -> bool {
        self.occupied_tiles(x, y)
            .any(|tile| self.tileset.is_ledge(tile, direction))
    }

    pub fn has_connection(&self, edge: Edge) -> bool {
        self.connections[edge.index()].is_some()
    }

    pub fn connection(&self, edge: Edge) -> Option<MapConnection> {
        self.connections[edge.index()]
    }

    pub fn connection_by_name(&self, name: &str) -> Option<MapConnection> {
        Edge::parse(name).and_then(|edge| self.connection(edge))
    }

    pub fn connection_specs(&self) -> &[ConnectionSpec] {
        &self.connection_specs
    }

    pub(crate) fn set_connection(&mut self, edge: Edge, connection: Option<MapConnection>) {
        self.connections[edge.index()] = connection;
    }
}

impl fmt::Debug for TileMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileMap")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layer_count", &self.tiles.len())
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TileMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.name, self.width, self.height)
    }
}
