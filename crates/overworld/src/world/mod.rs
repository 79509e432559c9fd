mod arena;
mod tilemap;
mod tileset;

pub use arena::{ArenaError, ConnectionPolicy, LinkReport, MapArena, ResolvedTile};
pub use tilemap::{ConnectionSpec, Edge, MapConnection, MapData, MapId, TileMap, TileMapError};
pub use tileset::{TileFlags, TileId, TileQuery, TileSet, TileSize, EMPTY_TILE};
