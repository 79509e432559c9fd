use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use super::discovery::{discover_story_files, StoryFileKind};
use super::hashing::InputHasher;
use super::schema::{combine_flags, ConnectionEntry, MapFile, StoryFile, TilesetFile};
use crate::app::{World, WorldConfig};
use crate::movement::{MotionProfile, TileCoord};
use crate::world::{
    ArenaError, ConnectionSpec, Edge, MapData, MapId, TileId, TileMap, TileMapError, TileQuery,
    TileSet, TileSize,
};

#[derive(Debug, Error)]
pub enum StoryLoadError {
    #[error("story directory {dir} has no story.json")]
    MissingStoryFile { dir: PathBuf },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read directory entry in {path}: {source}")]
    ReadDirEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} at {json_path}: {source}")]
    Parse {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("tileset {path} has non-numeric tile id key '{key}'")]
    InvalidTileId { path: PathBuf, key: String },
    #[error("tileset '{name}' is defined more than once")]
    DuplicateTileset { name: String },
    #[error("map '{map}' uses unknown tileset '{tileset}'")]
    UnknownTileset { map: String, tileset: String },
    #[error("map '{map}' connection key '{key}' is invalid: {reason}")]
    InvalidConnection {
        map: String,
        key: String,
        reason: &'static str,
    },
    #[error("invalid map {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: TileMapError,
    },
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("story {path} sets player move_speed to {speed} (expected a finite value > 0)")]
    InvalidMoveSpeed { path: PathBuf, speed: f32 },
    #[error("map {path} tile id {tile} with id_offset {offset} leaves the valid id range")]
    TileIdOffset {
        path: PathBuf,
        tile: TileId,
        offset: TileId,
    },
    #[error("start map '{map}' is not part of the story")]
    UnknownStartMap { map: String },
    #[error("start tile ({x}, {y}) is outside map '{map}'")]
    StartOutOfBounds { map: String, x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnPoint {
    pub map: MapId,
    pub tile: TileCoord,
}

/// Parsed story content, ready to be turned into a [`World`].
#[derive(Debug)]
pub struct Story {
    name: String,
    root: PathBuf,
    fingerprint: String,
    start_map: String,
    start_tile: TileCoord,
    player: MotionProfile,
    tileset_count: usize,
    maps: Vec<TileMap>,
}

#[derive(Debug)]
pub struct StoryWorld {
    pub world: World,
    pub start: SpawnPoint,
    pub player: MotionProfile,
}

impl Story {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lower-hex SHA-256 of every input file, path and bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn start_map(&self) -> &str {
        &self.start_map
    }

    pub fn start_tile(&self) -> TileCoord {
        self.start_tile
    }

    pub fn player(&self) -> &MotionProfile {
        &self.player
    }

    pub fn tileset_count(&self) -> usize {
        self.tileset_count
    }

    pub fn maps(&self) -> &[TileMap] {
        &self.maps
    }

    pub fn into_world(self, config: WorldConfig) -> Result<StoryWorld, StoryLoadError> {
        let mut world = World::new(config);
        for map in self.maps {
            world.load_map(map)?;
        }
        let report = world.link_maps()?;

        let map = world
            .arena()
            .id_of(&self.start_map)
            .ok_or_else(|| StoryLoadError::UnknownStartMap {
                map: self.start_map.clone(),
            })?;
        let tile = self.start_tile;
        let in_bounds = world
            .arena()
            .get(map)
            .is_some_and(|start| start.contains(tile.x, tile.y));
        if !in_bounds {
            return Err(StoryLoadError::StartOutOfBounds {
                map: self.start_map,
                x: tile.x,
                y: tile.y,
            });
        }

        info!(
            story = self.name.as_str(),
            maps = world.arena().len(),
            linked = report.linked,
            non_reciprocal = report.non_reciprocal,
            "story_world_built"
        );
        Ok(StoryWorld {
            world,
            start: SpawnPoint { map, tile },
            player: self.player,
        })
    }
}

pub fn load_story(root: &Path) -> Result<Story, StoryLoadError> {
    let files = discover_story_files(root)?;
    let mut hasher = InputHasher::new();
    let mut story_file = None;
    let mut tileset_files = Vec::new();
    let mut map_files = Vec::new();

    for file in &files {
        let bytes = fs::read(&file.path).map_err(|source| StoryLoadError::ReadFile {
            path: file.path.clone(),
            source,
        })?;
        hasher.add_file(&file.normalized_rel, &bytes);
        match file.kind {
            StoryFileKind::Story => {
                story_file = Some((file.path.clone(), parse_json::<StoryFile>(&file.path, &bytes)?));
            }
            StoryFileKind::Tileset => {
                tileset_files.push((file.path.clone(), parse_json::<TilesetFile>(&file.path, &bytes)?));
            }
            StoryFileKind::Map => {
                map_files.push((file.path.clone(), parse_json::<MapFile>(&file.path, &bytes)?));
            }
        }
    }
    let input_count = hasher.file_count();
    let fingerprint = hasher.finish();
    let (story_path, story_file) = story_file.ok_or_else(|| StoryLoadError::MissingStoryFile {
        dir: root.to_path_buf(),
    })?;
    let player = story_file.player.to_profile();
    if !player.has_usable_speed() {
        return Err(StoryLoadError::InvalidMoveSpeed {
            path: story_path,
            speed: player.move_speed,
        });
    }

    let mut tilesets: HashMap<String, Arc<dyn TileQuery>> = HashMap::new();
    for (path, file) in tileset_files {
        if tilesets.contains_key(&file.name) {
            return Err(StoryLoadError::DuplicateTileset { name: file.name });
        }
        let tileset = build_tileset(&path, &file)?;
        debug!(
            tileset = file.name.as_str(),
            flagged_tiles = tileset.flagged_tile_count(),
            "tileset_loaded"
        );
        tilesets.insert(file.name, Arc::new(tileset));
    }

    let mut maps = Vec::with_capacity(map_files.len());
    for (path, file) in map_files {
        let map = build_map(&path, file, &tilesets)?;
        debug!(
            map = map.name(),
            width = map.width(),
            height = map.height(),
            layers = map.layer_count(),
            "map_loaded"
        );
        maps.push(map);
    }

    let (start_map, x, y) = story_file.start_map.parts();
    if !maps.iter().any(|map| map.name() == start_map) {
        return Err(StoryLoadError::UnknownStartMap {
            map: start_map.to_string(),
        });
    }

    info!(
        story = story_file.name.as_str(),
        root = %root.display(),
        files = input_count,
        tilesets = tilesets.len(),
        maps = maps.len(),
        fingerprint = fingerprint.as_str(),
        "story_loaded"
    );

    Ok(Story {
        start_map: start_map.to_string(),
        start_tile: TileCoord::new(x, y),
        player,
        name: story_file.name,
        root: root.to_path_buf(),
        fingerprint,
        tileset_count: tilesets.len(),
        maps,
    })
}

fn parse_json<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, StoryLoadError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        StoryLoadError::Parse {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })?;
    deserializer
        .end()
        .map_err(|source| StoryLoadError::Parse {
            path: path.to_path_buf(),
            json_path: ".".to_string(),
            source,
        })?;
    Ok(value)
}

fn build_tileset(path: &Path, file: &TilesetFile) -> Result<TileSet, StoryLoadError> {
    let mut tileset = TileSet::new(
        file.name.clone(),
        TileSize {
            width: file.tile_width,
            height: file.tile_height,
        },
    );
    for (key, names) in &file.tiles {
        let tile = key
            .trim()
            .parse::<i32>()
            .map_err(|_| StoryLoadError::InvalidTileId {
                path: path.to_path_buf(),
                key: key.clone(),
            })?;
        tileset.set_flags(tile, combine_flags(names));
    }
    Ok(tileset)
}

fn build_map(
    path: &Path,
    file: MapFile,
    tilesets: &HashMap<String, Arc<dyn TileQuery>>,
) -> Result<TileMap, StoryLoadError> {
    let tileset = tilesets
        .get(&file.tileset)
        .cloned()
        .ok_or_else(|| StoryLoadError::UnknownTileset {
            map: file.name.clone(),
            tileset: file.tileset.clone(),
        })?;
    let connections = connection_specs(&file)?;
    let layers = file
        .flipped_layers()
        .map_err(|tile| StoryLoadError::TileIdOffset {
            path: path.to_path_buf(),
            tile,
            offset: file.id_offset,
        })?;

    TileMap::new(
        MapData {
            name: file.name,
            width: file.width,
            height: file.height,
            layer_count: file.layers,
            layers,
            connections,
            music: file.music,
        },
        tileset,
    )
    .map_err(|source| StoryLoadError::Map {
        path: path.to_path_buf(),
        source,
    })
}

fn connection_specs(file: &MapFile) -> Result<Vec<ConnectionSpec>, StoryLoadError> {
    let invalid = |key: &str, reason: &'static str| StoryLoadError::InvalidConnection {
        map: file.name.clone(),
        key: key.to_string(),
        reason,
    };

    let mut targets: Vec<(Edge, String, Option<i32>)> = Vec::new();
    let mut flat_offsets: HashMap<Edge, (String, i32)> = HashMap::new();
    for (key, entry) in &file.connections {
        if let Some(edge_name) = key.strip_suffix("_offset") {
            let edge = Edge::parse(edge_name).ok_or_else(|| invalid(key, "unknown edge"))?;
            let ConnectionEntry::Offset(offset) = entry else {
                return Err(invalid(key, "offset must be an integer"));
            };
            flat_offsets.insert(edge, (key.clone(), *offset));
            continue;
        }
        let edge = Edge::parse(key).ok_or_else(|| invalid(key, "unknown edge"))?;
        match entry {
            ConnectionEntry::Target(target) => targets.push((edge, target.clone(), None)),
            ConnectionEntry::Linked { map, offset } => {
                targets.push((edge, map.clone(), Some(*offset)));
            }
            ConnectionEntry::Offset(_) => {
                return Err(invalid(key, "target must be a map name"));
            }
        }
    }

    let mut specs = Vec::with_capacity(targets.len());
    for (edge, target, nested_offset) in targets {
        let flat = flat_offsets.remove(&edge);
        let offset = match (nested_offset, flat) {
            (Some(_), Some((key, _))) => {
                return Err(invalid(&key, "offset given twice"));
            }
            (Some(offset), None) => offset,
            (None, Some((_, offset))) => offset,
            (None, None) => 0,
        };
        specs.push(ConnectionSpec {
            edge,
            target,
            offset,
        });
    }
    if let Some((key, _)) = flat_offsets.into_values().next() {
        return Err(invalid(&key, "offset without a target map"));
    }
    specs.sort_by_key(|spec| spec.edge.index());
    Ok(specs)
}
