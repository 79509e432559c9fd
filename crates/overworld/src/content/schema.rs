use std::collections::BTreeMap;

use serde::Deserialize;

use crate::movement::{MotionProfile, STANDARD_MOVE_SPEED};
use crate::world::{TileFlags, TileId, EMPTY_TILE};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StoryFile {
    pub name: String,
    pub start_map: StartMapEntry,
    #[serde(default)]
    pub player: PlayerEntry,
}

/// `{"map": "town", "x": 4, "y": 2}` or the short `["town", 4, 2]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StartMapEntry {
    Named { map: String, x: i32, y: i32 },
    Short(String, i32, i32),
}

impl StartMapEntry {
    pub fn parts(&self) -> (&str, i32, i32) {
        match self {
            StartMapEntry::Named { map, x, y } | StartMapEntry::Short(map, x, y) => (map, *x, *y),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlayerEntry {
    #[serde(default = "default_sprite")]
    pub sprite: String,
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    #[serde(default = "default_can_jump")]
    pub can_jump: bool,
}

impl Default for PlayerEntry {
    fn default() -> Self {
        Self {
            sprite: default_sprite(),
            move_speed: default_move_speed(),
            can_jump: default_can_jump(),
        }
    }
}

impl PlayerEntry {
    pub fn to_profile(&self) -> MotionProfile {
        MotionProfile {
            sprite: self.sprite.clone(),
            move_speed: self.move_speed,
            can_jump: self.can_jump,
        }
    }
}

fn default_sprite() -> String {
    "player".to_string()
}

fn default_move_speed() -> f32 {
    STANDARD_MOVE_SPEED
}

fn default_can_jump() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum TileFlagName {
    Solid,
    Encounter,
    LedgeDown,
    LedgeLeft,
    LedgeRight,
}

impl TileFlagName {
    fn bit(self) -> TileFlags {
        match self {
            TileFlagName::Solid => TileFlags::SOLID,
            TileFlagName::Encounter => TileFlags::ENCOUNTER,
            TileFlagName::LedgeDown => TileFlags::LEDGE_DOWN,
            TileFlagName::LedgeLeft => TileFlags::LEDGE_LEFT,
            TileFlagName::LedgeRight => TileFlags::LEDGE_RIGHT,
        }
    }
}

pub(crate) fn combine_flags(names: &[TileFlagName]) -> TileFlags {
    names
        .iter()
        .fold(TileFlags::NONE, |flags, name| flags | name.bit())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct TilesetFile {
    pub name: String,
    #[serde(alias = "width", default = "default_tile_px")]
    pub tile_width: u32,
    #[serde(alias = "height", default = "default_tile_px")]
    pub tile_height: u32,
    /// Keyed by tile id as a string, since JSON object keys are strings.
    #[serde(default)]
    pub tiles: BTreeMap<String, Vec<TileFlagName>>,
    /// Image atlas paths; kept for renderers, unused by movement.
    #[serde(default)]
    pub images: Vec<String>,
}

fn default_tile_px() -> u32 {
    32
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MapFile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub layers: usize,
    /// One array per layer, authored top row first.
    pub tiles: Vec<Vec<TileId>>,
    #[serde(default)]
    pub id_offset: TileId,
    pub tileset: String,
    #[serde(default)]
    pub music: Option<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionEntry>,
}

/// A connection value is either a target (`"south": "route_1"` or
/// `"south": {"map": "route_1", "offset": 2}`) or the offset half of the flat
/// form (`"south_offset": 2`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum ConnectionEntry {
    Target(String),
    Offset(i32),
    Linked {
        map: String,
        #[serde(default)]
        offset: i32,
    },
}

impl MapFile {
    /// Tile layers flipped to bottom row first with `id_offset` applied.
    /// Empty cells stay empty. Layers of the wrong length pass through
    /// untouched for `TileMap::new` to reject.
    ///
    /// Fails with the authored id when the offset overflows or would turn a
    /// real tile into an empty or negative id.
    pub fn flipped_layers(&self) -> Result<Vec<Vec<TileId>>, TileId> {
        let width = self.width as usize;
        let height = self.height as usize;
        self.tiles
            .iter()
            .map(|authored| {
                if authored.len() != width * height {
                    return Ok(authored.clone());
                }
                let mut layer = vec![EMPTY_TILE; width * height];
                for y in 0..height {
                    let rel_y = height - 1 - y;
                    for x in 0..width {
                        let tile = authored[x + y * width];
                        layer[x + rel_y * width] = self.offset_tile(tile)?;
                    }
                }
                Ok(layer)
            })
            .collect()
    }

    fn offset_tile(&self, tile: TileId) -> Result<TileId, TileId> {
        if tile == EMPTY_TILE {
            return Ok(EMPTY_TILE);
        }
        match tile.checked_add(self.id_offset) {
            Some(shifted) if shifted >= 0 => Ok(shifted),
            _ => Err(tile),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<T: serde::de::DeserializeOwned>(raw: &str) -> T {
        serde_json::from_str(raw).expect("parse")
    }

    #[test]
    fn start_map_accepts_both_forms() {
        let named: StoryFile = parse(r#"{"name":"s","start_map":{"map":"town","x":1,"y":2}}"#);
        let short: StoryFile = parse(r#"{"name":"s","start_map":["town",1,2]}"#);
        assert_eq!(named.start_map.parts(), ("town", 1, 2));
        assert_eq!(short.start_map.parts(), ("town", 1, 2));
        assert_eq!(short.player.move_speed, STANDARD_MOVE_SPEED);
    }

    #[test]
    fn tileset_accepts_width_alias_and_flag_names() {
        let set: TilesetFile =
            parse(r#"{"name":"t","width":16,"height":16,"tiles":{"4":["solid","encounter"]}}"#);
        assert_eq!(set.tile_width, 16);
        let flags = combine_flags(&set.tiles["4"]);
        assert!(flags.contains(TileFlags::SOLID));
        assert!(flags.contains(TileFlags::ENCOUNTER));
    }

    #[test]
    fn connection_entries_cover_flat_and_nested_forms() {
        let map: MapFile = parse(
            r#"{"name":"m","width":1,"height":1,"layers":1,"tiles":[[0]],"tileset":"t",
                "connections":{"south":"a","south_offset":2,"north":{"map":"b","offset":-1}}}"#,
        );
        assert_eq!(
            map.connections["south"],
            ConnectionEntry::Target("a".to_string())
        );
        assert_eq!(map.connections["south_offset"], ConnectionEntry::Offset(2));
        assert_eq!(
            map.connections["north"],
            ConnectionEntry::Linked {
                map: "b".to_string(),
                offset: -1
            }
        );
    }

    #[test]
    fn layers_flip_rows_and_offset_ids() {
        let map: MapFile = parse(
            r#"{"name":"m","width":2,"height":2,"layers":1,"tiles":[[1,2,3,-1]],
                "id_offset":10,"tileset":"t"}"#,
        );
        // Authored top row [1,2] becomes y=1.
        assert_eq!(map.flipped_layers(), Ok(vec![vec![13, EMPTY_TILE, 11, 12]]));
    }

    #[test]
    fn id_offset_cannot_overflow_or_reach_the_empty_id() {
        let shifted = |tiles: &str, offset: i32| {
            let map: MapFile = parse(&format!(
                r#"{{"name":"m","width":2,"height":1,"layers":1,"tiles":[{tiles}],
                    "id_offset":{offset},"tileset":"t"}}"#
            ));
            map.flipped_layers()
        };
        assert_eq!(shifted("[-1, 0]", -1), Err(0));
        assert_eq!(shifted("[2147483647, -1]", 1), Err(i32::MAX));
        assert_eq!(shifted("[-1, 5]", -5), Ok(vec![vec![EMPTY_TILE, 0]]));
    }
}
