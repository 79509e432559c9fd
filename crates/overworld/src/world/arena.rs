use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::tilemap::{Edge, MapConnection, MapId, TileMap};
use crate::app::EntityId;
use crate::movement::TileCoord;

/// How `MapArena::link` treats a connection whose target does not link back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// Log a warning and keep the one-way connection.
    #[default]
    Lenient,
    /// Refuse to link.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("a map named '{name}' is already loaded")]
    DuplicateMap { name: String },
    #[error("no map named '{name}' is loaded")]
    UnknownMap { name: String },
    #[error("map '{map}' {edge} connection targets unknown map '{target}'")]
    UnknownConnectionTarget {
        map: String,
        edge: Edge,
        target: String,
    },
    #[error("map '{map}' {edge} connection to '{target}' (offset {offset}) is not mirrored back")]
    NonReciprocalConnection {
        map: String,
        edge: Edge,
        target: String,
        offset: i32,
    },
    #[error("map '{name}' still holds {occupants} entities")]
    MapOccupied { name: String, occupants: usize },
    #[error("map '{name}' is still connected from '{referenced_by}'")]
    MapReferenced { name: String, referenced_by: String },
}

/// In-bounds cell, possibly on a neighbouring map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTile {
    pub map: MapId,
    pub tile: TileCoord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub linked: usize,
    pub non_reciprocal: usize,
}

#[derive(Debug)]
struct MapSlot {
    map: TileMap,
    occupants: Vec<EntityId>,
}

/// Owns every loaded map; everything else refers to maps by [`MapId`].
#[derive(Debug, Default)]
pub struct MapArena {
    slots: Vec<Option<MapSlot>>,
    ids_by_name: HashMap<String, MapId>,
}

impl MapArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, map: TileMap) -> Result<MapId, ArenaError> {
        if self.ids_by_name.contains_key(map.name()) {
            return Err(ArenaError::DuplicateMap {
                name: map.name().to_string(),
            });
        }
        let id = MapId(self.slots.len() as u32);
        debug!(map = %map, id = id.0, "map_inserted");
        self.ids_by_name.insert(map.name().to_string(), id);
        self.slots.push(Some(MapSlot {
            map,
            occupants: Vec::new(),
        }));
        Ok(id)
    }

    pub fn id_of(&self, name: &str) -> Option<MapId> {
        self.ids_by_name.get(name).copied()
    }

    pub fn get(&self, id: MapId) -> Option<&TileMap> {
        self.slot(id).map(|slot| &slot.map)
    }

    pub fn by_name(&self, name: &str) -> Option<&TileMap> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.ids_by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids_by_name.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MapId, &TileMap)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|slot| (MapId(idx as u32), &slot.map))
        })
    }

    fn slot(&self, id: MapId) -> Option<&MapSlot> {
        self.slots.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: MapId) -> Option<&mut MapSlot> {
        self.slots.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    /// Resolves every authored connection name to a handle, then checks that
    /// each connection is mirrored by its target.
    pub fn link(&mut self, policy: ConnectionPolicy) -> Result<LinkReport, ArenaError> {
        let mut resolved = Vec::<(MapId, Edge, MapConnection)>::new();
        for (id, map) in self.iter() {
            for spec in map.connection_specs() {
                let target =
                    self.id_of(&spec.target)
                        .ok_or_else(|| ArenaError::UnknownConnectionTarget {
                            map: map.name().to_string(),
                            edge: spec.edge,
                            target: spec.target.clone(),
                        })?;
                resolved.push((
                    id,
                    spec.edge,
                    MapConnection {
                        map: target,
                        offset: spec.offset,
                    },
                ));
            }
        }

        for slot in self.slots.iter_mut().flatten() {
            for edge in Edge::ALL {
                slot.map.set_connection(edge, None);
            }
        }
        for (id, edge, connection) in &resolved {
            if let Some(slot) = self.slot_mut(*id) {
                slot.map.set_connection(*edge, Some(*connection));
            }
        }

        let mut report = LinkReport {
            linked: resolved.len(),
            non_reciprocal: 0,
        };
        for (id, edge, connection) in &resolved {
            let mirrored = self
                .get(connection.map)
                .and_then(|target| target.connection(edge.opposite()))
                .is_some_and(|back| back.map == *id && back.offset == -connection.offset);
            if mirrored {
                continue;
            }
            let map = self.name_of(*id);
            let target = self.name_of(connection.map);
            if policy == ConnectionPolicy::Strict {
                return Err(ArenaError::NonReciprocalConnection {
                    map,
                    edge: *edge,
                    target,
                    offset: connection.offset,
                });
            }
            warn!(
                map = %map,
                edge = %edge,
                target = %target,
                offset = connection.offset,
                "connection_not_reciprocal"
            );
            report.non_reciprocal += 1;
        }

        info!(
            maps = self.len(),
            connections = report.linked,
            non_reciprocal = report.non_reciprocal,
            "maps_linked"
        );
        Ok(report)
    }

    /// Name of a loaded map, or `#<id>` for an unknown id.
    pub fn name_of(&self, id: MapId) -> String {
        self.get(id)
            .map(|map| map.name().to_string())
            .unwrap_or_else(|| format!("#{}", id.0))
    }

    /// Maps a local coordinate to the cell it names. Coordinates past an edge
    /// are translated through that edge's connection; `None` when there is no
    /// connection or the translated cell is outside the neighbour.
    pub fn resolve(&self, map: MapId, tile: TileCoord) -> Option<ResolvedTile> {
        let current = self.get(map)?;
        let width = current.width() as i32;
        let height = current.height() as i32;
        let edge = if tile.y >= height {
            Edge::North
        } else if tile.y < 0 {
            Edge::South
        } else if tile.x >= width {
            Edge::East
        } else if tile.x < 0 {
            Edge::West
        } else {
            return Some(ResolvedTile { map, tile });
        };

        let connection = current.connection(edge)?;
        let neighbor = self.get(connection.map)?;
        let translated = match edge {
            Edge::North => TileCoord::new(tile.x - connection.offset, tile.y - height),
            Edge::South => TileCoord::new(
                tile.x - connection.offset,
                neighbor.height() as i32 + tile.y,
            ),
            Edge::East => TileCoord::new(tile.x - width, tile.y - connection.offset),
            Edge::West => TileCoord::new(
                neighbor.width() as i32 + tile.x,
                tile.y - connection.offset,
            ),
        };
        neighbor
            .contains(translated.x, translated.y)
            .then_some(ResolvedTile {
                map: connection.map,
                tile: translated,
            })
    }

    /// Connection-aware passability used for movement.
    pub fn can_enter(&self, map: MapId, tile: TileCoord) -> bool {
        self.resolve(map, tile).is_some_and(|resolved| {
            self.get(resolved.map)
                .is_some_and(|target| target.can_move(resolved.tile.x, resolved.tile.y))
        })
    }

    pub fn occupants(&self, id: MapId) -> &[EntityId] {
        self.slot(id)
            .map(|slot| slot.occupants.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn add_occupant(&mut self, id: MapId, entity: EntityId) {
        if let Some(slot) = self.slot_mut(id) {
            if !slot.occupants.contains(&entity) {
                slot.occupants.push(entity);
            }
        }
    }

    pub(crate) fn remove_occupant(&mut self, id: MapId, entity: EntityId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.occupants.retain(|occupant| *occupant != entity);
        }
    }

    /// Removes a map that nothing stands on and nothing connects to.
    /// Its id is never reused.
    pub fn unload(&mut self, name: &str) -> Result<TileMap, ArenaError> {
        let id = self.id_of(name).ok_or_else(|| ArenaError::UnknownMap {
            name: name.to_string(),
        })?;
        let occupants = self.occupants(id).len();
        if occupants > 0 {
            return Err(ArenaError::MapOccupied {
                name: name.to_string(),
                occupants,
            });
        }
        for (other_id, other) in self.iter() {
            if other_id == id {
                continue;
            }
            let referenced = Edge::ALL
                .into_iter()
                .filter_map(|edge| other.connection(edge))
                .any(|connection| connection.map == id);
            if referenced {
                return Err(ArenaError::MapReferenced {
                    name: name.to_string(),
                    referenced_by: other.name().to_string(),
                });
            }
        }

        self.ids_by_name.remove(name);
        let slot = self.slots[id.0 as usize].take();
        info!(map = name, "map_unloaded");
        slot.map(|slot| slot.map).ok_or_else(|| ArenaError::UnknownMap {
            name: name.to_string(),
        })
    }
}
