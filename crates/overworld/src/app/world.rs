use thiserror::Error;
use tracing::{debug, info};

use super::input::InputSnapshot;
use crate::movement::{
    MotionEvent, MotionProfile, MoveIntent, MovementController, PlacementError, TileCoord,
};
use crate::world::{ArenaError, ConnectionPolicy, LinkReport, MapArena, MapId, TileMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorldConfig {
    pub connection_policy: ConnectionPolicy,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("entity {} does not exist", id.0)]
    UnknownEntity { id: EntityId },
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    Motion {
        entity: EntityId,
        event: MotionEvent,
    },
    /// Emitted once the entity has been re-parented onto `to`.
    MapChanged {
        entity: EntityId,
        from: MapId,
        to: MapId,
        music_exit: Option<String>,
        music_enter: Option<String>,
    },
}

#[derive(Debug)]
pub struct Actor {
    id: EntityId,
    name: String,
    controller: MovementController,
    intent: Box<dyn MoveIntent>,
}

impl Actor {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &MovementController {
        &self.controller
    }

    pub fn intent_finished(&self) -> bool {
        self.intent.is_finished()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MapTransfer {
    entity: EntityId,
    from: MapId,
    to: MapId,
}

/// Owns the map arena and every actor walking on it.
///
/// Spawns, despawns and map re-parenting are queued during `tick` and take
/// effect in `apply_pending`.
#[derive(Debug, Default)]
pub struct World {
    config: WorldConfig,
    arena: MapArena,
    allocator: EntityIdAllocator,
    actors: Vec<Actor>,
    pending_spawns: Vec<Actor>,
    pending_despawns: Vec<EntityId>,
    pending_transfers: Vec<MapTransfer>,
    events: Vec<WorldEvent>,
    scratch: Vec<MotionEvent>,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn arena(&self) -> &MapArena {
        &self.arena
    }

    pub fn load_map(&mut self, map: TileMap) -> Result<MapId, ArenaError> {
        self.arena.insert(map)
    }

    pub fn link_maps(&mut self) -> Result<LinkReport, ArenaError> {
        self.arena.link(self.config.connection_policy)
    }

    pub fn unload_map(&mut self, name: &str) -> Result<TileMap, ArenaError> {
        self.arena.unload(name)
    }

    /// Validates the placement now; the actor joins the world on the next
    /// `apply_pending`.
    pub fn spawn(
        &mut self,
        name: impl Into<String>,
        map: MapId,
        tile: TileCoord,
        profile: MotionProfile,
        intent: Box<dyn MoveIntent>,
    ) -> Result<EntityId, PlacementError> {
        let controller = MovementController::new(&self.arena, map, tile, profile)?;
        let id = self.allocator.allocate();
        self.pending_spawns.push(Actor {
            id,
            name: name.into(),
            controller,
            intent,
        });
        Ok(id)
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let exists_now = self.actors.iter().any(|actor| actor.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|actor| actor.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    pub fn teleport(
        &mut self,
        id: EntityId,
        map: MapId,
        tile: TileCoord,
        snap: bool,
    ) -> Result<(), WorldError> {
        let actor = self
            .actors
            .iter_mut()
            .find(|actor| actor.id == id)
            .ok_or(WorldError::UnknownEntity { id })?;
        let from = actor.controller.map();
        actor.controller.set_position(&self.arena, map, tile, snap)?;
        if from != map {
            self.pending_transfers.push(MapTransfer {
                entity: id,
                from,
                to: map,
            });
        }
        Ok(())
    }

    pub fn tick(&mut self, dt: f32, input: &InputSnapshot) {
        for actor in &mut self.actors {
            let direction = actor.intent.decide(input, &actor.controller);
            actor.controller.move_toward(direction);

            self.scratch.clear();
            actor.controller.update(dt, &self.arena, &mut self.scratch);
            for event in &self.scratch {
                actor.intent.observe(event);
                if let MotionEvent::CrossedMap { from, to, .. } = *event {
                    self.pending_transfers.push(MapTransfer {
                        entity: actor.id,
                        from,
                        to,
                    });
                }
                self.events.push(WorldEvent::Motion {
                    entity: actor.id,
                    event: *event,
                });
            }
        }
    }

    pub fn apply_pending(&mut self) {
        for transfer in self.pending_transfers.drain(..) {
            self.arena.remove_occupant(transfer.from, transfer.entity);
            self.arena.add_occupant(transfer.to, transfer.entity);
            let music_exit = self
                .arena
                .get(transfer.from)
                .and_then(|map| map.music().map(str::to_string));
            let music_enter = self
                .arena
                .get(transfer.to)
                .and_then(|map| map.music().map(str::to_string));
            info!(
                entity = transfer.entity.0,
                from = transfer.from.0,
                to = transfer.to.0,
                music_exit = music_exit.as_deref().unwrap_or("none"),
                music_enter = music_enter.as_deref().unwrap_or("none"),
                "map_entered"
            );
            self.events.push(WorldEvent::MapChanged {
                entity: transfer.entity,
                from: transfer.from,
                to: transfer.to,
                music_exit,
                music_enter,
            });
        }

        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_by_key(|id| id.0);
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            let is_pending = |id: EntityId| pending.binary_search_by_key(&id.0, |id| id.0).is_ok();

            for actor in self.actors.iter().filter(|actor| is_pending(actor.id)) {
                self.arena.remove_occupant(actor.controller.map(), actor.id);
                debug!(entity = actor.id.0, name = actor.name.as_str(), "actor_despawned");
            }
            self.actors.retain(|actor| !is_pending(actor.id));
            self.pending_spawns.retain(|actor| !is_pending(actor.id));
            self.pending_despawns.clear();
        }

        for actor in self.pending_spawns.drain(..) {
            self.arena.add_occupant(actor.controller.map(), actor.id);
            debug!(
                entity = actor.id.0,
                name = actor.name.as_str(),
                map = actor.controller.map().0,
                x = actor.controller.tile().x,
                y = actor.controller.tile().y,
                "actor_spawned"
            );
            self.actors.push(actor);
        }
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn actor(&self, id: EntityId) -> Option<&Actor> {
        self.actors.iter().find(|actor| actor.id == id)
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// True when every actor is idle and has nothing left to do.
    pub fn is_settled(&self) -> bool {
        self.pending_spawns.is_empty()
            && self
                .actors
                .iter()
                .all(|actor| actor.intent.is_finished() && actor.controller.is_idle())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::movement::{Direction, PlayerIntent, ScriptedRoute, Stationary};
    use crate::world::{
        ConnectionSpec, Edge, MapData, TileFlags, TileQuery, TileSet, TileSize,
    };

    const DT: f32 = 1.0 / 60.0;

    fn tileset() -> Arc<dyn TileQuery> {
        Arc::new(TileSet::new("test", TileSize::default()).with_flags(1, TileFlags::SOLID))
    }

    fn map(name: &str, height: u32, connection: ConnectionSpec, music: &str) -> TileMap {
        TileMap::new(
            MapData {
                name: name.to_string(),
                width: 6,
                height,
                layer_count: 1,
                layers: vec![vec![0; (6 * height) as usize]],
                connections: vec![connection],
                music: Some(music.to_string()),
            },
            tileset(),
        )
        .expect("map")
    }

    fn linked_world() -> (World, MapId, MapId) {
        let mut world = World::new(WorldConfig {
            connection_policy: ConnectionPolicy::Strict,
        });
        let town = world
            .load_map(map(
                "town",
                4,
                ConnectionSpec {
                    edge: Edge::South,
                    target: "route".to_string(),
                    offset: 0,
                },
                "town_theme",
            ))
            .expect("town");
        let route = world
            .load_map(map(
                "route",
                4,
                ConnectionSpec {
                    edge: Edge::North,
                    target: "town".to_string(),
                    offset: 0,
                },
                "route_theme",
            ))
            .expect("route");
        world.link_maps().expect("link");
        (world, town, route)
    }

    fn run(world: &mut World, frames: usize) {
        let input = InputSnapshot::empty();
        for _ in 0..frames {
            world.tick(DT, &input);
            world.apply_pending();
        }
    }

    #[test]
    fn spawn_is_deferred_until_apply_pending() {
        let (mut world, town, _) = linked_world();
        let id = world
            .spawn(
                "npc",
                town,
                TileCoord::new(1, 1),
                MotionProfile::default(),
                Box::new(Stationary),
            )
            .expect("spawn");

        assert_eq!(world.actor_count(), 0);
        assert!(world.arena().occupants(town).is_empty());

        world.apply_pending();
        assert_eq!(world.actor_count(), 1);
        assert_eq!(world.arena().occupants(town), &[id]);
        assert_eq!(world.actor(id).expect("actor").name(), "npc");
    }

    #[test]
    fn spawn_rejects_bad_placement() {
        let (mut world, town, _) = linked_world();
        let result = world.spawn(
            "npc",
            town,
            TileCoord::new(6, 0),
            MotionProfile::default(),
            Box::new(Stationary),
        );
        assert!(matches!(result, Err(PlacementError::OutOfBounds { .. })));
    }

    #[test]
    fn crossing_moves_occupant_after_iteration() {
        let (mut world, town, route) = linked_world();
        let id = world
            .spawn(
                "walker",
                town,
                TileCoord::new(2, 0),
                MotionProfile::default(),
                Box::new(ScriptedRoute::parse("down:1").expect("route")),
            )
            .expect("spawn");
        world.apply_pending();

        run(&mut world, 60);

        let actor = world.actor(id).expect("actor");
        assert_eq!(actor.controller().map(), route);
        assert_eq!(actor.controller().tile(), TileCoord::new(2, 3));
        assert!(world.arena().occupants(town).is_empty());
        assert_eq!(world.arena().occupants(route), &[id]);
        assert!(world.is_settled());

        let events = world.drain_events();
        assert!(events.contains(&WorldEvent::MapChanged {
            entity: id,
            from: town,
            to: route,
            music_exit: Some("town_theme".to_string()),
            music_enter: Some("route_theme".to_string()),
        }));
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn occupied_or_referenced_maps_cannot_be_unloaded() {
        let (mut world, town, _) = linked_world();
        world
            .spawn(
                "npc",
                town,
                TileCoord::new(0, 0),
                MotionProfile::default(),
                Box::new(Stationary),
            )
            .expect("spawn");
        world.apply_pending();

        assert!(matches!(
            world.unload_map("town"),
            Err(ArenaError::MapOccupied { occupants: 1, .. })
        ));
        assert!(matches!(
            world.unload_map("route"),
            Err(ArenaError::MapReferenced { .. })
        ));
    }

    #[test]
    fn despawn_removes_actor_and_occupancy() {
        let (mut world, town, _) = linked_world();
        let id = world
            .spawn(
                "npc",
                town,
                TileCoord::new(0, 0),
                MotionProfile::default(),
                Box::new(Stationary),
            )
            .expect("spawn");
        world.apply_pending();

        assert!(world.despawn(id));
        assert!(!world.despawn(EntityId(999)));
        world.apply_pending();

        assert_eq!(world.actor_count(), 0);
        assert!(world.arena().occupants(town).is_empty());
    }

    #[test]
    fn despawn_before_apply_cancels_spawn() {
        let (mut world, town, _) = linked_world();
        let id = world
            .spawn(
                "ghost",
                town,
                TileCoord::new(0, 0),
                MotionProfile::default(),
                Box::new(Stationary),
            )
            .expect("spawn");
        assert!(world.despawn(id));
        world.apply_pending();

        assert_eq!(world.actor_count(), 0);
        assert!(world.arena().occupants(town).is_empty());
    }

    #[test]
    fn teleport_across_maps_reparents() {
        let (mut world, town, route) = linked_world();
        let id = world
            .spawn(
                "npc",
                town,
                TileCoord::new(0, 0),
                MotionProfile::default(),
                Box::new(Stationary),
            )
            .expect("spawn");
        world.apply_pending();

        world
            .teleport(id, route, TileCoord::new(3, 3), true)
            .expect("teleport");
        world.apply_pending();

        assert_eq!(world.arena().occupants(route), &[id]);
        assert!(matches!(
            world.teleport(EntityId(42), town, TileCoord::new(0, 0), true),
            Err(WorldError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn player_intent_reads_tick_input() {
        let (mut world, town, _) = linked_world();
        let id = world
            .spawn(
                "player",
                town,
                TileCoord::new(1, 1),
                MotionProfile::default(),
                Box::new(PlayerIntent),
            )
            .expect("spawn");
        world.apply_pending();

        let held = InputSnapshot::empty()
            .with_action_down(crate::app::InputAction::MoveRight, true);
        world.tick(DT, &held);
        world.apply_pending();
        run(&mut world, 30);

        let controller = world.actor(id).expect("actor").controller();
        assert_eq!(controller.tile(), TileCoord::new(2, 1));
        assert_eq!(controller.look_direction(), Direction::Right);
    }
}
