use thiserror::Error;
use tracing::{debug, trace};

use super::geometry::{Direction, TileCoord, Vec3};
use crate::world::{Edge, MapArena, MapId, ResolvedTile, TileSize};

/// Walking speed in pixels per second.
pub const STANDARD_MOVE_SPEED: f32 = 128.0;
/// Tiles covered by a ledge hop.
pub const LEDGE_JUMP_TILES: i32 = 2;
/// Upper bound on tile commits inside a single `update`.
const MAX_COMMITS_PER_UPDATE: u32 = 64;

/// Capability record an entity is spawned with.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionProfile {
    pub sprite: String,
    pub move_speed: f32,
    pub can_jump: bool,
}

impl MotionProfile {
    /// Finite and positive; anything else can never reach a tile boundary.
    pub fn has_usable_speed(&self) -> bool {
        self.move_speed.is_finite() && self.move_speed > 0.0
    }
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            sprite: "player".to_string(),
            move_speed: STANDARD_MOVE_SPEED,
            can_jump: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MotionState {
    #[default]
    Idle,
    Moving {
        direction: Direction,
    },
    Jumping {
        direction: Direction,
        distance: u8,
    },
}

impl MotionState {
    pub fn direction(self) -> Option<Direction> {
        match self {
            MotionState::Idle => None,
            MotionState::Moving { direction } | MotionState::Jumping { direction, .. } => {
                Some(direction)
            }
        }
    }

    pub fn is_idle(self) -> bool {
        matches!(self, MotionState::Idle)
    }
}

/// Observable outcome of an `update`, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionEvent {
    /// A one-tile segment began.
    Started {
        direction: Direction,
        target: TileCoord,
    },
    /// A ledge hop began.
    Jumped {
        direction: Direction,
        target: TileCoord,
        distance: u8,
    },
    /// A walking segment finished on `tile`.
    Stepped { map: MapId, tile: TileCoord },
    /// A ledge hop finished on `tile`.
    Landed { map: MapId, tile: TileCoord },
    /// The controller settled on `tile`.
    Stopped { map: MapId, tile: TileCoord },
    CrossedMap {
        from: MapId,
        to: MapId,
        edge: Edge,
        tile: TileCoord,
    },
    EnteredEncounter { map: MapId, tile: TileCoord },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("map #{} is not loaded", map.0)]
    UnknownMap { map: MapId },
    #[error("tile ({x}, {y}) is outside map '{map}'")]
    OutOfBounds { map: String, x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Walk { target: TileCoord },
    Jump { target: TileCoord, distance: u8 },
}

/// Height profile of a ledge hop. `z` starts and ends at 0 over `duration`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct JumpArc {
    launch_speed: f32,
    gravity: f32,
    duration: f32,
    elapsed: f32,
}

impl JumpArc {
    fn launch(launch_speed: f32, duration: f32) -> Self {
        Self {
            launch_speed,
            gravity: 2.0 * launch_speed / duration,
            duration,
            elapsed: 0.0,
        }
    }

    fn advance(&mut self, dt: f32) -> (f32, f32) {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        let t = self.elapsed;
        let z = self.launch_speed * t - 0.5 * self.gravity * t * t;
        let vz = self.launch_speed - self.gravity * t;
        (z.max(0.0), vz)
    }
}

/// Grid-locked movement for one entity.
///
/// Tile coordinates change only at tile boundaries. While idle the pixel
/// position is exactly `tile * tile_size`; requested direction changes wait
/// for the current segment to finish.
#[derive(Debug)]
pub struct MovementController {
    profile: MotionProfile,
    map: MapId,
    tile_size: TileSize,
    tile: TileCoord,
    target: TileCoord,
    position: Vec3,
    velocity: Vec3,
    look_direction: Direction,
    next_move: Option<Direction>,
    state: MotionState,
    jump: JumpArc,
    step_parity: bool,
    anim_time: f32,
}

impl MovementController {
    pub fn new(
        arena: &MapArena,
        map: MapId,
        tile: TileCoord,
        profile: MotionProfile,
    ) -> Result<Self, PlacementError> {
        let mut controller = Self {
            profile,
            map,
            tile_size: TileSize::default(),
            tile,
            target: tile,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            look_direction: Direction::Down,
            next_move: None,
            state: MotionState::Idle,
            jump: JumpArc::default(),
            step_parity: false,
            anim_time: 0.0,
        };
        controller.set_position(arena, map, tile, true)?;
        Ok(controller)
    }

    pub fn profile(&self) -> &MotionProfile {
        &self.profile
    }

    pub fn map(&self) -> MapId {
        self.map
    }

    pub fn tile(&self) -> TileCoord {
        self.tile
    }

    pub fn target(&self) -> TileCoord {
        self.target
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn look_direction(&self) -> Direction {
        self.look_direction
    }

    pub fn move_direction(&self) -> Option<Direction> {
        self.state.direction()
    }

    pub fn next_move(&self) -> Option<Direction> {
        self.next_move
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn jump_distance(&self) -> u8 {
        match self.state {
            MotionState::Jumping { distance, .. } => distance,
            _ => 0,
        }
    }

    /// Flips each time the controller starts moving from rest.
    pub fn step_parity(&self) -> bool {
        self.step_parity
    }

    pub fn anim_time(&self) -> f32 {
        self.anim_time
    }

    /// Records the requested direction. Only an idle controller turns to face
    /// it straight away; a segment in flight is never interrupted.
    pub fn move_toward(&mut self, direction: Option<Direction>) {
        if let Some(direction) = direction {
            if self.state.is_idle() {
                self.look_direction = direction;
            }
        }
        self.next_move = direction;
    }

    /// Places the controller on `tile` of `map`.
    ///
    /// With `snap` the controller stops dead. Without it a held direction
    /// carries on from the new tile when the way ahead is open.
    pub fn set_position(
        &mut self,
        arena: &MapArena,
        map: MapId,
        tile: TileCoord,
        snap: bool,
    ) -> Result<(), PlacementError> {
        let target_map = arena.get(map).ok_or(PlacementError::UnknownMap { map })?;
        if !target_map.contains(tile.x, tile.y) {
            return Err(PlacementError::OutOfBounds {
                map: target_map.name().to_string(),
                x: tile.x,
                y: tile.y,
            });
        }

        self.map = map;
        self.tile_size = target_map.tile_size();
        self.tile = tile;
        self.target = tile;
        self.align_to_tile();

        if snap {
            self.next_move = None;
            self.halt();
            return Ok(());
        }

        if self.state.is_idle() {
            return Ok(());
        }
        // The segment in flight belonged to the old tile; only a held direction survives.
        let resumed = self.next_move.and_then(|direction| {
            self.plan_step(arena, direction)
                .map(|step| (step, direction))
        });
        match resumed {
            Some((step, direction)) => {
                self.begin(step, direction);
            }
            None => self.halt(),
        }
        Ok(())
    }

    /// Advances the controller by `dt` seconds.
    ///
    /// Integration stops at every tile boundary, commits the tile and carries
    /// the leftover time into the next segment, so a long frame can never
    /// skip a passability check.
    pub fn update(&mut self, dt: f32, arena: &MapArena, events: &mut Vec<MotionEvent>) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        if self.state.is_idle() {
            let Some(direction) = self.next_move else {
                return;
            };
            let Some(step) = self.plan_step(arena, direction) else {
                return;
            };
            events.push(self.begin(step, direction));
        }

        self.anim_time += dt;
        let mut remaining = dt;
        let mut commits = 0u32;
        while remaining > 0.0 {
            let Some(direction) = self.state.direction() else {
                break;
            };
            let speed = self.velocity.axis(direction).abs();
            if speed <= 0.0 {
                break;
            }
            let boundary = self.boundary(direction);
            let distance = ((boundary - self.position.axis(direction)) * direction.sign()).max(0.0);
            let time_to_boundary = distance / speed;
            if time_to_boundary > remaining {
                self.integrate(remaining);
                break;
            }

            self.integrate(time_to_boundary);
            self.position.set_axis(direction, boundary);
            remaining -= time_to_boundary;
            self.commit(direction, arena, events);

            commits += 1;
            if commits >= MAX_COMMITS_PER_UPDATE {
                debug!(commits, "movement_commit_limit_reached");
                break;
            }
        }
    }

    fn plan_step(&self, arena: &MapArena, direction: Direction) -> Option<Step> {
        if !self.profile.has_usable_speed() {
            return None;
        }
        let ahead = self.tile.step(direction, 1);
        let ResolvedTile { map, tile } = arena.resolve(self.map, ahead)?;
        let ahead_map = arena.get(map)?;
        if !ahead_map.can_move(tile.x, tile.y) {
            return None;
        }
        // Ledges only open one way.
        if ahead_map.has_ledge(tile.x, tile.y, direction.opposite()) {
            return None;
        }
        if !ahead_map.has_ledge(tile.x, tile.y, direction) {
            return Some(Step::Walk { target: ahead });
        }

        if !self.profile.can_jump {
            return None;
        }
        let landing = self.tile.step(direction, LEDGE_JUMP_TILES);
        if !arena.can_enter(self.map, landing) {
            return None;
        }
        Some(Step::Jump {
            target: landing,
            distance: LEDGE_JUMP_TILES as u8,
        })
    }

    fn begin(&mut self, step: Step, direction: Direction) -> MotionEvent {
        let speed = self.profile.move_speed;
        self.look_direction = direction;
        self.velocity = Vec3::ZERO;
        // Chained segments keep the stride; only a fresh start swaps feet.
        if self.state.is_idle() {
            self.step_parity = !self.step_parity;
        }

        match step {
            Step::Walk { target } => {
                self.target = target;
                self.state = MotionState::Moving { direction };
                self.jump = JumpArc::default();
                self.velocity.set_axis(direction, direction.sign() * speed);
                trace!(direction = direction.name(), x = target.x, y = target.y, "segment_started");
                MotionEvent::Started { direction, target }
            }
            Step::Jump { target, distance } => {
                let hop_speed = speed * f32::from(distance);
                let covered = f32::from(distance) * self.axis_pixels(direction);
                self.target = target;
                self.state = MotionState::Jumping {
                    direction,
                    distance,
                };
                self.jump = JumpArc::launch(hop_speed, covered / hop_speed);
                self.velocity.set_axis(direction, direction.sign() * hop_speed);
                self.velocity.z = hop_speed;
                debug!(direction = direction.name(), x = target.x, y = target.y, distance, "ledge_jump_started");
                MotionEvent::Jumped {
                    direction,
                    target,
                    distance,
                }
            }
        }
    }

    fn integrate(&mut self, dt: f32) {
        self.position.x += self.velocity.x * dt;
        self.position.y += self.velocity.y * dt;
        if matches!(self.state, MotionState::Jumping { .. }) {
            let (z, vz) = self.jump.advance(dt);
            self.position.z = z;
            self.velocity.z = vz;
        }
    }

    fn commit(&mut self, direction: Direction, arena: &MapArena, events: &mut Vec<MotionEvent>) {
        let jumped = matches!(self.state, MotionState::Jumping { .. });
        let previous = self.tile;
        self.tile = self.target;

        let in_bounds = arena
            .get(self.map)
            .is_some_and(|map| map.contains(self.tile.x, self.tile.y));
        if !in_bounds {
            match arena.resolve(self.map, self.tile) {
                Some(resolved) => self.cross_into(resolved, direction, arena, events),
                None => {
                    // Neighbour vanished mid-segment; fall back to the last good tile.
                    debug!(x = self.tile.x, y = self.tile.y, "crossing_target_lost");
                    self.tile = previous;
                    self.target = previous;
                    self.next_move = None;
                    self.halt();
                    events.push(MotionEvent::Stopped {
                        map: self.map,
                        tile: self.tile,
                    });
                    return;
                }
            }
        }

        if jumped {
            self.position.z = 0.0;
            self.velocity.z = 0.0;
            self.jump = JumpArc::default();
            events.push(MotionEvent::Landed {
                map: self.map,
                tile: self.tile,
            });
        } else {
            events.push(MotionEvent::Stepped {
                map: self.map,
                tile: self.tile,
            });
        }

        if arena
            .get(self.map)
            .is_some_and(|map| map.is_encounter(self.tile.x, self.tile.y))
        {
            events.push(MotionEvent::EnteredEncounter {
                map: self.map,
                tile: self.tile,
            });
        }

        if self.next_move == Some(direction) {
            if let Some(step) = self.plan_step(arena, direction) {
                events.push(self.begin(step, direction));
                return;
            }
        }

        self.halt();
        events.push(MotionEvent::Stopped {
            map: self.map,
            tile: self.tile,
        });
    }

    fn cross_into(
        &mut self,
        resolved: ResolvedTile,
        direction: Direction,
        arena: &MapArena,
        events: &mut Vec<MotionEvent>,
    ) {
        let from = self.map;
        self.map = resolved.map;
        self.tile = resolved.tile;
        self.target = resolved.tile;
        if let Some(map) = arena.get(resolved.map) {
            self.tile_size = map.tile_size();
        }
        let z = self.position.z;
        self.align_to_tile();
        self.position.z = z;
        debug!(
            from = from.0,
            to = resolved.map.0,
            x = resolved.tile.x,
            y = resolved.tile.y,
            "map_boundary_crossed"
        );
        events.push(MotionEvent::CrossedMap {
            from,
            to: resolved.map,
            edge: Edge::toward(direction),
            tile: resolved.tile,
        });
    }

    fn halt(&mut self) {
        self.state = MotionState::Idle;
        self.velocity = Vec3::ZERO;
        self.jump = JumpArc::default();
        self.target = self.tile;
        self.anim_time = 0.0;
        self.align_to_tile();
    }

    fn align_to_tile(&mut self) {
        self.position = Vec3 {
            x: self.tile.x as f32 * self.tile_size.width as f32,
            y: self.tile.y as f32 * self.tile_size.height as f32,
            z: 0.0,
        };
    }

    fn axis_pixels(&self, direction: Direction) -> f32 {
        if direction.is_vertical() {
            self.tile_size.height as f32
        } else {
            self.tile_size.width as f32
        }
    }

    fn boundary(&self, direction: Direction) -> f32 {
        let cell = if direction.is_vertical() {
            self.target.y
        } else {
            self.target.x
        };
        cell as f32 * self.axis_pixels(direction)
    }
}
