mod controller;
mod geometry;
mod intent;

pub use controller::{
    MotionEvent, MotionProfile, MotionState, MovementController, PlacementError,
    LEDGE_JUMP_TILES, STANDARD_MOVE_SPEED,
};
pub use geometry::{Direction, TileCoord, Vec3};
pub use intent::{MoveIntent, PlayerIntent, RouteLeg, ScriptedRoute, Stationary};
