use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod content;
pub mod movement;
pub mod world;

pub use app::{
    Actor, EntityId, FixedStepClock, InputAction, InputSnapshot, LoopConfig, StepPlan,
    TickMetrics, TickMetricsSnapshot, World, WorldConfig, WorldError, WorldEvent,
};
pub use content::{load_story, SpawnPoint, Story, StoryLoadError, StoryWorld};
pub use movement::{
    Direction, MotionEvent, MotionProfile, MotionState, MoveIntent, MovementController,
    PlacementError, PlayerIntent, RouteLeg, ScriptedRoute, Stationary, TileCoord, Vec3,
    LEDGE_JUMP_TILES, STANDARD_MOVE_SPEED,
};
pub use world::{
    ArenaError, ConnectionPolicy, ConnectionSpec, Edge, LinkReport, MapArena, MapConnection,
    MapData, MapId, ResolvedTile, TileFlags, TileId, TileMap, TileMapError, TileQuery, TileSet,
    TileSize, EMPTY_TILE,
};

pub const STORY_ENV_VAR: &str = "OVERWORLD_STORY";
/// Story used when neither an argument nor the env var names one.
pub const DEFAULT_STORY_REL: &str = "assets/demo";
const STORY_FILE_NAME: &str = "story.json";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("story directory {path} does not contain story.json")]
    InvalidStoryDir { path: PathBuf },
    #[error(
        "Could not find assets/demo/story.json walking upward from {start_dir}.\n\
Pass a story directory as the first argument or set {env_var}, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/story\""
    )]
    StoryNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

/// Picks the story directory: `explicit`, then `OVERWORLD_STORY`, then the
/// bundled demo found by walking upward from the executable.
pub fn resolve_story_dir(explicit: Option<PathBuf>) -> Result<PathBuf, StartupError> {
    if let Some(path) = explicit {
        return validate_story_dir(&path);
    }

    match env::var(STORY_ENV_VAR) {
        Ok(value) => validate_story_dir(Path::new(&value)),
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;
            find_story_upward(&exe_dir).ok_or_else(|| StartupError::StoryNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: STORY_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: STORY_ENV_VAR,
            source,
        }),
    }
}

fn find_story_upward(start_dir: &Path) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .map(|candidate| candidate.join(DEFAULT_STORY_REL))
        .find(|candidate| is_story_dir(candidate))
        .map(|found| normalize_path(&found))
}

fn validate_story_dir(path: &Path) -> Result<PathBuf, StartupError> {
    let normalized = normalize_path(path);
    if is_story_dir(&normalized) {
        Ok(normalized)
    } else {
        Err(StartupError::InvalidStoryDir { path: normalized })
    }
}

fn is_story_dir(path: &Path) -> bool {
    path.join(STORY_FILE_NAME).is_file()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
