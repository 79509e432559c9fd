use std::path::PathBuf;
use std::time::{Duration, Instant};

use overworld::{
    load_story, resolve_story_dir, ConnectionPolicy, EntityId, FixedStepClock, InputSnapshot,
    LoopConfig, MotionEvent, PlacementError, ScriptedRoute, StartupError, StoryLoadError,
    StoryWorld, TickMetrics, TickMetricsSnapshot, TileCoord, WorldConfig, WorldError, WorldEvent,
};
use thiserror::Error;
use tracing::{debug, info};

/// Crosses into the route, hops both ledges and walks through tall grass.
pub const DEFAULT_ROUTE: &str = "left:2,down:3,right:2,down:6,right:1,up:2";
pub const DEFAULT_MAX_FRAMES: u32 = 3600;
pub const DEFAULT_FRAME_MS: u64 = 16;
const PLAYER_NAME: &str = "player";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub story_dir: Option<PathBuf>,
    pub route: String,
    pub max_frames: u32,
    pub frame_ms: u64,
    pub target_tps: u32,
    pub connection_policy: ConnectionPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            story_dir: None,
            route: DEFAULT_ROUTE.to_string(),
            max_frames: DEFAULT_MAX_FRAMES,
            frame_ms: DEFAULT_FRAME_MS,
            target_tps: LoopConfig::default().target_tps,
            connection_policy: ConnectionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Run(RunOptions),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Story(#[from] StoryLoadError),
    #[error("failed to place the player: {0}")]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("invalid route '{route}' (expected legs like \"up:3,left\")")]
    InvalidRoute { route: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub story: String,
    pub fingerprint: String,
    pub frames: u32,
    pub ticks: u64,
    pub settled: bool,
    pub map: String,
    pub tile: TileCoord,
    pub map_changes: u32,
    pub encounters: u32,
    pub ledge_jumps: u32,
}

pub fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut options = RunOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--route" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --route".to_string())?;
                if ScriptedRoute::parse(value).is_none() {
                    return Err(format!(
                        "invalid --route value '{value}' (expected e.g. \"down:3,left\")"
                    ));
                }
                options.route = value.clone();
                index += 2;
            }
            "--max-frames" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --max-frames".to_string())?;
                options.max_frames = value
                    .parse::<u32>()
                    .map_err(|_| format!("invalid --max-frames value '{value}' (expected u32)"))?;
                index += 2;
            }
            "--frame-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --frame-ms".to_string())?;
                options.frame_ms = value
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        format!("invalid --frame-ms value '{value}' (expected u64 > 0)")
                    })?;
                index += 2;
            }
            "--tps" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --tps".to_string())?;
                options.target_tps = value
                    .parse::<u32>()
                    .ok()
                    .filter(|tps| *tps > 0)
                    .ok_or_else(|| format!("invalid --tps value '{value}' (expected u32 > 0)"))?;
                index += 2;
            }
            "--strict" => {
                options.connection_policy = ConnectionPolicy::Strict;
                index += 1;
            }
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag '{flag}'"));
            }
            path => {
                if options.story_dir.is_some() {
                    return Err(format!("unexpected extra argument '{path}'"));
                }
                options.story_dir = Some(PathBuf::from(path));
                index += 1;
            }
        }
    }
    Ok(Command::Run(options))
}

pub fn usage_text() -> String {
    [
        "overworld_runner - headless tile-movement simulation",
        "",
        "Usage:",
        "  overworld_runner [story-dir] [--route <legs>] [--max-frames <u32>] [--frame-ms <u64>] [--tps <u32>] [--strict]",
        "",
        "Story directory lookup:",
        "  story-dir argument, then $OVERWORLD_STORY, then assets/demo above the executable",
        "",
        "Defaults:",
        "  --route left:2,down:3,right:2,down:6,right:1,up:2",
        "  --max-frames 3600",
        "  --frame-ms 16",
        "  --tps 60",
    ]
    .join("\n")
}

/// Loads the story, walks the player along the route on a fixed-step clock
/// fed with synthetic frame times, and stops once the world settles or the
/// frame budget runs out.
pub fn run(options: &RunOptions) -> Result<RunSummary, RunError> {
    let route = ScriptedRoute::parse(&options.route).ok_or_else(|| RunError::InvalidRoute {
        route: options.route.clone(),
    })?;
    let story_dir = resolve_story_dir(options.story_dir.clone())?;
    let story = load_story(&story_dir)?;
    let story_name = story.name().to_string();
    let fingerprint = story.fingerprint().to_string();

    let StoryWorld {
        mut world,
        start,
        player,
    } = story.into_world(WorldConfig {
        connection_policy: options.connection_policy,
    })?;
    let player_id = world.spawn(PLAYER_NAME, start.map, start.tile, player, Box::new(route))?;
    world.apply_pending();

    let loop_config = LoopConfig {
        target_tps: options.target_tps,
        ..LoopConfig::default()
    };
    let mut clock = FixedStepClock::new(&loop_config);
    let dt = clock.fixed_dt_seconds();
    let frame_dt = Duration::from_millis(options.frame_ms);
    let input = InputSnapshot::empty();
    info!(
        target_tps = options.target_tps,
        frame_ms = options.frame_ms,
        max_frames = options.max_frames,
        legs = options.route.as_str(),
        "runner_started"
    );

    // Metrics run on simulated time.
    let sim_start = Instant::now();
    let mut sim_elapsed = Duration::ZERO;
    let mut metrics = TickMetrics::starting_at(sim_start, clock.metrics_log_interval());
    let mut tally = EventTally::default();
    let mut frames = 0u32;
    let mut ticks = 0u64;

    while frames < options.max_frames && !world.is_settled() {
        frames += 1;
        sim_elapsed += frame_dt;
        let plan = clock.advance(frame_dt);
        for _ in 0..plan.ticks_to_run {
            world.tick(dt, &input);
            world.apply_pending();
            metrics.record_tick();
            ticks += 1;
        }

        for event in world.drain_events() {
            if let WorldEvent::Motion { event: motion, .. } = &event {
                metrics.record_event(motion);
            }
            tally.record(&event);
            log_event(&event);
        }
        if let Some(snapshot) = metrics.maybe_snapshot(sim_start + sim_elapsed) {
            log_metrics(&snapshot);
        }
    }
    log_metrics(&metrics.flush(sim_start + sim_elapsed));

    let settled = world.is_settled();
    let actor = world
        .actor(player_id)
        .ok_or(WorldError::UnknownEntity { id: player_id })?;
    let controller = actor.controller();
    let map = world.arena().name_of(controller.map());
    let summary = RunSummary {
        story: story_name,
        fingerprint,
        frames,
        ticks,
        settled,
        map,
        tile: controller.tile(),
        map_changes: tally.map_changes,
        encounters: tally.encounters,
        ledge_jumps: tally.ledge_jumps,
    };
    info!(
        frames = summary.frames,
        ticks = summary.ticks,
        settled = summary.settled,
        map = summary.map.as_str(),
        x = summary.tile.x,
        y = summary.tile.y,
        map_changes = summary.map_changes,
        encounters = summary.encounters,
        ledge_jumps = summary.ledge_jumps,
        "runner_finished"
    );
    Ok(summary)
}

#[derive(Debug, Default)]
struct EventTally {
    map_changes: u32,
    encounters: u32,
    ledge_jumps: u32,
}

impl EventTally {
    fn record(&mut self, event: &WorldEvent) {
        match event {
            WorldEvent::MapChanged { .. } => self.map_changes += 1,
            WorldEvent::Motion { event, .. } => match event {
                MotionEvent::EnteredEncounter { .. } => self.encounters += 1,
                MotionEvent::Jumped { .. } => self.ledge_jumps += 1,
                _ => {}
            },
        }
    }
}

fn log_event(event: &WorldEvent) {
    match event {
        WorldEvent::Motion { entity, event } => log_motion(*entity, event),
        // The world logs map_entered itself.
        WorldEvent::MapChanged { .. } => {}
    }
}

fn log_motion(entity: EntityId, event: &MotionEvent) {
    match *event {
        MotionEvent::EnteredEncounter { map, tile } => {
            info!(entity = entity.0, map = map.0, x = tile.x, y = tile.y, "encounter_tile");
        }
        MotionEvent::Landed { map, tile } => {
            info!(entity = entity.0, map = map.0, x = tile.x, y = tile.y, "ledge_landed");
        }
        MotionEvent::CrossedMap {
            from,
            to,
            edge,
            tile,
        } => {
            info!(
                entity = entity.0,
                from = from.0,
                to = to.0,
                edge = edge.name(),
                x = tile.x,
                y = tile.y,
                "map_crossed"
            );
        }
        other => debug!(entity = entity.0, event = ?other, "motion_event"),
    }
}

fn log_metrics(snapshot: &TickMetricsSnapshot) {
    info!(
        tps = snapshot.tps,
        ticks = snapshot.ticks,
        tile_commits = snapshot.tile_commits,
        map_crossings = snapshot.map_crossings,
        encounters = snapshot.encounters,
        "tick_metrics"
    );
}
