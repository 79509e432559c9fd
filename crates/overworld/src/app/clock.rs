use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks_to_run: u32,
    pub remaining_accumulator: Duration,
    pub dropped_backlog: Duration,
}

/// Turns variable frame deltas into a whole number of fixed ticks.
#[derive(Debug, Clone)]
pub struct FixedStepClock {
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    metrics_log_interval: Duration,
    accumulator: Duration,
}

impl FixedStepClock {
    pub fn new(config: &LoopConfig) -> Self {
        let non_zero_or = |value: Duration, fallback: Duration| {
            if value.is_zero() {
                fallback
            } else {
                value
            }
        };
        let tick_nanos = (1_000_000_000 / u64::from(config.target_tps.max(1))).max(1);
        Self {
            fixed_dt: Duration::from_nanos(tick_nanos),
            max_frame_delta: non_zero_or(config.max_frame_delta, Duration::from_millis(250)),
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            metrics_log_interval: non_zero_or(config.metrics_log_interval, Duration::from_secs(1)),
            accumulator: Duration::ZERO,
        }
    }

    pub fn fixed_dt(&self) -> Duration {
        self.fixed_dt
    }

    pub fn fixed_dt_seconds(&self) -> f32 {
        self.fixed_dt.as_secs_f32()
    }

    pub fn max_frame_delta(&self) -> Duration {
        self.max_frame_delta
    }

    pub fn max_ticks_per_frame(&self) -> u32 {
        self.max_ticks_per_frame
    }

    pub fn metrics_log_interval(&self) -> Duration {
        self.metrics_log_interval
    }

    /// Time banked toward the next tick.
    pub fn pending(&self) -> Duration {
        self.accumulator
    }

    /// Feeds one frame's wall time and returns how many ticks to simulate.
    ///
    /// The frame is clamped to `max_frame_delta`. When the tick cap still
    /// leaves a whole tick or more banked, that backlog is dropped.
    pub fn advance(&mut self, frame_dt: Duration) -> StepPlan {
        let budget = self
            .accumulator
            .saturating_add(frame_dt.min(self.max_frame_delta));
        let whole_ticks = budget.as_nanos() / self.fixed_dt.as_nanos();
        let ticks_to_run = whole_ticks.min(u128::from(self.max_ticks_per_frame)) as u32;
        let leftover = budget.saturating_sub(self.fixed_dt.saturating_mul(ticks_to_run));

        let (remaining_accumulator, dropped_backlog) = if leftover >= self.fixed_dt {
            warn!(
                dropped_backlog_ms = leftover.as_millis() as u64,
                max_ticks_per_frame = self.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
            (Duration::ZERO, leftover)
        } else {
            (leftover, Duration::ZERO)
        };
        self.accumulator = remaining_accumulator;
        StepPlan {
            ticks_to_run,
            remaining_accumulator,
            dropped_backlog,
        }
    }
}
