use std::time::{Duration, Instant};

use crate::movement::MotionEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickMetricsSnapshot {
    pub tps: f32,
    pub ticks: u32,
    pub tile_commits: u32,
    pub map_crossings: u32,
    pub encounters: u32,
}

/// Counts simulation activity over a fixed interval.
#[derive(Debug)]
pub struct TickMetrics {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    tile_commits: u32,
    map_crossings: u32,
    encounters: u32,
}

impl TickMetrics {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    pub fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            interval_start: start,
            interval,
            ticks: 0,
            tile_commits: 0,
            map_crossings: 0,
            encounters: 0,
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub fn record_event(&mut self, event: &MotionEvent) {
        match event {
            MotionEvent::Stepped { .. } | MotionEvent::Landed { .. } => {
                self.tile_commits = self.tile_commits.saturating_add(1);
            }
            MotionEvent::CrossedMap { .. } => {
                self.map_crossings = self.map_crossings.saturating_add(1);
            }
            MotionEvent::EnteredEncounter { .. } => {
                self.encounters = self.encounters.saturating_add(1);
            }
            _ => {}
        }
    }

    pub fn maybe_snapshot(&mut self, now: Instant) -> Option<TickMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }
        Some(self.take_snapshot(now, elapsed))
    }

    /// Closes the current interval regardless of its length.
    pub fn flush(&mut self, now: Instant) -> TickMetricsSnapshot {
        let elapsed = now.saturating_duration_since(self.interval_start);
        self.take_snapshot(now, elapsed)
    }

    fn take_snapshot(&mut self, now: Instant, elapsed: Duration) -> TickMetricsSnapshot {
        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let snapshot = TickMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            ticks: self.ticks,
            tile_commits: self.tile_commits,
            map_crossings: self.map_crossings,
            encounters: self.encounters,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.tile_commits = 0;
        self.map_crossings = 0;
        self.encounters = 0;

        snapshot
    }
}
