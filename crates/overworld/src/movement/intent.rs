use std::fmt;

use tracing::debug;

use super::controller::{MotionEvent, MovementController};
use super::geometry::Direction;
use crate::app::InputSnapshot;

/// Source of movement requests for one actor, consulted once per tick
/// before its controller advances.
pub trait MoveIntent: fmt::Debug + Send {
    fn decide(&mut self, input: &InputSnapshot, controller: &MovementController)
        -> Option<Direction>;

    /// Sees every event the actor's controller produced this tick.
    fn observe(&mut self, _event: &MotionEvent) {}

    fn is_finished(&self) -> bool {
        false
    }
}

/// Follows the held direction keys.
#[derive(Debug, Default)]
pub struct PlayerIntent;

impl MoveIntent for PlayerIntent {
    fn decide(&mut self, input: &InputSnapshot, _controller: &MovementController) -> Option<Direction> {
        input.held_direction()
    }
}

/// Never asks to move.
#[derive(Debug, Default)]
pub struct Stationary;

impl MoveIntent for Stationary {
    fn decide(&mut self, _input: &InputSnapshot, _controller: &MovementController) -> Option<Direction> {
        None
    }

    fn is_finished(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLeg {
    pub direction: Direction,
    pub segments: u32,
}

/// Walks a fixed list of legs. A leg counts started segments, so a ledge hop
/// counts once. A leg that cannot start is skipped.
#[derive(Debug, Default)]
pub struct ScriptedRoute {
    legs: Vec<RouteLeg>,
    index: usize,
    started: u32,
    waiting_on_idle: bool,
}

impl ScriptedRoute {
    pub fn new(legs: Vec<RouteLeg>) -> Self {
        Self {
            legs,
            ..Self::default()
        }
    }

    /// Parses `"up:3,left,down:2"`; a leg without a count walks one segment.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut legs = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            let (direction, count) = match part.split_once(':') {
                Some((direction, count)) => (direction, count.trim().parse::<u32>().ok()?),
                None => (part, 1),
            };
            legs.push(RouteLeg {
                direction: Direction::parse(direction)?,
                segments: count,
            });
        }
        Some(Self::new(legs))
    }

    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    fn current(&self) -> Option<RouteLeg> {
        self.legs.get(self.index).copied()
    }

    fn advance(&mut self) {
        self.index += 1;
        self.started = 0;
        self.waiting_on_idle = false;
    }
}

impl MoveIntent for ScriptedRoute {
    fn decide(&mut self, _input: &InputSnapshot, controller: &MovementController) -> Option<Direction> {
        loop {
            let leg = self.current()?;
            if self.started < leg.segments {
                if controller.is_idle() && self.waiting_on_idle {
                    debug!(
                        direction = leg.direction.name(),
                        remaining = leg.segments - self.started,
                        "route_leg_blocked"
                    );
                    self.advance();
                    continue;
                }
                if controller.is_idle() {
                    self.waiting_on_idle = true;
                }
                return Some(leg.direction);
            }
            if !controller.is_idle() {
                return None;
            }
            self.advance();
        }
    }

    fn observe(&mut self, event: &MotionEvent) {
        let Some(leg) = self.current() else {
            return;
        };
        match event {
            MotionEvent::Started { direction, .. } | MotionEvent::Jumped { direction, .. }
                if *direction == leg.direction =>
            {
                self.started += 1;
                self.waiting_on_idle = false;
            }
            _ => {}
        }
    }

    fn is_finished(&self) -> bool {
        self.index >= self.legs.len()
    }
}
