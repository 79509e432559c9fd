mod clock;
mod input;
mod metrics;
mod world;

pub use clock::{FixedStepClock, LoopConfig, StepPlan};
pub use input::{InputAction, InputSnapshot};
pub use metrics::{TickMetrics, TickMetricsSnapshot};
pub use world::{
    Actor, EntityId, EntityIdAllocator, World, WorldConfig, WorldError, WorldEvent,
};
