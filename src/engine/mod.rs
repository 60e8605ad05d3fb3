//! Readiness gate and orchestration of the background workers

mod orchestrator;
mod order_events;
mod readiness;

pub use orchestrator::{LoopSettings, Orchestrator};
pub use order_events::spawn_order_events;
pub use readiness::{Readiness, ResourceStatus};
