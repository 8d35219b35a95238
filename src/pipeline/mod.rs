pub mod orchestrator;
pub mod slot;
pub mod state;

pub use orchestrator::RunOrchestrator;
pub use slot::ScheduleSlot;
pub use state::{FailureReason, RunReport, RunState};
