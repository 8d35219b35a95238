pub mod constants;
pub mod filename;
pub mod progress;
pub mod retry;

pub use constants::*;
pub use filename::object_name_for_slot;
pub use progress::ProgressReporter;
pub use retry::RetryPolicy;
