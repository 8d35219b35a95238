pub mod batch_collector;
pub mod record_combiner;

pub use batch_collector::{fetch_with_retry, BatchCollector};
pub use record_combiner::RecordCombiner;
