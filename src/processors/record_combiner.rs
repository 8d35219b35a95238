use crate::error::{PipelineError, Result};
use crate::models::{BatchResult, RecordSet, WeatherRow};
use tracing::info;

/// Flattens a run's observations into the fixed weather table.
///
/// Failed locations contribute no row, not even a null one.
pub struct RecordCombiner {
    retain_raw_payload: bool,
}

impl RecordCombiner {
    pub fn new() -> Self {
        Self {
            retain_raw_payload: false,
        }
    }

    pub fn with_retain_raw_payload(mut self, retain_raw_payload: bool) -> Self {
        self.retain_raw_payload = retain_raw_payload;
        self
    }

    /// One row per observation, in location order
    pub fn combine(&self, batch: &BatchResult) -> Result<RecordSet> {
        if batch.observations.is_empty() {
            return Err(PipelineError::EmptyResult);
        }

        let rows: Vec<WeatherRow> = batch
            .observations
            .iter()
            .map(|observation| WeatherRow::from_observation(observation, self.retain_raw_payload))
            .collect();

        info!(
            rows = rows.len(),
            dropped = batch.failures.len(),
            "Combined observations into record set"
        );

        Ok(RecordSet::new(rows))
    }
}

impl Default for RecordCombiner {
    fn default() -> Self {
        Self::new()
    }
}
