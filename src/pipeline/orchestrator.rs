use crate::delivery::{deliver, DeliveryArtifact, ObjectStore};
use crate::fetch::WeatherFetcher;
use crate::pipeline::{FailureReason, RunReport, RunState, ScheduleSlot};
use crate::processors::{BatchCollector, RecordCombiner};
use crate::readers::LocationSource;
use crate::secrets::{resolve_run_secrets, SecretNames, SecretProvider};
use crate::utils::progress::ProgressReporter;
use crate::utils::retry::RetryPolicy;
use crate::writers::ParquetWriter;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Drives one run through secrets, locations, fetch, combine, serialize and
/// delivery.
///
/// Every collaborator is injected, so a run has no ambient dependencies and
/// can be exercised entirely with stubs.
pub struct RunOrchestrator {
    secrets: Arc<dyn SecretProvider>,
    locations: Arc<dyn LocationSource>,
    fetcher: Arc<dyn WeatherFetcher>,
    store: Arc<dyn ObjectStore>,
    secret_names: SecretNames,
    fetch_retry: RetryPolicy,
    delivery_retry: RetryPolicy,
    min_successful_locations: usize,
    retain_raw_payload: bool,
    writer: ParquetWriter,
    show_progress: bool,
}

impl RunOrchestrator {
    pub fn new(
        secrets: Arc<dyn SecretProvider>,
        locations: Arc<dyn LocationSource>,
        fetcher: Arc<dyn WeatherFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            secrets,
            locations,
            fetcher,
            store,
            secret_names: SecretNames::default(),
            fetch_retry: RetryPolicy::default(),
            delivery_retry: RetryPolicy::default(),
            min_successful_locations: 1,
            retain_raw_payload: false,
            writer: ParquetWriter::new(),
            show_progress: false,
        }
    }

    pub fn with_secret_names(mut self, names: SecretNames) -> Self {
        self.secret_names = names;
        self
    }

    pub fn with_fetch_retry(mut self, retry: RetryPolicy) -> Self {
        self.fetch_retry = retry;
        self
    }

    pub fn with_delivery_retry(mut self, retry: RetryPolicy) -> Self {
        self.delivery_retry = retry;
        self
    }

    /// Fewest successful locations a run may deliver. Values below one are
    /// treated as one.
    pub fn with_min_successful_locations(mut self, min: usize) -> Self {
        self.min_successful_locations = min.max(1);
        self
    }

    pub fn with_retain_raw_payload(mut self, retain: bool) -> Self {
        self.retain_raw_payload = retain;
        self
    }

    pub fn with_writer(mut self, writer: ParquetWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Execute one run for `slot`. Never panics or errors; the outcome,
    /// including any failure, is in the returned report.
    #[instrument(skip_all, fields(slot = %slot))]
    pub async fn run(&self, slot: ScheduleSlot, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new(slot);
        info!(object = %report.object_name, "Starting weather run");

        let secrets = match or_cancel(
            cancel,
            resolve_run_secrets(self.secrets.as_ref(), &self.secret_names),
        )
        .await
        {
            None => return cancelled(report),
            Some(Err(e)) => return report.fail(FailureReason::Secrets, e),
            Some(Ok(secrets)) => secrets,
        };
        report.advance(RunState::SecretsResolved);

        if cancel.is_cancelled() {
            return cancelled(report);
        }
        let locations = match self.locations.load() {
            Ok(locations) => locations,
            Err(e) => return report.fail(FailureReason::Config, e),
        };
        report.locations = locations.len();
        report.advance(RunState::LocationsLoaded);

        let progress =
            ProgressReporter::new(locations.len() as u64, "Fetching current weather", !self.show_progress);
        let collector =
            BatchCollector::new(Arc::clone(&self.fetcher)).with_retry_policy(self.fetch_retry.clone());

        let batch = match or_cancel(
            cancel,
            collector.collect(&locations, secrets.api_key(), Some(&progress)),
        )
        .await
        {
            None => return cancelled(report),
            Some(batch) => batch,
        };
        progress.finish_with_message(&format!(
            "Fetched {}/{} locations",
            batch.observations.len(),
            batch.total()
        ));

        debug_assert!(batch.covers(&locations));
        report.failures = batch.failures.clone();
        report.advance(RunState::Fetched);

        if batch.is_all_failed() {
            return report.fail(
                FailureReason::AllSourcesDown,
                format!("all {} locations failed", batch.total()),
            );
        }
        if batch.observations.len() < self.min_successful_locations {
            return report.fail(
                FailureReason::InsufficientCoverage,
                format!(
                    "{} of {} locations succeeded, at least {} required",
                    batch.observations.len(),
                    batch.total(),
                    self.min_successful_locations
                ),
            );
        }

        let combiner = RecordCombiner::new().with_retain_raw_payload(self.retain_raw_payload);
        let records = match combiner.combine(&batch) {
            Ok(records) => records,
            Err(e) => return report.fail(FailureReason::Combine, e),
        };
        report.rows = records.len();
        report.advance(RunState::Combined);

        if cancel.is_cancelled() {
            return cancelled(report);
        }
        let content = match self.writer.to_bytes(&records) {
            Ok(content) => content,
            Err(e) => return report.fail(FailureReason::Serialize, e),
        };
        report.bytes = content.len();
        report.advance(RunState::Serialized);

        if cancel.is_cancelled() {
            return cancelled(report);
        }
        let artifact = DeliveryArtifact::parquet(report.object_name.clone(), content);
        match or_cancel(
            cancel,
            deliver(
                self.store.as_ref(),
                secrets.storage_url(),
                &artifact,
                &self.delivery_retry,
            ),
        )
        .await
        {
            None => return cancelled(report),
            Some(Err(e)) => return report.fail(FailureReason::Delivery, e),
            Some(Ok(attempts)) => report.delivery_attempts = attempts,
        }
        report.advance(RunState::Delivered);

        info!(
            object = %report.object_name,
            rows = report.rows,
            failed = report.failures.len(),
            "Weather run delivered"
        );
        report
    }
}

fn cancelled(report: RunReport) -> RunReport {
    report.fail(FailureReason::Cancelled, "run cancelled by scheduler")
}

/// Await `fut` unless the run is cancelled first. The future is dropped on
/// cancellation.
async fn or_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}
