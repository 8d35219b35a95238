use crate::error::PipelineError;
use crate::fetch::WeatherFetcher;
use crate::models::{BatchResult, FetchOutcome, Location};
use crate::utils::progress::ProgressReporter;
use crate::utils::retry::RetryPolicy;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Fans the fetcher out over every location of a run.
///
/// All fetches are in flight at once. Each task reports back with the index
/// of its location, so the result follows location order no matter which
/// request finished first. Dropping the collect future aborts every
/// outstanding fetch.
pub struct BatchCollector {
    fetcher: Arc<dyn WeatherFetcher>,
    retry: RetryPolicy,
}

impl BatchCollector {
    pub fn new(fetcher: Arc<dyn WeatherFetcher>) -> Self {
        Self {
            fetcher,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every location. Never fails as a whole; per-location failures
    /// end up in `BatchResult::failures`.
    pub async fn collect(
        &self,
        locations: &[Location],
        api_key: &str,
        progress: Option<&ProgressReporter>,
    ) -> BatchResult {
        let api_key: Arc<str> = Arc::from(api_key);
        let mut tasks = JoinSet::new();

        for (index, location) in locations.iter().copied().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let api_key = Arc::clone(&api_key);
            let retry = self.retry.clone();

            tasks.spawn(async move {
                let outcome = fetch_with_retry(fetcher.as_ref(), &location, &api_key, &retry).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<FetchOutcome>> = (0..locations.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(p) = progress {
                        p.increment(1);
                    }
                    slots[index] = Some(outcome);
                }
                Err(e) => error!("Fetch task failed: {}", PipelineError::from(e)),
            }
        }

        let result = BatchResult::from_slots(locations, slots);

        for failure in &result.failures {
            warn!(
                location = %failure.location,
                kind = %failure.kind,
                attempts = failure.attempts,
                "Location dropped from run: {}",
                failure.message
            );
        }
        info!(
            succeeded = result.observations.len(),
            failed = result.failures.len(),
            "Collected weather observations"
        );

        result
    }
}

/// Run one location's fetch, retrying transient failures with backoff.
pub async fn fetch_with_retry(
    fetcher: &dyn WeatherFetcher,
    location: &Location,
    api_key: &str,
    retry: &RetryPolicy,
) -> FetchOutcome {
    let mut attempt = 0;

    loop {
        match fetcher.fetch(location, api_key).await {
            Ok(observation) => {
                if attempt > 0 {
                    info!(location = %location, "Fetch succeeded after {} retries", attempt);
                }
                return Ok(observation);
            }
            Err(mut failure) => {
                failure.attempts = attempt + 1;

                if !failure.kind.is_retryable() || attempt >= retry.max_retries {
                    return Err(failure);
                }

                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    location = %location,
                    kind = %failure.kind,
                    "Fetch attempt {} of {} failed, retrying in {:?}",
                    attempt + 1,
                    retry.max_attempts(),
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchErrorKind, FetchFailure, Observation};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a scripted list of outcome kinds per latitude; `None` is success.
    struct ScriptedFetcher {
        scripts: Mutex<HashMap<u64, Vec<Option<FetchErrorKind>>>>,
        delays: HashMap<u64, Duration>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(scripts: Vec<(f64, Vec<Option<FetchErrorKind>>)>) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(lat, script)| (lat.to_bits(), script))
                        .collect(),
                ),
                delays: HashMap::new(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, lat: f64, delay: Duration) -> Self {
            self.delays.insert(lat.to_bits(), delay);
            self
        }
    }

    #[async_trait]
    impl WeatherFetcher for ScriptedFetcher {
        async fn fetch(&self, location: &Location, _api_key: &str) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&location.latitude.to_bits()) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let next = {
                let mut scripts = self.scripts.lock().unwrap();
                let script = scripts.get_mut(&location.latitude.to_bits()).unwrap();
                if script.len() > 1 {
                    script.remove(0)
                } else {
                    script[0]
                }
            };

            match next {
                None => Ok(Observation::new(
                    *location,
                    Utc::now(),
                    290.0,
                    60.0,
                    1010.0,
                    2.0,
                    "Clear".into(),
                )),
                Some(kind) => Err(FetchFailure::new(*location, kind, "scripted failure")),
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(2, 1, 5)
    }

    #[tokio::test]
    async fn test_results_follow_location_order() {
        let locations = vec![
            Location::new(1.0, 0.0),
            Location::new(2.0, 0.0),
            Location::new(3.0, 0.0),
        ];
        // The first location answers last
        let fetcher = ScriptedFetcher::new(vec![(1.0, vec![None]), (2.0, vec![None]), (3.0, vec![None])])
            .with_delay(1.0, Duration::from_millis(50));

        let collector = BatchCollector::new(Arc::new(fetcher)).with_retry_policy(fast_retry());
        let result = collector.collect(&locations, "k", None).await;

        let order: Vec<Location> = result.observations.iter().map(|o| o.location).collect();
        assert_eq!(order, locations);
        assert!(result.covers(&locations));
    }

    #[tokio::test]
    async fn test_fetches_run_concurrently() {
        let locations: Vec<Location> = (1..=5).map(|i| Location::new(i as f64, 0.0)).collect();
        let mut fetcher = ScriptedFetcher::new(locations.iter().map(|l| (l.latitude, vec![None])).collect());
        for location in &locations {
            fetcher = fetcher.with_delay(location.latitude, Duration::from_millis(200));
        }
        let fetcher = Arc::new(fetcher);

        let collector = BatchCollector::new(fetcher.clone()).with_retry_policy(fast_retry());
        let started = std::time::Instant::now();
        let result = collector.collect(&locations, "k", None).await;
        let elapsed = started.elapsed();

        assert_eq!(result.observations.len(), 5);
        assert_eq!(fetcher.peak_in_flight.load(Ordering::SeqCst), 5);
        // Five sequential fetches would take a full second
        assert!(elapsed < Duration::from_millis(600), "collect took {:?}", elapsed);
    }

    struct PanickingFetcher;

    #[async_trait]
    impl WeatherFetcher for PanickingFetcher {
        async fn fetch(&self, location: &Location, _api_key: &str) -> FetchOutcome {
            if location.latitude == 2.0 {
                panic!("fetcher bug");
            }
            Ok(Observation::new(*location, Utc::now(), 290.0, 60.0, 1010.0, 2.0, "Clear".into()))
        }
    }

    #[tokio::test]
    async fn test_panicked_fetch_becomes_failure() {
        let locations = vec![Location::new(1.0, 0.0), Location::new(2.0, 0.0), Location::new(3.0, 0.0)];

        let collector = BatchCollector::new(Arc::new(PanickingFetcher)).with_retry_policy(fast_retry());
        let result = collector.collect(&locations, "k", None).await;

        assert_eq!(result.observations.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].location, locations[1]);
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort() {
        let locations = vec![
            Location::new(51.5, -0.12),
            Location::new(40.73, -73.94),
            Location::new(35.65, 139.84),
        ];
        let fetcher = ScriptedFetcher::new(vec![
            (51.5, vec![None]),
            (40.73, vec![None]),
            (35.65, vec![Some(FetchErrorKind::HttpStatus)]),
        ]);

        let collector = BatchCollector::new(Arc::new(fetcher)).with_retry_policy(fast_retry());
        let result = collector.collect(&locations, "k", None).await;

        assert_eq!(result.observations.len(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].location, locations[2]);
        assert_eq!(result.failures[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let fetcher = ScriptedFetcher::new(vec![(
            10.0,
            vec![Some(FetchErrorKind::Network), Some(FetchErrorKind::RateLimited), None],
        )]);

        let outcome =
            fetch_with_retry(&fetcher, &Location::new(10.0, 0.0), "k", &fast_retry()).await;

        assert!(outcome.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let fetcher = ScriptedFetcher::new(vec![(10.0, vec![Some(FetchErrorKind::Network)])]);

        let failure = fetch_with_retry(&fetcher, &Location::new(10.0, 0.0), "k", &fast_retry())
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FetchErrorKind::Network);
        assert_eq!(failure.attempts, 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        for kind in [FetchErrorKind::HttpStatus, FetchErrorKind::MalformedResponse] {
            let fetcher = ScriptedFetcher::new(vec![(10.0, vec![Some(kind)])]);

            let failure = fetch_with_retry(&fetcher, &Location::new(10.0, 0.0), "k", &fast_retry())
                .await
                .unwrap_err();

            assert_eq!(failure.kind, kind);
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_all_failed() {
        let locations = vec![Location::new(1.0, 1.0), Location::new(2.0, 2.0)];
        let fetcher = ScriptedFetcher::new(vec![
            (1.0, vec![Some(FetchErrorKind::HttpStatus)]),
            (2.0, vec![Some(FetchErrorKind::MalformedResponse)]),
        ]);

        let collector = BatchCollector::new(Arc::new(fetcher)).with_retry_policy(fast_retry());
        let result = collector.collect(&locations, "k", None).await;

        assert!(result.is_all_failed());
        assert_eq!(result.total(), 2);
        assert!(result.covers(&locations));
    }
}
