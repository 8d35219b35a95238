use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio_util::sync::CancellationToken;
use weather_pipeline::delivery::{
    BlobStorageClient, DeliveryArtifact, DeliveryError, DeliveryErrorKind, LocalDirectoryStore,
    ObjectStore,
};
use weather_pipeline::fetch::{OpenWeatherClient, Units, WeatherFetcher};
use weather_pipeline::models::{FetchErrorKind, FetchFailure, FetchOutcome, Location, Observation};
use weather_pipeline::pipeline::{FailureReason, RunOrchestrator, RunState, ScheduleSlot};
use weather_pipeline::readers::LocationReader;
use weather_pipeline::secrets::{EnvSecretProvider, StaticSecrets};
use weather_pipeline::utils::RetryPolicy;
use weather_pipeline::writers::ParquetWriter;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fetcher that succeeds everywhere except the listed latitudes
struct StubFetcher {
    failing: Vec<(f64, FetchErrorKind)>,
    calls: AtomicU32,
}

impl StubFetcher {
    fn healthy() -> Self {
        Self::failing(vec![])
    }

    fn failing(failing: Vec<(f64, FetchErrorKind)>) -> Self {
        Self {
            failing,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl WeatherFetcher for StubFetcher {
    async fn fetch(&self, location: &Location, _api_key: &str) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((_, kind)) = self.failing.iter().find(|(lat, _)| *lat == location.latitude) {
            return Err(FetchFailure::new(*location, *kind, "stubbed failure"));
        }
        Ok(Observation::new(
            *location,
            Utc::now(),
            283.0 + location.latitude / 10.0,
            65.0,
            1013.0,
            2.5,
            "Clear".to_string(),
        ))
    }
}

/// Fetcher whose requests hang far longer than any test waits
#[derive(Default)]
struct HangingFetcher {
    started: Arc<AtomicU32>,
    finished: Arc<AtomicU32>,
    abandoned: Arc<AtomicU32>,
}

/// Counts fetches whose future was dropped before completing
struct AbandonGuard {
    abandoned: Arc<AtomicU32>,
    completed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl WeatherFetcher for HangingFetcher {
    async fn fetch(&self, location: &Location, _api_key: &str) -> FetchOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut guard = AbandonGuard {
            abandoned: self.abandoned.clone(),
            completed: false,
        };

        tokio::time::sleep(Duration::from_secs(30)).await;

        guard.completed = true;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Err(FetchFailure::new(*location, FetchErrorKind::Network, "hung"))
    }
}

/// Store that replays scripted failures before accepting uploads
#[derive(Default)]
struct ScriptedStore {
    script: Mutex<Vec<DeliveryErrorKind>>,
    always: Option<DeliveryErrorKind>,
    calls: AtomicU32,
    accepted: Mutex<Vec<DeliveryArtifact>>,
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn upload(&self, _storage_url: &str, artifact: &DeliveryArtifact) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.always {
            return Err(DeliveryError::new(kind, "scripted"));
        }
        {
            let mut script = self.script.lock().unwrap();
            if !script.is_empty() {
                return Err(DeliveryError::new(script.remove(0), "scripted"));
            }
        }
        self.accepted.lock().unwrap().push(artifact.clone());
        Ok(())
    }
}

fn secrets(storage_url: &str) -> Arc<StaticSecrets> {
    Arc::new(
        StaticSecrets::new()
            .with_secret("OpenWeatherApiKey", "test-api-key")
            .with_secret("AzureStorageUrl", storage_url),
    )
}

fn three_locations() -> Arc<Vec<Location>> {
    Arc::new(vec![
        Location::new(10.0, 10.0),
        Location::new(20.0, 20.0),
        Location::new(30.0, 30.0),
    ])
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, 1, 2)
}

fn logical_time(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 13, minute, 0).unwrap()
}

fn slot(minute: u32) -> ScheduleSlot {
    ScheduleSlot::hourly(logical_time(minute)).unwrap()
}

fn orchestrator(fetcher: Arc<StubFetcher>, store: Arc<dyn ObjectStore>) -> RunOrchestrator {
    RunOrchestrator::new(
        secrets("https://acct.blob.core.windows.net"),
        three_locations(),
        fetcher,
        store,
    )
    .with_fetch_retry(fast_retry())
    .with_delivery_retry(fast_retry())
}

#[tokio::test]
async fn test_partial_failure_still_delivers() {
    let fetcher = Arc::new(StubFetcher::failing(vec![(30.0, FetchErrorKind::HttpStatus)]));
    let store = Arc::new(ScriptedStore::default());

    let report = orchestrator(fetcher.clone(), store.clone())
        .run(slot(5), &CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Delivered);
    assert_eq!(report.rows, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FetchErrorKind::HttpStatus);
    assert_eq!(report.failures[0].location, Location::new(30.0, 30.0));
    // permanent failures are not retried
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

    let accepted = store.accepted.lock().unwrap();
    let rows = ParquetWriter::new().read_rows(&accepted[0].content).unwrap();
    let latitudes: Vec<f64> = rows.iter().map(|r| r.latitude).collect();
    assert_eq!(latitudes, vec![10.0, 20.0]);
}

#[tokio::test]
async fn test_all_sources_down_skips_serialize_and_upload() {
    let fetcher = Arc::new(StubFetcher::failing(vec![
        (10.0, FetchErrorKind::HttpStatus),
        (20.0, FetchErrorKind::MalformedResponse),
        (30.0, FetchErrorKind::HttpStatus),
    ]));
    let store = Arc::new(ScriptedStore::default());

    let report = orchestrator(fetcher, store.clone())
        .run(slot(5), &CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Failed(FailureReason::AllSourcesDown));
    assert!(report.reached(RunState::Fetched));
    assert!(!report.reached(RunState::Combined));
    assert!(!report.reached(RunState::Serialized));
    assert_eq!(report.failures.len(), 3);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transient_network_failures_are_retried() {
    let fetcher = Arc::new(StubFetcher::failing(vec![(20.0, FetchErrorKind::Network)]));
    let store = Arc::new(ScriptedStore {
        script: Mutex::new(vec![DeliveryErrorKind::Network]),
        ..Default::default()
    });

    let report = orchestrator(fetcher.clone(), store.clone())
        .run(slot(5), &CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Delivered);
    assert_eq!(report.delivery_attempts, 2);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.failures[0].attempts, 4);
    // 1 + 4 + 1 fetch calls
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_auth_failure_fails_delivery_without_retry() {
    let store = Arc::new(ScriptedStore {
        always: Some(DeliveryErrorKind::Auth),
        ..Default::default()
    });

    let report = orchestrator(Arc::new(StubFetcher::healthy()), store.clone())
        .run(slot(5), &CancellationToken::new())
        .await;

    assert_eq!(report.state, RunState::Failed(FailureReason::Delivery));
    assert!(report.reached(RunState::Serialized));
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_location_fails_before_any_fetch() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"[{{"lat": 51.5, "lon": -0.12}}, {{"lat": 91.0, "lon": 0.0}}]"#).unwrap();

    let fetcher = Arc::new(StubFetcher::healthy());
    let store = Arc::new(ScriptedStore::default());
    let orchestrator = RunOrchestrator::new(
        secrets("https://acct.blob.core.windows.net"),
        Arc::new(LocationReader::new(file.path())),
        fetcher.clone(),
        store.clone(),
    );

    let report = orchestrator.run(slot(5), &CancellationToken::new()).await;

    assert_eq!(report.state, RunState::Failed(FailureReason::Config));
    assert!(report.detail.as_deref().unwrap_or_default().contains("index 1"));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unresolvable_secret_fails_run() {
    let fetcher = Arc::new(StubFetcher::healthy());
    let orchestrator = RunOrchestrator::new(
        Arc::new(EnvSecretProvider::with_prefix("WEATHER_PIPELINE_IT_UNSET_")),
        three_locations(),
        fetcher.clone(),
        Arc::new(ScriptedStore::default()),
    );

    let report = orchestrator.run(slot(5), &CancellationToken::new()).await;

    assert_eq!(report.state, RunState::Failed(FailureReason::Secrets));
    assert_eq!(report.history, vec![RunState::Init, report.state]);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reruns_in_same_slot_overwrite_one_object() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(LocalDirectoryStore::new(dir.path()));

    let first = orchestrator(Arc::new(StubFetcher::healthy()), store.clone())
        .run(slot(2), &CancellationToken::new())
        .await;
    let retry = orchestrator(
        Arc::new(StubFetcher::failing(vec![(10.0, FetchErrorKind::HttpStatus)])),
        store,
    )
    .run(slot(58), &CancellationToken::new())
    .await;

    assert!(first.is_success());
    assert!(retry.is_success());
    assert_eq!(first.object_name, retry.object_name);
    assert_eq!(first.object_name, "weather_data_20241001_130000.parquet");

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);

    let content = std::fs::read(dir.path().join(&first.object_name)).unwrap();
    assert_eq!(ParquetWriter::new().read_rows(&content).unwrap().len(), 2);
}

fn current_weather(lat: f64, lon: f64, name: &str, temp: f64) -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": lon, "lat": lat},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": temp, "feels_like": temp - 1.0, "pressure": 1015, "humidity": 60},
        "visibility": 10000,
        "wind": {"speed": 3.1, "deg": 200},
        "clouds": {"all": 0},
        "dt": 1727787600,
        "sys": {"country": "GB"},
        "name": name,
        "cod": 200
    })
}

async fn mount_weather(server: &MockServer, lat: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(query_param("lat", lat))
        .and(query_param("appid", "test-api-key"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_end_to_end_blob_delivery() {
    let weather = MockServer::start().await;
    mount_weather(
        &weather,
        "51.5",
        ResponseTemplate::new(200).set_body_json(current_weather(51.5, -0.12, "London", 287.0)),
    )
    .await;
    mount_weather(
        &weather,
        "53.48",
        ResponseTemplate::new(200).set_body_json(current_weather(53.48, -2.24, "Manchester", 284.0)),
    )
    .await;
    mount_weather(&weather, "55.95", ResponseTemplate::new(404)).await;

    let blob = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/openweather/weather_data_20241001_130000.parquet"))
        .and(query_param("sig", "token"))
        .and(header("x-ms-blob-type", "BlockBlob"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&blob)
        .await;

    let fetcher =
        OpenWeatherClient::with_settings(&weather.uri(), Units::Standard, Duration::from_secs(5))
            .unwrap();
    let locations = Arc::new(vec![
        Location::new(51.5, -0.12),
        Location::new(53.48, -2.24),
        Location::new(55.95, -3.19),
    ]);

    let orchestrator = RunOrchestrator::new(
        secrets(&format!("{}/?sig=token", blob.uri())),
        locations,
        Arc::new(fetcher),
        Arc::new(BlobStorageClient::new("openweather").unwrap()),
    )
    .with_fetch_retry(fast_retry())
    .with_delivery_retry(fast_retry());

    let report = orchestrator.run(slot(7), &CancellationToken::new()).await;

    assert_eq!(report.state, RunState::Delivered);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].status, Some(404));

    let requests = blob.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let rows = ParquetWriter::new().read_rows(&requests[0].body).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].station_name.as_deref(), Some("London"));
    assert_eq!(rows[1].station_name.as_deref(), Some("Manchester"));
    assert_eq!(rows[0].temperature, 287.0);
    assert_eq!(rows[0].raw_payload, None);
}

#[tokio::test]
async fn test_end_to_end_local_delivery_with_raw_payload() {
    let weather = MockServer::start().await;
    mount_weather(
        &weather,
        "51.5",
        ResponseTemplate::new(200).set_body_json(current_weather(51.5, -0.12, "London", 287.0)),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let fetcher =
        OpenWeatherClient::with_settings(&weather.uri(), Units::Metric, Duration::from_secs(5))
            .unwrap();

    let orchestrator = RunOrchestrator::new(
        secrets("unused"),
        Arc::new(vec![Location::new(51.5, -0.12)]),
        Arc::new(fetcher),
        Arc::new(LocalDirectoryStore::new(dir.path())),
    )
    .with_retain_raw_payload(true);

    let report = orchestrator.run(slot(30), &CancellationToken::new()).await;
    assert!(report.is_success());

    let content = std::fs::read(dir.path().join(&report.object_name)).unwrap();
    let rows = ParquetWriter::new().read_rows(&content).unwrap();
    let payload: serde_json::Value =
        serde_json::from_str(rows[0].raw_payload.as_deref().unwrap()).unwrap();
    assert_eq!(payload["name"], "London");
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_fetches() {
    let fetcher = Arc::new(HangingFetcher::default());
    let store = Arc::new(ScriptedStore::default());
    let orchestrator = RunOrchestrator::new(
        secrets("https://acct.blob.core.windows.net"),
        three_locations(),
        fetcher.clone(),
        store.clone(),
    )
    .with_fetch_retry(fast_retry());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let report = orchestrator.run(slot(5), &cancel).await;

    assert_eq!(report.state, RunState::Failed(FailureReason::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2), "run took {:?}", started.elapsed());
    assert!(report.reached(RunState::LocationsLoaded));
    assert!(!report.reached(RunState::Fetched));
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    // Every fetch that had started gets dropped rather than left running
    let deadline = std::time::Instant::now() + Duration::from_secs(1);
    while fetcher.abandoned.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fetcher.started.load(Ordering::SeqCst), 3);
    assert_eq!(fetcher.abandoned.load(Ordering::SeqCst), 3);
    assert_eq!(fetcher.finished.load(Ordering::SeqCst), 0);
}
