use crate::cli::args::{Cli, Commands};
use crate::config::{SecretProviderKind, Settings};
use crate::delivery::{BlobStorageClient, LocalDirectoryStore, ObjectStore};
use crate::fetch::OpenWeatherClient;
use crate::pipeline::{RunOrchestrator, ScheduleSlot};
use crate::readers::LocationReader;
use crate::secrets::{EnvSecretProvider, KeyVaultSecretProvider, SecretProvider};
use crate::writers::ParquetWriter;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;

pub async fn run(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    execute(cli).await
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            logical_time,
            locations,
            progress,
        } => {
            let settings = load_settings(config)?;
            let logical_time = logical_time.unwrap_or_else(Utc::now);
            let slot = ScheduleSlot::containing(logical_time, settings.run.slot_minutes)?;
            let locations_file = locations.unwrap_or_else(|| settings.locations_file.clone());

            let orchestrator = build_orchestrator(&settings, locations_file, progress)?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling run");
                    on_signal.cancel();
                }
            });

            let report = orchestrator.run(slot, &cancel).await;
            println!("\n{}", report.summary());

            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("Run failed: {}", report.state);
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::ValidateLocations { locations } => {
            let settings = load_settings(config)?;
            let reader = LocationReader::new(
                locations.unwrap_or_else(|| settings.locations_file.clone()),
            );
            println!("Validating locations: {}", reader.path().display());

            let locations = reader.read_locations()?;
            for (i, location) in locations.iter().enumerate() {
                println!("{:>4}. {}", i + 1, location);
            }
            println!("✅ {} locations valid", locations.len());

            Ok(ExitCode::SUCCESS)
        }

        Commands::Inspect { file, sample } => inspect(&file, sample),
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    Settings::load(path).context("Failed to load settings")
}

fn inspect(file: &Path, sample: usize) -> Result<ExitCode> {
    println!("Inspecting Parquet file: {}", file.display());

    let content = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let writer = ParquetWriter::new();

    println!("\n{}", writer.inspect(&content)?.summary());

    println!("\nSchema:");
    for field in writer.read_schema(&content)?.fields() {
        println!(
            "  {}: {}{}",
            field.name(),
            field.data_type(),
            if field.is_nullable() { " (nullable)" } else { "" }
        );
    }

    if sample > 0 {
        let rows = writer.read_rows(&content)?;
        println!("\nSample Rows (showing {} of {}):", sample.min(rows.len()), rows.len());
        for (i, row) in rows.iter().take(sample).enumerate() {
            println!(
                "{}. ({:.4}, {:.4}) {} at {}: {:.1}, {}% humidity, {} hPa, {}",
                i + 1,
                row.latitude,
                row.longitude,
                row.station_name.as_deref().unwrap_or("-"),
                row.retrieved_at.format("%Y-%m-%d %H:%M:%S"),
                row.temperature,
                row.humidity,
                row.pressure,
                row.weather_condition
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_orchestrator(
    settings: &Settings,
    locations_file: PathBuf,
    progress: bool,
) -> Result<RunOrchestrator> {
    let secrets: Arc<dyn SecretProvider> = match settings.secrets.provider {
        SecretProviderKind::Env => Arc::new(EnvSecretProvider::new()),
        SecretProviderKind::KeyVault => Arc::new(KeyVaultSecretProvider::new(
            &settings.secrets.vault_url,
            &settings.secrets.access_token_env,
        )?),
    };

    let fetcher = OpenWeatherClient::with_settings(
        &settings.weather.base_url,
        settings.weather.units,
        settings.weather.timeout(),
    )?;

    let store: Arc<dyn ObjectStore> = match settings.output_dir() {
        Some(dir) => {
            info!(dir = %dir.display(), "Delivering to local directory");
            Arc::new(LocalDirectoryStore::new(dir))
        }
        None => Arc::new(BlobStorageClient::with_timeout(
            &settings.delivery.container,
            settings.delivery.timeout(),
        )?),
    };

    let writer = ParquetWriter::new().with_compression(&settings.delivery.compression)?;

    Ok(RunOrchestrator::new(
        secrets,
        Arc::new(LocationReader::new(locations_file)),
        Arc::new(fetcher),
        store,
    )
    .with_secret_names(settings.secret_names())
    .with_fetch_retry(settings.weather.retry_policy())
    .with_delivery_retry(settings.delivery.retry_policy())
    .with_min_successful_locations(settings.run.min_successful_locations)
    .with_retain_raw_payload(settings.run.retain_raw_payload)
    .with_writer(writer)
    .with_progress(progress))
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
