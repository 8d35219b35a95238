use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weather-pipeline")]
#[command(about = "Fetch current weather for a set of locations and deliver it as one Parquet artifact")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Settings file [default: weather-pipeline.toml if present]")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one run for a schedule slot
    Run {
        #[arg(
            long,
            help = "Scheduler's nominal run time, RFC 3339 [default: now]"
        )]
        logical_time: Option<DateTime<Utc>>,

        #[arg(short, long, help = "Locations file, overrides settings")]
        locations: Option<PathBuf>,

        #[arg(long, default_value = "false")]
        progress: bool,
    },

    /// Load and validate the locations file without fetching anything
    ValidateLocations {
        #[arg(short, long, help = "Locations file, overrides settings")]
        locations: Option<PathBuf>,
    },

    /// Show details of a delivered Parquet artifact
    Inspect {
        #[arg(short, long, help = "Parquet file to inspect")]
        file: PathBuf,

        #[arg(long, default_value = "0", help = "Number of sample rows to display")]
        sample: usize,
    },
}
