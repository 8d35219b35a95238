pub mod cli;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod readers;
pub mod secrets;
pub mod utils;
pub mod writers;

pub use error::{PipelineError, Result};
