pub mod openweather;

pub use openweather::{OpenWeatherClient, Units};

use crate::models::{FetchOutcome, Location};
use async_trait::async_trait;

/// One remote lookup for one location.
///
/// Never fails out of band: every failure mode comes back as a
/// `FetchFailure`. Implementations do not retry.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, location: &Location, api_key: &str) -> FetchOutcome;
}
