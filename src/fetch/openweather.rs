use crate::error::Result;
use crate::fetch::WeatherFetcher;
use crate::models::{FetchErrorKind, FetchFailure, FetchOutcome, Location, Observation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Longest response excerpt kept in a failure message
const MAX_BODY_EXCERPT: usize = 200;

/// Unit system requested from the API. `Standard` (Kelvin, m/s) sends no
/// `units` parameter at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Standard,
    Metric,
    Imperial,
}

impl Units {
    fn query_value(&self) -> Option<&'static str> {
        match self {
            Units::Standard => None,
            Units::Metric => Some("metric"),
            Units::Imperial => Some("imperial"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    #[serde(default)]
    weather: Vec<ConditionEntry>,
    main: MainBlock,
    wind: WindBlock,
    clouds: Option<CloudsBlock>,
    visibility: Option<f64>,
    dt: Option<i64>,
    sys: Option<SysBlock>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    main: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
    deg: Option<f64>,
    gust: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    all: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SysBlock {
    country: Option<String>,
}

/// OpenWeather current-weather endpoint client
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    units: Units,
}

impl OpenWeatherClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn with_settings(base_url: &str, units: Units, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            units,
        })
    }

    async fn request(
        &self,
        location: &Location,
        api_key: &str,
    ) -> std::result::Result<String, FetchFailure> {
        let mut request = self.client.get(&self.base_url).query(&[
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("appid", api_key.to_string()),
        ]);
        if let Some(units) = self.units.query_value() {
            request = request.query(&[("units", units)]);
        }

        // reqwest errors carry the URL, and with it the API key
        let response = request.send().await.map_err(|e| {
            FetchFailure::new(*location, FetchErrorKind::Network, e.without_url().to_string())
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(
                FetchFailure::new(*location, FetchErrorKind::RateLimited, status.to_string())
                    .with_status(status.as_u16()),
            );
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchFailure::new(
                *location,
                FetchErrorKind::HttpStatus,
                format!("{}: {}", status, excerpt(&body)),
            )
            .with_status(status.as_u16()));
        }

        response.text().await.map_err(|e| {
            FetchFailure::new(*location, FetchErrorKind::Network, e.without_url().to_string())
        })
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherClient {
    #[instrument(skip(self, api_key), fields(location = %location))]
    async fn fetch(&self, location: &Location, api_key: &str) -> FetchOutcome {
        let attempted_at = Utc::now();

        let body = self
            .request(location, api_key)
            .await
            .map_err(|failure| failure.with_attempted_at(attempted_at))?;

        let observation = parse_current_weather(location, &body, Utc::now()).map_err(|message| {
            FetchFailure::new(*location, FetchErrorKind::MalformedResponse, message)
                .with_attempted_at(attempted_at)
        })?;

        debug!(temperature = observation.temperature, "Fetched observation");
        Ok(observation)
    }
}

/// Turn a current-weather JSON body into an observation
pub fn parse_current_weather(
    location: &Location,
    body: &str,
    retrieved_at: DateTime<Utc>,
) -> std::result::Result<Observation, String> {
    let response: CurrentWeatherResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid weather payload: {}", e))?;

    let condition = response
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| "weather payload has no condition entry".to_string())?;

    let mut observation = Observation::new(
        *location,
        retrieved_at,
        response.main.temp,
        response.main.humidity,
        response.main.pressure,
        response.wind.speed,
        condition.main,
    );
    observation.observed_at = response
        .dt
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt, 0));
    observation.station_name = response.name.filter(|name| !name.is_empty());
    observation.country = response.sys.and_then(|sys| sys.country);
    observation.feels_like = response.main.feels_like;
    observation.temp_min = response.main.temp_min;
    observation.temp_max = response.main.temp_max;
    observation.wind_deg = response.wind.deg;
    observation.wind_gust = response.wind.gust;
    observation.cloudiness = response.clouds.and_then(|clouds| clouds.all);
    observation.visibility = response.visibility;
    observation.weather_description = condition.description;
    observation.raw_payload = body.to_string();

    Ok(observation)
}

fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((index, _)) => &body[..index],
        None => body,
    }
}
