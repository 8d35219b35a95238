use super::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one fetch attempt for one location.
pub type FetchOutcome = std::result::Result<Observation, FetchFailure>;

/// One successful current-weather reading for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub location: Location,
    pub retrieved_at: DateTime<Utc>,
    /// Measurement time reported by the provider (`dt`).
    pub observed_at: Option<DateTime<Utc>>,
    pub station_name: Option<String>,
    pub country: Option<String>,
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_deg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloudiness: Option<f64>,
    pub visibility: Option<f64>,
    pub weather_condition: String,
    pub weather_description: Option<String>,
    /// Response body exactly as received.
    pub raw_payload: String,
}

impl Observation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        location: Location,
        retrieved_at: DateTime<Utc>,
        temperature: f64,
        humidity: f64,
        pressure: f64,
        wind_speed: f64,
        weather_condition: String,
    ) -> Self {
        Self {
            location,
            retrieved_at,
            observed_at: None,
            station_name: None,
            country: None,
            temperature,
            feels_like: None,
            temp_min: None,
            temp_max: None,
            humidity,
            pressure,
            wind_speed,
            wind_deg: None,
            wind_gust: None,
            cloudiness: None,
            visibility: None,
            weather_condition,
            weather_description: None,
            raw_payload: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Network,
    HttpStatus,
    MalformedResponse,
    RateLimited,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::HttpStatus => "http_status",
            FetchErrorKind::MalformedResponse => "malformed_response",
            FetchErrorKind::RateLimited => "rate_limited",
        }
    }

    /// Transient failures worth another attempt. A rejected key or an
    /// unparseable body will not get better by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchErrorKind::Network | FetchErrorKind::RateLimited)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure for one location. Carries no observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub location: Location,
    pub kind: FetchErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub attempted_at: DateTime<Utc>,
    pub attempts: u32,
}

impl FetchFailure {
    pub fn new(location: Location, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            location,
            kind,
            message: message.into(),
            status: None,
            attempted_at: Utc::now(),
            attempts: 1,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_attempted_at(mut self, attempted_at: DateTime<Utc>) -> Self {
        self.attempted_at = attempted_at;
        self
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed with {} after {} attempt(s): {}",
            self.location, self.kind, self.attempts, self.message
        )
    }
}
