pub mod batch;
pub mod location;
pub mod observation;
pub mod record_set;

pub use batch::BatchResult;
pub use location::Location;
pub use observation::{FetchErrorKind, FetchFailure, FetchOutcome, Observation};
pub use record_set::{RecordSet, WeatherRow, WEATHER_COLUMNS};
