use crate::utils::constants::{OBJECT_NAME_PREFIX, OBJECT_NAME_TIME_FORMAT, PARQUET_EXTENSION};
use chrono::{DateTime, Utc};

/// Object name for the artifact of the slot starting at `slot_start`:
/// `weather_data_{YYYYMMDD_HHMMSS}.parquet`.
pub fn object_name_for_slot(slot_start: DateTime<Utc>) -> String {
    format!(
        "{}{}.{}",
        OBJECT_NAME_PREFIX,
        slot_start.format(OBJECT_NAME_TIME_FORMAT),
        PARQUET_EXTENSION
    )
}
