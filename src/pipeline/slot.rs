use crate::error::{PipelineError, Result};
use crate::utils::constants::MAX_SLOT_MINUTES;
use crate::utils::filename::object_name_for_slot;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::fmt;

/// The nominal time bucket a run belongs to.
///
/// Slots are aligned to multiples of their width since the Unix epoch, so an
/// hourly slot always starts on the hour whatever time the run actually fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleSlot {
    start: DateTime<Utc>,
    minutes: u32,
}

impl ScheduleSlot {
    pub fn containing(logical_time: DateTime<Utc>, slot_minutes: u32) -> Result<Self> {
        if slot_minutes == 0 || slot_minutes > MAX_SLOT_MINUTES {
            return Err(PipelineError::Config(format!(
                "slot_minutes must be between 1 and {}, got {}",
                MAX_SLOT_MINUTES, slot_minutes
            )));
        }

        let width = i64::from(slot_minutes) * 60;
        let seconds = logical_time.timestamp();
        let floored = seconds - seconds.rem_euclid(width);

        let start = DateTime::<Utc>::from_timestamp(floored, 0).ok_or_else(|| {
            PipelineError::Config(format!("logical time out of range: {}", logical_time))
        })?;

        Ok(Self {
            start,
            minutes: slot_minutes,
        })
    }

    pub fn hourly(logical_time: DateTime<Utc>) -> Result<Self> {
        Self::containing(logical_time, 60)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.minutes))
    }

    pub fn object_name(&self) -> String {
        object_name_for_slot(self.start)
    }
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}m)",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.minutes
        )
    }
}
