use super::{FetchErrorKind, FetchFailure, FetchOutcome, Location, Observation};

/// Every per-location outcome of one run, in location order.
///
/// Each location lands in exactly one of the two sequences.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub observations: Vec<Observation>,
    pub failures: Vec<FetchFailure>,
}

impl BatchResult {
    /// Build a result from slots indexed by original location order. An empty
    /// slot means the fetch task never reported back and counts as a failure.
    pub fn from_slots(locations: &[Location], slots: Vec<Option<FetchOutcome>>) -> Self {
        let mut result = Self::default();

        for (location, slot) in locations.iter().zip(slots) {
            match slot {
                Some(Ok(observation)) => result.observations.push(observation),
                Some(Err(failure)) => result.failures.push(failure),
                None => result.failures.push(FetchFailure::new(
                    *location,
                    FetchErrorKind::Network,
                    "fetch task did not complete",
                )),
            }
        }

        result
    }

    pub fn total(&self) -> usize {
        self.observations.len() + self.failures.len()
    }

    pub fn is_all_failed(&self) -> bool {
        self.observations.is_empty()
    }

    /// Check that the outcomes cover `locations` exactly once, in order.
    pub fn covers(&self, locations: &[Location]) -> bool {
        if self.total() != locations.len() {
            return false;
        }

        let mut observations = self.observations.iter().peekable();
        let mut failures = self.failures.iter().peekable();

        locations.iter().all(|location| {
            if observations.peek().is_some_and(|o| o.location == *location) {
                observations.next();
                true
            } else if failures.peek().is_some_and(|f| f.location == *location) {
                failures.next();
                true
            } else {
                false
            }
        })
    }
}
