use crate::models::FetchFailure;
use crate::pipeline::ScheduleSlot;
use std::fmt;
use tracing::{error, info};

/// Why a run ended in `FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    Secrets,
    Config,
    AllSourcesDown,
    InsufficientCoverage,
    Combine,
    Serialize,
    Delivery,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Secrets => "secrets",
            FailureReason::Config => "config",
            FailureReason::AllSourcesDown => "all_sources_down",
            FailureReason::InsufficientCoverage => "insufficient_coverage",
            FailureReason::Combine => "combine",
            FailureReason::Serialize => "serialize",
            FailureReason::Delivery => "delivery",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Init,
    SecretsResolved,
    LocationsLoaded,
    Fetched,
    Combined,
    Serialized,
    Delivered,
    Failed(FailureReason),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Delivered | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => f.write_str("INIT"),
            RunState::SecretsResolved => f.write_str("SECRETS_RESOLVED"),
            RunState::LocationsLoaded => f.write_str("LOCATIONS_LOADED"),
            RunState::Fetched => f.write_str("FETCHED"),
            RunState::Combined => f.write_str("COMBINED"),
            RunState::Serialized => f.write_str("SERIALIZED"),
            RunState::Delivered => f.write_str("DELIVERED"),
            RunState::Failed(reason) => write!(f, "FAILED({})", reason),
        }
    }
}

/// Outcome of one run, including every state it passed through
#[derive(Debug, Clone)]
pub struct RunReport {
    pub slot: ScheduleSlot,
    pub object_name: String,
    pub state: RunState,
    pub history: Vec<RunState>,
    pub locations: usize,
    pub rows: usize,
    pub failures: Vec<FetchFailure>,
    pub bytes: usize,
    pub delivery_attempts: u32,
    pub reason: Option<FailureReason>,
    pub detail: Option<String>,
}

impl RunReport {
    pub fn new(slot: ScheduleSlot) -> Self {
        Self {
            slot,
            object_name: slot.object_name(),
            state: RunState::Init,
            history: vec![RunState::Init],
            locations: 0,
            rows: 0,
            failures: Vec::new(),
            bytes: 0,
            delivery_attempts: 0,
            reason: None,
            detail: None,
        }
    }

    /// Move to the next state. Terminal reports stay where they are.
    pub fn advance(&mut self, next: RunState) {
        if self.state.is_terminal() {
            return;
        }
        info!(slot = %self.slot, from = %self.state, to = %next, "Run state change");
        self.state = next;
        self.history.push(next);
    }

    /// End the run as failed
    pub fn fail(mut self, reason: FailureReason, detail: impl fmt::Display) -> Self {
        if self.state.is_terminal() {
            return self;
        }
        let detail = detail.to_string();
        error!(slot = %self.slot, at = %self.state, reason = %reason, "Run failed: {}", detail);

        self.state = RunState::Failed(reason);
        self.history.push(self.state);
        self.reason = Some(reason);
        self.detail = Some(detail);
        self
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Delivered
    }

    pub fn reached(&self, state: RunState) -> bool {
        self.history.contains(&state)
    }

    /// Locations that produced an observation, once the fetch step has run
    pub fn succeeded(&self) -> usize {
        if self.reached(RunState::Fetched) {
            self.locations.saturating_sub(self.failures.len())
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Run Summary:\n\
            - Slot: {}\n\
            - Object: {}\n\
            - State: {}\n\
            - Locations: {} ({} succeeded, {} failed)\n\
            - Artifact size: {:.1} KB",
            self.slot,
            self.object_name,
            self.state,
            self.locations,
            self.succeeded(),
            self.failures.len(),
            self.bytes as f64 / 1024.0,
        );

        if self.delivery_attempts > 1 {
            summary.push_str(&format!("\n- Upload attempts: {}", self.delivery_attempts));
        }
        if let Some(ref detail) = self.detail {
            summary.push_str(&format!("\n- Detail: {}", detail));
        }
        for failure in &self.failures {
            summary.push_str(&format!("\n  ! {}", failure));
        }

        summary
    }
}
