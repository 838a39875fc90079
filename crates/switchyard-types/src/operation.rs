//! Pending remote operations and their observed states.
//!
//! A [`PendingOperation`] is created at kickoff and mutated by whichever of
//! the poll fallback or the webhook callback observes a state change first.
//! Once `completed_at` is set the record is terminal and further writes are
//! inert.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies the in-flight execution that started a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ---------------------------------------------------------------------------
// Remote state
// ---------------------------------------------------------------------------

/// Normalized status of a remote task, independent of vendor vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteStatus::Pending | RemoteStatus::Running)
    }

    /// The terminal outcome, or `None` while the task is still in flight.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            RemoteStatus::Pending | RemoteStatus::Running => None,
            RemoteStatus::Succeeded => Some(Outcome::Success),
            RemoteStatus::Failed | RemoteStatus::Cancelled | RemoteStatus::TimedOut => {
                Some(Outcome::Failure)
            }
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Pending => write!(f, "pending"),
            RemoteStatus::Running => write!(f, "running"),
            RemoteStatus::Succeeded => write!(f, "succeeded"),
            RemoteStatus::Failed => write!(f, "failed"),
            RemoteStatus::Cancelled => write!(f, "cancelled"),
            RemoteStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Terminal outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// A snapshot of the remote task as last observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    pub status: RemoteStatus,
    /// The vendor's own state string (e.g. "Executing", "timed_out").
    pub vendor_state: String,
    /// Vendor detail carried into the emitted payload.
    #[serde(default)]
    pub detail: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl RemoteState {
    pub fn new(status: RemoteStatus, vendor_state: impl Into<String>) -> Self {
        Self {
            status,
            vendor_state: vendor_state.into(),
            detail: serde_json::Value::Null,
            observed_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// PendingOperation
// ---------------------------------------------------------------------------

/// A long-running remote operation awaiting its terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub execution_id: ExecutionId,
    pub integration: String,
    /// Correlation key namespace, e.g. `deployment`.
    pub correlation_key: String,
    /// Vendor id the webhook path correlates on.
    pub correlation_value: String,
    /// Vendor task id polled for status.
    pub remote_task_id: String,
    pub kickoff_time: DateTime<Utc>,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub last_known_state: RemoteState,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Elapsed time since kickoff strictly exceeds the timeout budget.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.kickoff_time);
        let budget = i64::try_from(self.timeout_secs).unwrap_or(i64::MAX);
        elapsed.num_milliseconds() > budget.saturating_mul(1000)
    }
}

// ---------------------------------------------------------------------------
// Output channels
// ---------------------------------------------------------------------------

pub const SUCCESS_CHANNEL: &str = "success";
pub const FAILURE_CHANNEL: &str = "failure";
pub const DEFAULT_CHANNEL: &str = "default";

/// The fixed set of named output channels an integration declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannels {
    /// Separate `success` and `failure` channels.
    SuccessFailure,
    /// A single `default` channel; the outcome is carried in the payload.
    Single,
}

impl OutputChannels {
    pub fn route(&self, outcome: Outcome) -> &'static str {
        match (self, outcome) {
            (OutputChannels::SuccessFailure, Outcome::Success) => SUCCESS_CHANNEL,
            (OutputChannels::SuccessFailure, Outcome::Failure) => FAILURE_CHANNEL,
            (OutputChannels::Single, _) => DEFAULT_CHANNEL,
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            OutputChannels::SuccessFailure => &[SUCCESS_CHANNEL, FAILURE_CHANNEL],
            OutputChannels::Single => &[DEFAULT_CHANNEL],
        }
    }
}

/// A terminal emission on one output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub execution_id: ExecutionId,
    pub integration: String,
    pub channel: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}
