use std::time::Duration;

use crate::errors::FailureReason;

/// One complete rendering of the run's output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSnapshot {
    /// Position of this snapshot in the run, starting at 0.
    pub seq: u64,
    /// Text to display: the cumulative answer, possibly prefixed by the activity banner.
    pub text: String,
    /// Whether `text` carries the activity banner.
    pub activity: bool,
    /// Whether this is the last snapshot of the run.
    pub is_final: bool,
}

/// Terminal state of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stream ended and all output was delivered.
    Completed { text: String },
    /// The caller cancelled the run.
    Aborted,
    /// The run failed; `text` is the caller-facing final snapshot.
    Failed { reason: FailureReason, text: String },
}

impl RunOutcome {
    /// Final text shown to the caller, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Completed { text } | Self::Failed { text, .. } => Some(text),
            Self::Aborted => None,
        }
    }
}

/// Summary returned by `RunStream::finish`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Client-side run id.
    pub run_id: uuid::Uuid,
    /// Run id announced by the backend's `start` frame.
    pub server_run_id: Option<String>,
    pub outcome: RunOutcome,
    /// Number of snapshots yielded.
    pub snapshots: u64,
    pub elapsed: Duration,
}
