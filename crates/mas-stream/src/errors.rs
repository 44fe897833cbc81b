/// Errors raised by a frame transport while opening or reading the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The backend could not be reached, or the connection dropped mid-stream.
    #[error("backend unreachable: {message}")]
    Offline { message: String },
    /// The backend answered with a non-success HTTP status.
    #[error("backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// Anything the coordinator does not know how to recover from.
    #[error("transport error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Creates an offline (connection-class) error.
    pub fn offline(message: impl Into<String>) -> Self {
        Self::Offline {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates an unclassified transport error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Terminal failure of a run that is reported to the caller as text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The backend rejected the credential after the run started.
    #[error("credential rejected by backend")]
    AuthRequired,
    /// The backend could not be reached.
    #[error("backend offline: {message}")]
    TransportOffline { message: String },
    /// No frame arrived within the idle threshold before the first answer token.
    #[error("agent stopped responding")]
    IdleTimeout,
    /// The run exceeded the overall threshold.
    #[error("agent took too long")]
    OverallTimeout,
    /// The stream carried an explicit `error` frame (or the backend returned an error status).
    #[error("upstream error: {message}")]
    Upstream { message: String },
}

impl FailureReason {
    /// Caller-facing text that replaces a raw error in the final snapshot.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired => "Your session has expired. Please sign in again.".to_string(),
            Self::TransportOffline { .. } => {
                "Could not reach the agent backend. Check your connection and try again."
                    .to_string()
            }
            Self::IdleTimeout => "The agent stopped responding. Please retry.".to_string(),
            Self::OverallTimeout => "The agent took too long. Please retry. \
                 If this keeps happening, restart the backend service."
                .to_string(),
            Self::Upstream { message } => format!("Error: {message}"),
        }
    }

    /// Returns true for the two supervisor-initiated timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::IdleTimeout | Self::OverallTimeout)
    }
}

/// Top-level error type for the public coordinator API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid coordinator or transport configuration.
    #[error("config error: {0}")]
    Config(String),
    /// No usable credential when the run was requested.
    #[error("authentication required")]
    AuthRequired,
    /// The conversation handed to `run` is not acceptable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The backend is unreachable.
    #[error("backend offline: {0}")]
    TransportOffline(String),
    /// No frames for the idle threshold while awaiting the first token.
    #[error("agent stopped responding")]
    IdleTimeout,
    /// The run exceeded the overall threshold.
    #[error("agent took too long")]
    OverallTimeout,
    /// The backend reported an error.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Unclassified transport failure; always surfaced raw.
    #[error(transparent)]
    Transport(TransportError),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChatError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<FailureReason> for ChatError {
    fn from(value: FailureReason) -> Self {
        match value {
            FailureReason::AuthRequired => ChatError::AuthRequired,
            FailureReason::TransportOffline { message } => ChatError::TransportOffline(message),
            FailureReason::IdleTimeout => ChatError::IdleTimeout,
            FailureReason::OverallTimeout => ChatError::OverallTimeout,
            FailureReason::Upstream { message } => ChatError::Upstream(message),
        }
    }
}

/// Classifies a transport error into a recoverable run failure.
///
/// Returns `None` for errors that must reach the caller as a hard failure.
pub(crate) fn failure_from_transport_error(err: &TransportError) -> Option<FailureReason> {
    match err {
        TransportError::Offline { message } => Some(FailureReason::TransportOffline {
            message: message.clone(),
        }),
        TransportError::Status { status: 401 | 403, .. } => Some(FailureReason::AuthRequired),
        TransportError::Status { status, message } => {
            let message = if message.trim().is_empty() {
                format!("backend returned status {status}")
            } else {
                format!("backend returned status {status}: {}", message.trim())
            };
            Some(FailureReason::Upstream { message })
        }
        TransportError::Other { .. } => None,
    }
}
