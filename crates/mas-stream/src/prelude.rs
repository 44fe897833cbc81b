//! Common imports for typical coordinator usage.
pub use crate::{
    CancelToken, ChatError, Conversation, Coordinator, FailureReason, RunOutcome, RunReport,
    RunStream, SessionStore, StreamConfig, TextSnapshot, Turn,
};
