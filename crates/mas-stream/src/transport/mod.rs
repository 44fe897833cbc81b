//! Outbound request plumbing.
//!
//! A [`FrameTransport`] opens the single streaming request of a run and yields
//! raw frames until the backend closes the stream. Dropping the returned stream
//! cancels the request.
mod http;
pub(crate) mod sse;

use std::pin::Pin;

pub use http::HttpTransport;
pub use sse::SseDecoder;

use crate::conversation::Turn;
use crate::errors::TransportError;
use crate::frame::RawFrame;

/// Frames produced by an open request.
pub type FrameStream =
    Pin<Box<dyn futures::Stream<Item = Result<RawFrame, TransportError>> + Send + 'static>>;

/// Everything needed to open the stream for one run.
#[derive(Clone)]
pub struct StreamRequest {
    /// Client-side run id, used for logging.
    pub run_id: uuid::Uuid,
    /// Text of the triggering user turn.
    pub message: String,
    /// Prior turns in chronological order.
    pub history: Vec<Turn>,
    /// Bearer token read from the session collaborator.
    pub token: String,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("run_id", &self.run_id)
            .field("message", &self.message)
            .field("history", &self.history.len())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl StreamRequest {
    /// JSON body expected by `/chat/stream`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "history": self.history,
        })
    }
}

/// Opens the outbound streaming request.
#[async_trait::async_trait]
pub trait FrameTransport: Send + Sync {
    /// Sends the request and returns the frame stream once the backend accepts it.
    async fn open(&self, request: StreamRequest) -> Result<FrameStream, TransportError>;
}
