use futures::StreamExt as _;
use tracing::debug;

use crate::config::StreamConfig;
use crate::errors::{ChatError, TransportError};

use super::sse::{ByteStream, sse_frame_stream};
use super::{FrameStream, FrameTransport, StreamRequest};

/// `reqwest`-backed transport for the `/chat/stream` endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    stream_url: String,
}

impl HttpTransport {
    /// Builds a client for `config.base_url`.
    ///
    /// Only the connect phase has a timeout; the stream itself is bounded by the
    /// coordinator's idle and overall thresholds.
    pub fn new(config: &StreamConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            stream_url: config.stream_url(),
        })
    }
}

#[async_trait::async_trait]
impl FrameTransport for HttpTransport {
    async fn open(&self, request: StreamRequest) -> Result<FrameStream, TransportError> {
        debug!(run_id = %request.run_id, url = %self.stream_url, history = request.history.len(), "opening chat stream");
        let response = self
            .client
            .post(&self.stream_url)
            .bearer_auth(&request.token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.body())
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::status(status.as_u16(), body));
        }

        let bytes_stream: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| classify_read_error(&e))),
        );
        Ok(sse_frame_stream(bytes_stream))
    }
}

fn classify_request_error(err: &reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        TransportError::offline(format!("chat stream request failed: {err}"))
    } else {
        TransportError::other(format!("chat stream request failed: {err}"))
    }
}

fn classify_read_error(err: &reqwest::Error) -> TransportError {
    if err.is_body() || err.is_timeout() || err.is_connect() {
        TransportError::offline(format!("chat stream read failed: {err}"))
    } else {
        TransportError::other(format!("chat stream read failed: {err}"))
    }
}
