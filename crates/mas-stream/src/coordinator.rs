use std::sync::Arc;

use tracing::{info, warn};

use crate::config::StreamConfig;
use crate::conversation::Conversation;
use crate::errors::ChatError;
use crate::run::{CancelToken, RunStream};
use crate::session::SessionSource;
use crate::snapshot::RunReport;
use crate::transport::{FrameTransport, HttpTransport, StreamRequest};

pub(crate) struct CoordinatorInner {
    transport: Arc<dyn FrameTransport>,
    sessions: Arc<dyn SessionSource>,
    config: StreamConfig,
}

/// Entry point for streaming chat runs against the agent backend.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Starts a builder for wiring the session source, transport, and thresholds.
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Returns the validated configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Prepares a run for `conversation`.
    ///
    /// Fails before any network activity when no session is active or the
    /// triggering turn is not a non-empty user message. The returned stream is
    /// lazy: the request is sent on the first `next_snapshot` call.
    pub async fn run(
        &self,
        conversation: Conversation,
        cancel: CancelToken,
    ) -> Result<RunStream, ChatError> {
        let session = self
            .inner
            .sessions
            .active_session()
            .await
            .filter(|s| !s.token().trim().is_empty());
        let Some(session) = session else {
            warn!("chat run requested without an active session");
            return Err(ChatError::AuthRequired);
        };
        conversation.validate()?;

        let (history, message) = conversation.into_parts();
        let request = StreamRequest {
            run_id: uuid::Uuid::new_v4(),
            message: message.content,
            history,
            token: session.token().to_string(),
        };
        info!(
            run_id = %request.run_id,
            history = request.history.len(),
            "starting chat run"
        );
        Ok(RunStream::start(
            self.inner.transport.clone(),
            request,
            &self.inner.config,
            cancel,
        ))
    }

    /// Runs `conversation` to its end, discarding intermediate snapshots.
    pub async fn collect(
        &self,
        conversation: Conversation,
        cancel: CancelToken,
    ) -> Result<RunReport, ChatError> {
        self.run(conversation, cancel).await?.finish().await
    }
}

/// Builder for [`Coordinator`].
#[derive(Default)]
pub struct CoordinatorBuilder {
    transport: Option<Arc<dyn FrameTransport>>,
    sessions: Option<Arc<dyn SessionSource>>,
    config: Option<StreamConfig>,
}

impl CoordinatorBuilder {
    /// Sets thresholds and backend location. Defaults to `StreamConfig::default()`.
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the transport. Defaults to [`HttpTransport`] for `config.base_url`.
    pub fn transport(mut self, transport: Arc<dyn FrameTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets where credentials are read from. Required.
    pub fn sessions(mut self, sessions: Arc<dyn SessionSource>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Validates the configuration and builds the coordinator.
    pub fn build(self) -> Result<Coordinator, ChatError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let sessions = self
            .sessions
            .ok_or_else(|| ChatError::Config("a session source is required".to_string()))?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config)?),
        };
        Ok(Coordinator {
            inner: Arc::new(CoordinatorInner {
                transport,
                sessions,
                config,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::conversation::Turn;
    use crate::errors::TransportError;
    use crate::frame::RawFrame;
    use crate::session::SessionStore;
    use crate::transport::FrameStream;

    #[derive(Default)]
    struct CountingTransport {
        opened: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FrameTransport for CountingTransport {
        async fn open(&self, _request: StreamRequest) -> Result<FrameStream, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(futures::stream::empty::<Result<RawFrame, TransportError>>()))
        }
    }

    fn coordinator(sessions: SessionStore, transport: Arc<CountingTransport>) -> Coordinator {
        Coordinator::builder()
            .sessions(Arc::new(sessions))
            .transport(transport)
            .build()
            .expect("coordinator")
    }

    #[test]
    fn build_requires_a_session_source() {
        let result = Coordinator::builder()
            .transport(Arc::new(CountingTransport::default()))
            .build();
        assert!(
            matches!(result, Err(ChatError::Config(message)) if message.contains("session source"))
        );
    }

    #[test]
    fn build_rejects_invalid_thresholds() {
        let result = Coordinator::builder()
            .sessions(Arc::new(SessionStore::new()))
            .transport(Arc::new(CountingTransport::default()))
            .config(StreamConfig::default().idle_timeout(Duration::ZERO))
            .build();
        assert!(matches!(result, Err(ChatError::Config(_))));
    }

    #[tokio::test]
    async fn signed_out_runs_fail_before_any_request() {
        let transport = Arc::new(CountingTransport::default());
        let coordinator = coordinator(SessionStore::new(), transport.clone());
        let result = coordinator
            .run(Conversation::from_user_text("hello"), CancelToken::new())
            .await;
        assert!(matches!(result, Err(ChatError::AuthRequired)));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_user_trigger_is_invalid_input() {
        let transport = Arc::new(CountingTransport::default());
        let coordinator = coordinator(SessionStore::with_token("tok"), transport.clone());
        let conversation = Conversation::new(vec![], Turn::assistant("not a question"));
        let result = coordinator.run(conversation, CancelToken::new()).await;
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn runs_are_lazy_until_polled() {
        let transport = Arc::new(CountingTransport::default());
        let coordinator = coordinator(SessionStore::with_token("tok"), transport.clone());
        let mut run = coordinator
            .run(Conversation::from_user_text("hello"), CancelToken::new())
            .await
            .expect("run");
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);

        let first = run.next_snapshot().await.expect("snapshot").expect("ok");
        assert!(first.is_final);
        assert_eq!(first.text, "");
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    }
}
