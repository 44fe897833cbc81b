use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt as _;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::accumulator::TextAccumulator;
use crate::activity::ActivityTracker;
use crate::config::StreamConfig;
use crate::errors::{ChatError, FailureReason, TransportError, failure_from_transport_error};
use crate::fallback::FallbackReconciler;
use crate::frame::{RawFrame, ServerEvent, parse_frame};
use crate::liveness::LivenessSupervisor;
use crate::snapshot::{RunOutcome, RunReport, TextSnapshot};
use crate::transport::{FrameStream, FrameTransport, StreamRequest};

/// Caller-side cancellation signal for a run.
///
/// Clones share the same signal. Cancelling is idempotent.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every run holding this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once `cancel` was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Why the outbound request was stopped. Recorded before the request is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StopCause {
    Caller,
    Failure(FailureReason),
}

enum Source {
    Opening(BoxFuture<'static, Result<FrameStream, TransportError>>),
    Streaming(FrameStream),
    Closed,
}

enum Input {
    Opened(Result<FrameStream, TransportError>),
    Frame(Option<Result<RawFrame, TransportError>>),
}

async fn next_input(source: &mut Source) -> Input {
    match source {
        Source::Opening(open) => Input::Opened(open.await),
        Source::Streaming(frames) => Input::Frame(frames.next().await),
        Source::Closed => futures::future::pending().await,
    }
}

/// Mutable state of one run, owned by its `RunStream`.
struct RunState {
    accumulator: TextAccumulator,
    activity: ActivityTracker,
    fallback: FallbackReconciler,
    liveness: LivenessSupervisor,
    saw_answer_token: bool,
    ended: bool,
    server_run_id: Option<String>,
    stop_cause: Option<StopCause>,
}

impl RunState {
    fn new(config: &StreamConfig, now: Instant) -> Self {
        Self {
            accumulator: TextAccumulator::new(),
            activity: ActivityTracker::new(),
            fallback: FallbackReconciler::new(),
            liveness: LivenessSupervisor::new(config, now),
            saw_answer_token: false,
            ended: false,
            server_run_id: None,
            stop_cause: None,
        }
    }

    fn awaiting_first_output(&self) -> bool {
        !self.ended
            && !self.saw_answer_token
            && self.accumulator.is_empty()
            && !self.accumulator.has_pending()
    }

    /// Streamed text, or the `final` answer when nothing was streamed.
    fn answer_text(&self) -> String {
        if self.accumulator.is_empty() {
            self.fallback.safety_net().unwrap_or_default().to_string()
        } else {
            self.accumulator.text().to_string()
        }
    }
}

/// Lazily-driven sequence of snapshots for one run.
///
/// Nothing is sent until the first call to [`RunStream::next_snapshot`]. Dropping
/// the stream cancels the outbound request.
pub struct RunStream {
    run_id: uuid::Uuid,
    raw_failures: bool,
    cancel: CancelToken,
    cancel_rx: watch::Receiver<bool>,
    ticker: Interval,
    source: Source,
    state: RunState,
    outbox: VecDeque<Result<TextSnapshot, ChatError>>,
    seq: u64,
    terminal: Option<Result<RunReport, ChatError>>,
    launched: bool,
}

impl RunStream {
    pub(crate) fn start(
        transport: Arc<dyn FrameTransport>,
        request: StreamRequest,
        config: &StreamConfig,
        cancel: CancelToken,
    ) -> Self {
        let run_id = request.run_id;
        let open: BoxFuture<'static, Result<FrameStream, TransportError>> =
            Box::pin(async move { transport.open(request).await });
        let mut ticker = tokio::time::interval(config.drain_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel_rx = cancel.subscribe();
        Self {
            run_id,
            raw_failures: config.raw_failures,
            cancel,
            cancel_rx,
            ticker,
            source: Source::Opening(open),
            state: RunState::new(config, Instant::now()),
            outbox: VecDeque::new(),
            seq: 0,
            terminal: None,
            launched: false,
        }
    }

    /// Returns the client-side run id.
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns the token that cancels this run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drives the run until the next snapshot is ready.
    ///
    /// Returns `None` once the run reached its terminal state and everything was
    /// yielded. `Err` items are hard failures (or any failure when raw failures
    /// were requested); they are always the last item.
    pub async fn next_snapshot(&mut self) -> Option<Result<TextSnapshot, ChatError>> {
        loop {
            if let Some(item) = self.outbox.pop_front() {
                return Some(item);
            }
            if self.terminal.is_some() {
                return None;
            }
            self.step().await;
        }
    }

    /// Drains the run (if needed) and returns its report.
    ///
    /// Aborted and recoverable failed runs are `Ok` with the matching outcome.
    pub async fn finish(mut self) -> Result<RunReport, ChatError> {
        while self.next_snapshot().await.is_some() {}
        self.terminal.take().unwrap_or_else(|| {
            Err(ChatError::protocol_msg(
                "run ended without a terminal outcome",
            ))
        })
    }

    /// Adapts the run into a `futures::Stream` of snapshots.
    pub fn into_stream(
        self,
    ) -> impl futures::Stream<Item = Result<TextSnapshot, ChatError>> + Send {
        futures::stream::unfold(self, |mut run| async move {
            run.next_snapshot().await.map(|item| (item, run))
        })
    }

    async fn step(&mut self) {
        if !self.launched {
            self.launch();
        }
        if self.cancel.is_cancelled() && self.cancel_by_caller() {
            return;
        }
        tokio::select! {
            biased;
            changed = self.cancel_rx.changed() => {
                if changed.is_ok() && *self.cancel_rx.borrow() {
                    self.cancel_by_caller();
                }
            }
            _ = self.ticker.tick() => self.on_tick(),
            input = next_input(&mut self.source) => self.on_input(input),
        }
    }

    /// Starts the run clock and the drain ticker on the first poll.
    fn launch(&mut self) {
        self.launched = true;
        self.state.liveness.restart(Instant::now());
        self.ticker.reset_immediately();
        debug!(run_id = %self.run_id, "chat run launched");
    }

    fn on_tick(&mut self) {
        let now = Instant::now();

        let drained = self.state.accumulator.drain_tick();
        let activity_changed = self.state.activity.take_dirty();
        if drained || activity_changed {
            self.push_snapshot();
        }

        let awaiting = self.state.awaiting_first_output();
        if let Some(reason) = self.state.liveness.check(now, awaiting).failure() {
            warn!(
                run_id = %self.run_id,
                elapsed_ms = self.state.liveness.elapsed(now).as_millis() as u64,
                idle_ms = self.state.liveness.idle_for(now).as_millis() as u64,
                reason = %reason,
                "liveness threshold breached"
            );
            self.fail(reason);
            return;
        }
        if awaiting && self.state.activity.is_visible() {
            if let Some(line) = self.state.liveness.heartbeat(now) {
                self.state.activity.set_heartbeat(line);
            }
        }

        if self.state.ended
            && !self.state.accumulator.has_pending()
            && !self.state.activity.has_pending_update()
        {
            self.complete();
        }
    }

    fn on_input(&mut self, input: Input) {
        match input {
            Input::Opened(Ok(frames)) => {
                debug!(run_id = %self.run_id, "chat stream accepted");
                self.source = Source::Streaming(frames);
            }
            Input::Opened(Err(err)) | Input::Frame(Some(Err(err))) => {
                self.on_transport_error(err)
            }
            Input::Frame(Some(Ok(raw))) => self.on_frame(raw),
            Input::Frame(None) => {
                debug!(run_id = %self.run_id, "chat stream closed by backend");
                self.state.ended = true;
                self.source = Source::Closed;
            }
        }
    }

    fn on_frame(&mut self, raw: RawFrame) {
        self.state.liveness.record_frame(Instant::now());
        let Some(parsed) = parse_frame(&raw) else {
            debug!(run_id = %self.run_id, bytes = raw.data.len(), "dropping unrecognized frame");
            return;
        };
        debug!(
            run_id = %self.run_id,
            kind = parsed.event.kind(),
            agent_id = parsed.agent_id.as_deref().unwrap_or("-"),
            "frame received"
        );

        let state = &mut self.state;
        match parsed.event {
            ServerEvent::Started { run_id } => {
                if run_id.is_some() {
                    state.server_run_id = run_id;
                }
            }
            ServerEvent::AnswerToken { text } => {
                if !state.saw_answer_token {
                    state.saw_answer_token = true;
                    state.activity.hide();
                }
                state.accumulator.enqueue(text);
            }
            ServerEvent::Final { answer } => {
                let animated =
                    state
                        .fallback
                        .on_final(&answer, state.saw_answer_token, &mut state.accumulator);
                if animated {
                    debug!(run_id = %self.run_id, "no tokens streamed; replaying final answer");
                    state.activity.hide();
                }
            }
            ServerEvent::Error { message } => {
                self.fail(FailureReason::Upstream { message });
            }
            ServerEvent::Done => {
                state.ended = true;
                self.source = Source::Closed;
            }
            other => {
                state.activity.apply(&other);
            }
        }
    }

    fn on_transport_error(&mut self, err: TransportError) {
        match failure_from_transport_error(&err) {
            Some(reason) => {
                warn!(run_id = %self.run_id, error = %err, "chat stream transport failed");
                self.fail(reason);
            }
            None => self.hard_fail(ChatError::Transport(err)),
        }
    }

    /// Records the cause and only then drops the outbound request.
    fn stop_outbound(&mut self, cause: StopCause) -> StopCause {
        let cause = self.state.stop_cause.get_or_insert(cause).clone();
        self.source = Source::Closed;
        cause
    }

    /// Handles a caller cancel. Returns true if the run stopped.
    ///
    /// Once the stream has ended every frame is already in hand, so the cause
    /// is only recorded and the run drains to completion.
    fn cancel_by_caller(&mut self) -> bool {
        if self.terminal.is_some() {
            return true;
        }
        if self.state.ended {
            if self.state.stop_cause.is_none() {
                debug!(run_id = %self.run_id, "cancel after end of stream; draining");
                self.state.stop_cause = Some(StopCause::Caller);
            }
            return false;
        }
        match self.stop_outbound(StopCause::Caller) {
            StopCause::Caller => {
                self.outbox.clear();
                self.finish_with(Ok(RunOutcome::Aborted));
            }
            StopCause::Failure(reason) => self.finish_failed(reason),
        }
        true
    }

    fn fail(&mut self, reason: FailureReason) {
        if self.terminal.is_some() {
            return;
        }
        match self.stop_outbound(StopCause::Failure(reason)) {
            StopCause::Failure(reason) => self.finish_failed(reason),
            StopCause::Caller => self.finish_with(Ok(RunOutcome::Aborted)),
        }
    }

    fn complete(&mut self) {
        let text = self.state.answer_text();
        self.push_final(text.clone());
        self.finish_with(Ok(RunOutcome::Completed { text }));
    }

    fn finish_failed(&mut self, reason: FailureReason) {
        if self.raw_failures {
            let err = ChatError::from(reason);
            self.outbox.push_back(Err(err.clone()));
            self.finish_with(Err(err));
            return;
        }
        self.state.accumulator.drain(None);
        let answer = self.state.answer_text();
        let message = reason.user_message();
        let text = if answer.is_empty() {
            message
        } else {
            format!("{answer}\n\n{message}")
        };
        self.push_final(text.clone());
        self.finish_with(Ok(RunOutcome::Failed { reason, text }));
    }

    fn hard_fail(&mut self, err: ChatError) {
        if self.terminal.is_some() {
            return;
        }
        self.source = Source::Closed;
        self.outbox.push_back(Err(err.clone()));
        self.finish_with(Err(err));
    }

    fn finish_with(&mut self, result: Result<RunOutcome, ChatError>) {
        self.source = Source::Closed;
        let elapsed = self.state.liveness.elapsed(Instant::now());
        let result = result.map(|outcome| RunReport {
            run_id: self.run_id,
            server_run_id: self.state.server_run_id.clone(),
            outcome,
            snapshots: self.seq,
            elapsed,
        });
        match &result {
            Ok(report) => info!(
                run_id = %self.run_id,
                outcome = outcome_label(&report.outcome),
                snapshots = report.snapshots,
                elapsed_ms = elapsed.as_millis() as u64,
                "chat run finished"
            ),
            Err(err) => warn!(run_id = %self.run_id, error = %err, "chat run failed"),
        }
        self.terminal = Some(result);
    }

    fn push_snapshot(&mut self) {
        let answer = self.state.accumulator.text();
        let activity = self.state.activity.banner().is_some();
        let text = self.state.activity.render(answer);
        self.push(text, activity, false);
    }

    /// Pushes the final snapshot, promoting a queued snapshot with the same text.
    fn push_final(&mut self, text: String) {
        if let Some(Ok(last)) = self.outbox.back_mut()
            && !last.is_final
            && last.text == text
        {
            last.is_final = true;
            last.activity = false;
            return;
        }
        self.push(text, false, true);
    }

    fn push(&mut self, text: String, activity: bool, is_final: bool) {
        let snapshot = TextSnapshot {
            seq: self.seq,
            text,
            activity,
            is_final,
        };
        self.seq = self.seq.saturating_add(1);
        self.outbox.push_back(Ok(snapshot));
    }
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
    match outcome {
        RunOutcome::Completed { .. } => "completed",
        RunOutcome::Aborted => "aborted",
        RunOutcome::Failed { reason, .. } if reason.is_timeout() => "timed_out",
        RunOutcome::Failed { .. } => "failed",
    }
}
