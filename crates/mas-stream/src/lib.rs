//! Client-side coordinator for the agent backend's `/chat/stream` endpoint.
//!
//! A run turns the backend's Server-Sent Events into a sequence of cumulative
//! text snapshots: an activity banner while the agent works, the answer as it
//! streams in, and exactly one final snapshot when the run ends. Runs are
//! bounded by idle and overall timeouts and can be cancelled by the caller.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mas_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let sessions = Arc::new(SessionStore::with_token("access-token"));
//! let coordinator = Coordinator::builder()
//!     .config(StreamConfig::from_env()?)
//!     .sessions(sessions)
//!     .build()?;
//!
//! let mut run = coordinator
//!     .run(
//!         Conversation::from_user_text("What is the capital of France?"),
//!         CancelToken::new(),
//!     )
//!     .await?;
//! while let Some(snapshot) = run.next_snapshot().await {
//!     println!("{}", snapshot?.text);
//! }
//! # Ok(())
//! # }
//! ```

/// Ordered answer fragments and the cumulative buffer.
pub mod accumulator;
/// Transient "agent activity" banner.
pub mod activity;
/// Thresholds and backend location.
pub mod config;
/// Chat turns sent with a run.
pub mod conversation;
/// Entry point and builder.
pub mod coordinator;
/// Public error types.
pub mod errors;
/// Replay of the `final` answer when no tokens were streamed.
pub mod fallback;
/// Wire frames and their normalized events.
pub mod frame;
/// Idle/overall timeouts and heartbeat cadence.
pub mod liveness;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Run driver, snapshot stream, and cancellation.
pub mod run;
/// Credential collaborator.
pub mod session;
/// Snapshot and run report types.
pub mod snapshot;
/// Outbound request and SSE decoding.
pub mod transport;

pub use config::StreamConfig;
pub use conversation::{Conversation, Role, Turn};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use errors::{ChatError, FailureReason, TransportError};
pub use frame::{ParsedFrame, RawFrame, ServerEvent, parse_frame};
pub use observability::init_observability;
pub use run::{CancelToken, RunStream};
pub use session::{AuthSession, SessionSource, SessionStore};
pub use snapshot::{RunOutcome, RunReport, TextSnapshot};
pub use transport::{FrameStream, FrameTransport, HttpTransport, StreamRequest};
