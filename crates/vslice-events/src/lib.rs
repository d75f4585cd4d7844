//! vslice Events
//!
//! The single channel through which pipeline components report progress.
//!
//! # Core Concepts
//!
//! - [`AgentEvent`]: immutable, ordered record of one thing that happened
//! - [`EventPayload`]: closed tagged union describing the event kind
//! - [`EventSink`]: append / `stream_since` contract
//! - [`MemoryEventSink`]: hash-chained in-memory log with live subscription
//! - [`ConfidenceAggregator`]: clamped [0, 1] score per project or slice
//!
//! Appending an event that carries a confidence delta updates the
//! aggregator in the same critical section, so replaying the event log in
//! order reproduces every score.
//!
//! # Example
//!
//! ```rust,ignore
//! let confidence = Arc::new(ConfidenceAggregator::new(0.85));
//! let sink = MemoryEventSink::new(confidence.clone());
//!
//! sink.append(
//!     NewEvent::slice(project, slice, EventPayload::CodeWrite { path, lines }, "wrote login.ts")
//!         .with_delta(0.02),
//! )
//! .await?;
//! assert!(confidence.score(ScoreKey::Slice(slice)) > 0.0);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod confidence;
mod error;
mod event;
mod retry;
mod sink;

pub use confidence::{clamp_step, ConfidenceAggregator, ScoreKey};
pub use error::EventError;
pub use event::{AgentEvent, EventId, EventKind, EventPayload, NewEvent, Signal};
pub use retry::append_with_retry;
pub use sink::{EventSink, MemoryEventSink};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
