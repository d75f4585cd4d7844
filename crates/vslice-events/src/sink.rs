//! Event sinks
//!
//! [`MemoryEventSink`] keeps a SHA-256 hash chain over the log, the same way
//! an audit log would, so replay consumers can detect a tampered history.

use crate::confidence::{ConfidenceAggregator, ScoreKey};
use crate::error::EventError;
use crate::event::{AgentEvent, EventId, NewEvent};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use vslice_model::ProjectId;

const ZERO_HASH: [u8; 32] = [0u8; 32];

/// Append-only event log
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append an event; the only mutation
    ///
    /// Events with a confidence delta (or of kind `confidence_update`)
    /// update the slice score, or the project score when `slice_id` is
    /// `None`. Re-appending an idempotency key returns the original id.
    async fn append(&self, event: NewEvent) -> Result<EventId, EventError>;

    /// Events for `project` strictly after `cursor`, in append order
    async fn stream_since(
        &self,
        project: ProjectId,
        cursor: EventId,
    ) -> Result<Vec<AgentEvent>, EventError>;
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<AgentEvent>,
    keys: HashMap<String, EventId>,
    last_hash: [u8; 32],
}

/// In-memory, hash-chained event log
#[derive(Debug)]
pub struct MemoryEventSink {
    inner: Mutex<LogState>,
    confidence: Arc<ConfidenceAggregator>,
    live: broadcast::Sender<AgentEvent>,
}

impl MemoryEventSink {
    /// Create a sink feeding `confidence`
    #[must_use]
    pub fn new(confidence: Arc<ConfidenceAggregator>) -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            inner: Mutex::new(LogState {
                last_hash: ZERO_HASH,
                ..LogState::default()
            }),
            confidence,
            live,
        }
    }

    /// Aggregator updated by this sink
    #[inline]
    #[must_use]
    pub fn confidence(&self) -> &Arc<ConfidenceAggregator> {
        &self.confidence
    }

    /// Receive every event appended from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.live.subscribe()
    }

    /// Snapshot of the whole log
    #[must_use]
    pub fn events(&self) -> Vec<AgentEvent> {
        self.inner.lock().events.clone()
    }

    /// Number of stored events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute the hash chain
    ///
    /// # Errors
    /// Returns [`EventError::Integrity`] naming the first bad event.
    pub fn verify_integrity(&self) -> Result<(), EventError> {
        let guard = self.inner.lock();
        let mut prev = hex::encode(ZERO_HASH);
        for event in &guard.events {
            if event.prev_hash != prev || event.hash != hex::encode(compute_hash(event)) {
                return Err(EventError::Integrity(event.id.0));
            }
            prev.clone_from(&event.hash);
        }
        Ok(())
    }

    fn append_locked(&self, state: &mut LogState, event: NewEvent) -> AgentEvent {
        let id = EventId(state.events.len() as u64 + 1);

        let score_after = if event.affects_confidence() {
            let key = match event.slice_id {
                Some(slice) => ScoreKey::Slice(slice),
                None => ScoreKey::Project(event.project_id),
            };
            Some(
                self.confidence
                    .apply_delta(key, event.confidence_delta.unwrap_or(0.0)),
            )
        } else {
            None
        };

        let mut stored = AgentEvent {
            id,
            project_id: event.project_id,
            slice_id: event.slice_id,
            payload: event.payload,
            content: event.content,
            confidence_delta: event.confidence_delta,
            score_after,
            created_at: Utc::now(),
            prev_hash: hex::encode(state.last_hash),
            hash: String::new(),
        };
        let hash = compute_hash(&stored);
        stored.hash = hex::encode(hash);
        state.last_hash = hash;

        if let Some(key) = event.idempotency_key {
            state.keys.insert(key, id);
        }
        state.events.push(stored.clone());
        stored
    }
}

impl Default for MemoryEventSink {
    fn default() -> Self {
        Self::new(Arc::new(ConfidenceAggregator::default()))
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn append(&self, event: NewEvent) -> Result<EventId, EventError> {
        let stored = {
            let mut state = self.inner.lock();
            if let Some(existing) = event
                .idempotency_key
                .as_ref()
                .and_then(|key| state.keys.get(key))
            {
                return Ok(*existing);
            }
            self.append_locked(&mut state, event)
        };

        tracing::debug!(
            event_id = %stored.id,
            project = %stored.project_id,
            kind = ?stored.kind(),
            "event appended"
        );
        // No subscribers is fine; the log is the source of truth.
        let _ = self.live.send(stored.clone());
        Ok(stored.id)
    }

    async fn stream_since(
        &self,
        project: ProjectId,
        cursor: EventId,
    ) -> Result<Vec<AgentEvent>, EventError> {
        let guard = self.inner.lock();
        // Sequence numbers are dense, so the cursor indexes directly.
        let start = usize::try_from(cursor.0).unwrap_or(usize::MAX);
        Ok(guard
            .events
            .iter()
            .skip(start)
            .filter(|e| e.project_id == project)
            .cloned()
            .collect())
    }
}

fn compute_hash(event: &AgentEvent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(event.id.0.to_le_bytes());
    hasher.update(event.project_id.0.to_bytes());
    match event.slice_id {
        Some(slice) => hasher.update(slice.0.to_bytes()),
        None => hasher.update([0u8; 16]),
    }
    // Payload serialization cannot fail: every field is a plain value.
    hasher.update(serde_json::to_vec(&event.payload).unwrap_or_default());
    hasher.update([0]);
    hasher.update(event.content.as_bytes());
    hasher.update([0]);
    hasher.update(event.confidence_delta.unwrap_or(0.0).to_le_bytes());
    hasher.update(event.created_at.timestamp_micros().to_le_bytes());
    hasher.update(event.prev_hash.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventPayload, Signal};
    use vslice_model::SliceId;

    fn sink() -> MemoryEventSink {
        MemoryEventSink::default()
    }

    #[tokio::test]
    async fn append_assigns_dense_sequence() {
        let sink = sink();
        let project = ProjectId::new();
        let a = sink
            .append(NewEvent::project(project, EventPayload::Thought, "a"))
            .await
            .unwrap();
        let b = sink
            .append(NewEvent::project(project, EventPayload::Thought, "b"))
            .await
            .unwrap();
        assert_eq!(a, EventId(1));
        assert_eq!(b, EventId(2));
    }

    #[tokio::test]
    async fn stream_since_filters_project_and_cursor() {
        let sink = sink();
        let p1 = ProjectId::new();
        let p2 = ProjectId::new();
        for i in 0..3 {
            sink.append(NewEvent::project(p1, EventPayload::Thought, format!("p1-{i}")))
                .await
                .unwrap();
            sink.append(NewEvent::project(p2, EventPayload::Thought, format!("p2-{i}")))
                .await
                .unwrap();
        }

        let all = sink.stream_since(p1, EventId::ORIGIN).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let tail = sink.stream_since(p1, all[0].id).await.unwrap();
        let contents: Vec<_> = tail.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["p1-1", "p1-2"]);

        let none = sink.stream_since(p1, EventId(100)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn deltas_update_slice_and_project_scores() {
        let sink = sink();
        let project = ProjectId::new();
        let slice = SliceId::new();

        sink.append(
            NewEvent::slice(
                project,
                slice,
                EventPayload::CodeWrite {
                    path: "src/login.ts".into(),
                    lines: 40,
                },
                "wrote src/login.ts",
            )
            .with_delta(0.25),
        )
        .await
        .unwrap();
        sink.append(
            NewEvent::project(
                project,
                EventPayload::ConfidenceUpdate {
                    reason: "recalc".into(),
                },
                "",
            )
            .with_delta(2.0),
        )
        .await
        .unwrap();

        let confidence = sink.confidence();
        assert_eq!(confidence.score(ScoreKey::Slice(slice)), 0.25);
        assert_eq!(confidence.score(ScoreKey::Project(project)), 1.0);

        let events = sink.events();
        assert_eq!(events[0].score_after, Some(0.25));
        assert_eq!(events[1].score_after, Some(1.0));
    }

    #[tokio::test]
    async fn idempotency_key_deduplicates() {
        let sink = sink();
        let project = ProjectId::new();
        let event = NewEvent::project(project, EventPayload::Thought, "once")
            .with_delta(0.1)
            .with_key("retry-1");

        let first = sink.append(event.clone()).await.unwrap();
        let second = sink.append(event).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.confidence().score(ScoreKey::Project(project)), 0.1);
    }

    #[tokio::test]
    async fn hash_chain_verifies() {
        let sink = sink();
        let project = ProjectId::new();
        for i in 0..5 {
            sink.append(NewEvent::project(
                project,
                EventPayload::signal(Signal::StageStarted),
                format!("e{i}"),
            ))
            .await
            .unwrap();
        }
        assert!(sink.verify_integrity().is_ok());

        sink.inner.lock().events[2].content = "tampered".into();
        assert_eq!(sink.verify_integrity(), Err(EventError::Integrity(3)));
    }

    #[tokio::test]
    async fn subscribers_receive_appends() {
        let sink = sink();
        let mut rx = sink.subscribe();
        let project = ProjectId::new();

        sink.append(NewEvent::project(project, EventPayload::Thought, "live"))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.content, "live");
        assert_eq!(received.kind(), EventKind::Thought);
    }
}
