//! Retrying append

use crate::error::EventError;
use crate::event::{EventId, NewEvent};
use crate::sink::EventSink;
use std::time::Duration;
use ulid::Ulid;

const BACKOFF_BASE_MS: u64 = 10;

/// Append with bounded retries on transient failures
///
/// An idempotency key is attached when the event has none, so a retry
/// after an ambiguous failure can never store the event twice.
///
/// # Errors
/// Returns the last error once `attempts` are exhausted, or immediately
/// for non-transient errors. The event is never dropped silently.
pub async fn append_with_retry(
    sink: &dyn EventSink,
    mut event: NewEvent,
    attempts: u32,
) -> Result<EventId, EventError> {
    if event.idempotency_key.is_none() {
        event.idempotency_key = Some(Ulid::new().to_string());
    }

    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match sink.append(event.clone()).await {
            Ok(id) => return Ok(id),
            Err(err) if err.is_transient() && attempt < attempts => {
                tracing::warn!(attempt, error = %err, "event append failed, retrying");
                tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS * u64::from(attempt)))
                    .await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(attempt, error = %err, "event append failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AgentEvent, EventPayload};
    use crate::sink::MemoryEventSink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vslice_model::ProjectId;

    /// Fails the first `failures` appends with `error`
    struct Flaky {
        inner: MemoryEventSink,
        failures: AtomicU32,
        error: EventError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventSink for Flaky {
        async fn append(&self, event: NewEvent) -> Result<EventId, EventError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(self.error.clone());
            }
            self.inner.append(event).await
        }

        async fn stream_since(
            &self,
            project: ProjectId,
            cursor: EventId,
        ) -> Result<Vec<AgentEvent>, EventError> {
            self.inner.stream_since(project, cursor).await
        }
    }

    fn flaky(failures: u32, error: EventError) -> Flaky {
        Flaky {
            inner: MemoryEventSink::default(),
            failures: AtomicU32::new(failures),
            error,
            calls: AtomicU32::new(0),
        }
    }

    fn event() -> NewEvent {
        NewEvent::project(ProjectId::new(), EventPayload::Thought, "x")
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let sink = flaky(2, EventError::Unavailable("busy".into()));
        let id = append_with_retry(&sink, event(), 3).await.unwrap();
        assert_eq!(id, EventId(1));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn surfaces_exhaustion() {
        let sink = flaky(5, EventError::Unavailable("down".into()));
        let err = append_with_retry(&sink, event(), 3).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert!(sink.inner.is_empty());
    }

    #[tokio::test]
    async fn does_not_retry_rejections() {
        let sink = flaky(1, EventError::Rejected("schema".into()));
        let err = append_with_retry(&sink, event(), 3).await.unwrap_err();
        assert_eq!(err, EventError::Rejected("schema".into()));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
