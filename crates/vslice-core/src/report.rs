//! Event reporting for pipeline components

use std::sync::Arc;
use std::time::Duration;
use vslice_events::{append_with_retry, EventError, EventId, EventSink, NewEvent};

/// Appends events with bounded retries and optional pacing
///
/// Cheap to clone; every clone shares the same sink.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn EventSink>,
    attempts: u32,
    pacing: Duration,
}

impl Reporter {
    /// Reporter over `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, attempts: u32, pacing: Duration) -> Self {
        Self {
            sink,
            attempts: attempts.max(1),
            pacing,
        }
    }

    /// Append one event
    ///
    /// # Errors
    /// The sink's error once retries are exhausted. Callers treat this as
    /// fatal; events are never dropped.
    pub async fn emit(&self, event: NewEvent) -> Result<EventId, EventError> {
        let id = append_with_retry(self.sink.as_ref(), event, self.attempts).await?;
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        Ok(id)
    }

    /// Underlying sink
    #[inline]
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("attempts", &self.attempts)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}
