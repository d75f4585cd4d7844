//! Error types for the event log

/// Event log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Backend temporarily unable to accept the event
    #[error("event sink unavailable: {0}")]
    Unavailable(String),

    /// Event refused; retrying will not help
    #[error("event rejected: {0}")]
    Rejected(String),

    /// Stored chain does not verify
    #[error("event log integrity violation at event {0}")]
    Integrity(u64),

    /// Sink shut down
    #[error("event sink closed")]
    Closed,
}

impl EventError {
    /// Whether a retry with the same idempotency key may succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(EventError::Unavailable("busy".into()).is_transient());
        assert!(!EventError::Rejected("bad".into()).is_transient());
        assert!(!EventError::Closed.is_transient());
        assert!(!EventError::Integrity(3).is_transient());
    }
}
