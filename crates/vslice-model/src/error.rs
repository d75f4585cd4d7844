//! Error types for the model

/// Illegal status transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal {entity} transition: {from} -> {to}")]
pub struct TransitionError {
    /// Kind of entity ("project" or "slice")
    pub entity: &'static str,
    /// Status before the attempted move
    pub from: String,
    /// Requested status
    pub to: String,
}

impl TransitionError {
    pub(crate) fn new(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
