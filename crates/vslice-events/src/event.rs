//! Event types
//!
//! Payloads are a closed tagged union. Kinds written by a newer producer
//! deserialize as [`EventPayload::Unknown`] so older consumers can skip them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vslice_model::{ProjectId, SliceId};

/// Position of an event in the log
///
/// Sequence numbers start at 1; [`EventId::ORIGIN`] is the cursor that
/// streams from the beginning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl EventId {
    /// Cursor placed before the first event
    pub const ORIGIN: EventId = EventId(0);

    /// The following sequence number
    #[inline]
    #[must_use]
    pub fn next(self) -> EventId {
        EventId(self.0 + 1)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Agent reasoning
    Thought,
    /// Collaborator invocation
    ToolCall,
    /// File written
    CodeWrite,
    /// Test suite started
    TestRun,
    /// Test suite finished
    TestResult,
    /// Diagnosis and fix
    SelfHeal,
    /// Explicit score adjustment
    ConfidenceUpdate,
    /// Anything else worth recording
    Observation,
    /// Kind not known to this build
    Unknown,
}

/// What an [`Observation`](EventPayload::Observation) reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Analysis stage launched
    StageStarted,
    /// Progress note from a running stage
    Progress,
    /// Analysis stage produced a result
    StageSucceeded,
    /// Analysis stage failed
    StageFailed,
    /// Degraded fallback replaced a failed stage
    StageFallback,
    /// Stage already complete in the checkpoint
    StageSkipped,
    /// All analysis stages settled
    AnalysisComplete,
    /// Planning produced slices
    PlanReady,
    /// Compile check passed
    BuildPassed,
    /// Compile check failed
    BuildFailed,
    /// Live verification passed
    LivePassed,
    /// Live verification failed (non-fatal)
    LiveFailed,
    /// Slice reached `complete`
    SliceCompleted,
    /// Slice exhausted its retries
    SliceFailed,
    /// Pipeline stopped at a pause point
    Paused,
    /// Signal not known to this build
    #[serde(other)]
    Other,
}

/// Typed event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Agent reasoning; the text is the event content
    Thought,
    /// Call into an external collaborator
    ToolCall {
        /// Collaborator operation name
        tool: String,
    },
    /// File written to the workspace
    CodeWrite {
        /// Workspace-relative path
        path: String,
        /// Line count of the written content
        lines: usize,
    },
    /// Test suite started
    TestRun {
        /// 1-based test attempt within the build
        attempt: u32,
        /// Command executed
        command: String,
    },
    /// Test suite finished
    TestResult {
        /// Whether the suite passed as a whole
        passed: bool,
        /// Passing tests
        passed_count: u32,
        /// Failing tests
        failed_count: u32,
        /// 1-based test attempt within the build
        attempt: u32,
    },
    /// Diagnosis produced during a heal cycle
    SelfHeal {
        /// 1-based heal attempt
        attempt: u32,
        /// Diagnosis text
        diagnosis: String,
        /// Summary of the applied fix
        fix_description: String,
        /// Number of fix files
        files: usize,
    },
    /// Explicit score adjustment
    ConfidenceUpdate {
        /// Why the score moved
        reason: String,
    },
    /// Pipeline observation
    Observation {
        /// Analysis stage the observation belongs to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        /// What was observed
        signal: Signal,
    },
    /// Payload kind not known to this build
    #[serde(other)]
    Unknown,
}

impl EventPayload {
    /// Discriminant of this payload
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Thought => EventKind::Thought,
            EventPayload::ToolCall { .. } => EventKind::ToolCall,
            EventPayload::CodeWrite { .. } => EventKind::CodeWrite,
            EventPayload::TestRun { .. } => EventKind::TestRun,
            EventPayload::TestResult { .. } => EventKind::TestResult,
            EventPayload::SelfHeal { .. } => EventKind::SelfHeal,
            EventPayload::ConfidenceUpdate { .. } => EventKind::ConfidenceUpdate,
            EventPayload::Observation { .. } => EventKind::Observation,
            EventPayload::Unknown => EventKind::Unknown,
        }
    }

    /// Observation tagged with a stage name
    #[must_use]
    pub fn stage(stage: impl Into<String>, signal: Signal) -> Self {
        EventPayload::Observation {
            stage: Some(stage.into()),
            signal,
        }
    }

    /// Observation without a stage
    #[must_use]
    pub fn signal(signal: Signal) -> Self {
        EventPayload::Observation {
            stage: None,
            signal,
        }
    }
}

/// Event as submitted to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Owning project
    pub project_id: ProjectId,
    /// Owning slice; `None` for project-level events
    pub slice_id: Option<SliceId>,
    /// Typed payload
    pub payload: EventPayload,
    /// Human-readable text
    pub content: String,
    /// Signed score change
    pub confidence_delta: Option<f64>,
    /// Deduplication key for retried appends
    pub idempotency_key: Option<String>,
}

impl NewEvent {
    /// Project-level event
    #[must_use]
    pub fn project(
        project_id: ProjectId,
        payload: EventPayload,
        content: impl Into<String>,
    ) -> Self {
        Self {
            project_id,
            slice_id: None,
            payload,
            content: content.into(),
            confidence_delta: None,
            idempotency_key: None,
        }
    }

    /// Slice-level event
    #[must_use]
    pub fn slice(
        project_id: ProjectId,
        slice_id: SliceId,
        payload: EventPayload,
        content: impl Into<String>,
    ) -> Self {
        Self {
            slice_id: Some(slice_id),
            ..Self::project(project_id, payload, content)
        }
    }

    /// With confidence delta
    #[inline]
    #[must_use]
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.confidence_delta = Some(delta);
        self
    }

    /// With idempotency key
    #[inline]
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Whether appending this event moves a confidence score
    #[inline]
    #[must_use]
    pub fn affects_confidence(&self) -> bool {
        self.confidence_delta.is_some() || self.payload.kind() == EventKind::ConfidenceUpdate
    }
}

/// Stored, immutable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Sequence number
    pub id: EventId,
    /// Owning project
    pub project_id: ProjectId,
    /// Owning slice; `None` for project-level events
    pub slice_id: Option<SliceId>,
    /// Typed payload
    #[serde(rename = "metadata")]
    pub payload: EventPayload,
    /// Human-readable text
    pub content: String,
    /// Signed score change
    pub confidence_delta: Option<f64>,
    /// Score of the affected entity after this event, when it moved one
    pub score_after: Option<f64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Chain hash of the preceding event (hex)
    pub prev_hash: String,
    /// Chain hash of this event (hex)
    pub hash: String,
}

impl AgentEvent {
    /// Event kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_tags_are_snake_case() {
        let payload = EventPayload::TestResult {
            passed: true,
            passed_count: 8,
            failed_count: 0,
            attempt: 2,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "test_result");
        assert_eq!(json["passed_count"], 8);
    }

    #[test]
    fn unknown_payload_kind_is_tolerated() {
        let payload: EventPayload =
            serde_json::from_str(r#"{"type":"browser_screenshot","url":"x"}"#).unwrap();
        assert_eq!(payload, EventPayload::Unknown);
        assert_eq!(payload.kind(), EventKind::Unknown);
    }

    #[test]
    fn unknown_signal_is_tolerated() {
        let payload: EventPayload =
            serde_json::from_str(r#"{"type":"observation","signal":"quantum_flux"}"#).unwrap();
        assert_eq!(payload, EventPayload::signal(Signal::Other));
    }

    #[test]
    fn new_event_builders() {
        let project = ProjectId::new();
        let slice = SliceId::new();
        let event =
            NewEvent::slice(project, slice, EventPayload::Thought, "planning the login form")
                .with_delta(0.1)
            .with_key("k1");

        assert_eq!(event.slice_id, Some(slice));
        assert_eq!(event.idempotency_key.as_deref(), Some("k1"));
        assert!(event.affects_confidence());

        let plain = NewEvent::project(project, EventPayload::Thought, "hello");
        assert!(!plain.affects_confidence());
        let update = NewEvent::project(
            project,
            EventPayload::ConfidenceUpdate { reason: "recalc".into() },
            "",
        );
        assert!(update.affects_confidence());
    }

    #[test]
    fn event_id_cursor() {
        assert_eq!(EventId::ORIGIN.next(), EventId(1));
        assert!(EventId(3) > EventId::ORIGIN);
    }
}
