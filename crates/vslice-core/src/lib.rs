//! vslice Core - migration pipeline orchestration
//!
//! Turns a legacy project into a set of vertical slices and builds each one
//! with a bounded self-healing loop:
//! - Runs analysis stages concurrently with per-stage failure isolation
//! - Checkpoints every completed step so re-invocation resumes, never repeats
//! - Plans slices and builds them in dependency order
//! - Diagnoses and fixes failing tests up to a retry budget
//! - Reports every step as an event; confidence moves only through events
//!
//! # Example
//!
//! ```rust,ignore
//! use vslice_core::prelude::*;
//!
//! let confidence = Arc::new(ConfidenceAggregator::new(0.85));
//! let sink = Arc::new(MemoryEventSink::new(confidence.clone()));
//! let orchestrator = PipelineOrchestrator::new(PipelineConfig::new(), PipelineDeps {
//!     projects, checkpoints, sink, confidence, stages, planner,
//!     codegen: None, sandbox: None, hook: Arc::new(NoopHook),
//! })?;
//!
//! let result = orchestrator.process(project_id).await?;   // halts at `analyzed`
//! orchestrator.mark_configured(project_id).await?;
//! let result = orchestrator.process(project_id).await?;   // plans and builds
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod build_loop;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod stage;
pub mod strategy;
pub mod test_output;

pub use build_loop::{
    BuildRun, SelfHealingBuildLoop, SliceBuildRequest, SliceReport, TerminalOutcome,
};
pub use collaborators::{
    CodeGenService, CommandOutput, Diagnosis, FileSpec, GeneratedCode, GeneratedTests, NoopHook,
    PlanningService, SandboxExecutor, SliceCompleteHook, Workspace,
};
pub use config::{ConfidenceWeights, ExecutionMode, LoggingConfig, PipelineConfig, SandboxCommands};
pub use error::{BuildLoopError, CollaboratorError, PipelineError, StageError};
pub use orchestrator::{
    PipelineDeps, PipelineOrchestrator, ProcessResult, ANALYSIS_STEP, BUILD_STEP, COMPLETE_STEP,
    PLANNING_STEP,
};
pub use report::Reporter;
pub use stage::{AnalysisStage, StageContext, StageOutcome, StageRunner};
pub use strategy::{
    select_strategy, BuildStrategy, LiveReport, RealExecution, ScriptedFallback, SliceJob,
};
pub use test_output::TestCounts;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring and driving the pipeline
    pub use crate::{
        AnalysisStage, CodeGenService, NoopHook, PipelineConfig, PipelineDeps, PipelineError,
        PipelineOrchestrator, PlanningService, ProcessResult, SandboxExecutor, StageContext,
        StageError,
    };
    pub use std::sync::Arc;
    pub use vslice_events::{ConfidenceAggregator, EventSink, MemoryEventSink};
    pub use vslice_model::{Project, ProjectId, ProjectStatus, Slice, SliceContract, SliceStatus};
    pub use vslice_store::{
        CheckpointStore, MemoryCheckpointStore, MemoryProjectStore, ProjectStore,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
