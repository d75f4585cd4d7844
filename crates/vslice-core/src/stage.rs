//! Analysis stages and the concurrent stage runner
//!
//! Every stage runs as its own task. A stage that fails, panics or times
//! out produces a [`StageOutcome::Failure`] for itself only; its siblings
//! keep running and their results are still checkpointed. Stages already
//! recorded in the checkpoint are not re-run.

use crate::error::{PipelineError, StageError};
use crate::report::Reporter;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use vslice_events::{EventError, EventPayload, NewEvent, Signal};
use vslice_model::ProjectId;
use vslice_store::CheckpointStore;

/// Context handed to a running stage
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Project under analysis
    pub project_id: ProjectId,
    /// Name of the running stage
    pub stage: String,
    reporter: Reporter,
}

impl StageContext {
    /// Create a context
    #[must_use]
    pub fn new(project_id: ProjectId, stage: impl Into<String>, reporter: Reporter) -> Self {
        Self {
            project_id,
            stage: stage.into(),
            reporter,
        }
    }

    /// Report progress, tagged with the stage name
    ///
    /// # Errors
    /// Event append failure after retries.
    pub async fn progress(&self, message: impl Into<String>) -> Result<(), EventError> {
        self.signal(Signal::Progress, message).await
    }

    async fn signal(&self, signal: Signal, content: impl Into<String>) -> Result<(), EventError> {
        self.reporter
            .emit(NewEvent::project(
                self.project_id,
                EventPayload::stage(&self.stage, signal),
                content,
            ))
            .await
            .map(|_| ())
    }
}

/// One unit of analysis work
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    /// Unique stage name; also the checkpoint step name
    fn name(&self) -> &str;

    /// Whether the pipeline fails when this stage fails without a fallback
    fn required(&self) -> bool {
        true
    }

    /// Run the stage
    async fn run(&self, ctx: &StageContext) -> Result<Value, StageError>;

    /// Degraded result used when [`AnalysisStage::run`] fails
    async fn fallback(&self, _ctx: &StageContext) -> Option<Result<Value, StageError>> {
        None
    }
}

/// Settled result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Ran and produced a checkpointed result
    Success(Value),
    /// Failed; the error is isolated to this stage
    Failure(StageError),
    /// Already complete in the checkpoint
    Skipped,
}

impl StageOutcome {
    /// Whether the stage failed
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failure(_))
    }
}

/// Runs analysis stages concurrently with per-stage isolation
#[derive(Clone)]
pub struct StageRunner {
    checkpoints: Arc<dyn CheckpointStore>,
    reporter: Reporter,
    timeout: Option<Duration>,
}

impl StageRunner {
    /// Create a runner
    #[must_use]
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        reporter: Reporter,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            checkpoints,
            reporter,
            timeout,
        }
    }

    /// Run every stage not yet in the checkpoint and wait for all of them
    ///
    /// Successful results are checkpointed by each stage's own task as soon
    /// as it finishes, so a crash mid-run loses only unfinished stages.
    ///
    /// # Errors
    /// - [`PipelineError::Config`] for duplicate stage names
    /// - [`PipelineError::CheckpointCorruption`] if the checkpoint fails to load
    /// - [`PipelineError::EventAppend`] if a stage event cannot be recorded
    #[tracing::instrument(skip(self, stages), fields(stages = stages.len()))]
    pub async fn run_stages(
        &self,
        project: ProjectId,
        stages: &[Arc<dyn AnalysisStage>],
    ) -> Result<BTreeMap<String, StageOutcome>, PipelineError> {
        let mut seen = HashSet::new();
        if let Some(dup) = stages.iter().find(|s| !seen.insert(s.name().to_string())) {
            return Err(PipelineError::Config(format!(
                "duplicate stage name: {}",
                dup.name()
            )));
        }

        let checkpoint = self.checkpoints.load(project).await?;
        let mut outcomes = BTreeMap::new();
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        for stage in stages {
            let name = stage.name().to_string();
            if checkpoint.is_complete(&name) {
                tracing::debug!(stage = %name, "stage already checkpointed");
                self.reporter
                    .emit(NewEvent::project(
                        project,
                        EventPayload::stage(&name, Signal::StageSkipped),
                        format!("{name} already complete"),
                    ))
                    .await?;
                outcomes.insert(name, StageOutcome::Skipped);
                continue;
            }

            let handle = tasks.spawn(run_one(
                stage.clone(),
                StageContext::new(project, name.clone(), self.reporter.clone()),
                self.checkpoints.clone(),
                self.timeout,
            ));
            names.insert(handle.id(), name);
        }

        let mut append_error = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, Ok(outcome))) => {
                    if let Some(name) = names.remove(&id) {
                        outcomes.insert(name, outcome);
                    }
                }
                Ok((id, Err(err))) => {
                    names.remove(&id);
                    append_error.get_or_insert(err);
                }
                Err(join_err) => {
                    let Some(name) = names.remove(&join_err.id()) else {
                        continue;
                    };
                    let reason = if join_err.is_panic() {
                        StageError::Panicked(panic_message(join_err.into_panic()))
                    } else {
                        StageError::Failed("stage task cancelled".to_string())
                    };
                    tracing::error!(stage = %name, error = %reason, "stage task aborted");
                    if append_error.is_none() {
                        if let Err(err) = self
                            .reporter
                            .emit(NewEvent::project(
                                project,
                                EventPayload::stage(&name, Signal::StageFailed),
                                reason.to_string(),
                            ))
                            .await
                        {
                            append_error = Some(err);
                        }
                    }
                    outcomes.insert(name, StageOutcome::Failure(reason));
                }
            }
        }

        match append_error {
            Some(err) => Err(PipelineError::EventAppend(err)),
            None => Ok(outcomes),
        }
    }
}

async fn run_one(
    stage: Arc<dyn AnalysisStage>,
    ctx: StageContext,
    checkpoints: Arc<dyn CheckpointStore>,
    timeout: Option<Duration>,
) -> Result<StageOutcome, EventError> {
    ctx.signal(Signal::StageStarted, format!("{} started", ctx.stage))
        .await?;

    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, stage.run(&ctx))
            .await
            .unwrap_or(Err(StageError::TimedOut {
                secs: limit.as_secs(),
            })),
        None => stage.run(&ctx).await,
    };

    let result = match result {
        Ok(value) => checkpoints
            .mark_stage_complete(ctx.project_id, &ctx.stage, value.clone())
            .await
            .map(|()| value)
            .map_err(|err| StageError::Checkpoint(err.to_string())),
        Err(err) => Err(err),
    };

    match result {
        Ok(value) => {
            tracing::info!(stage = %ctx.stage, "stage succeeded");
            ctx.signal(Signal::StageSucceeded, format!("{} succeeded", ctx.stage))
                .await?;
            Ok(StageOutcome::Success(value))
        }
        Err(err) => {
            tracing::warn!(stage = %ctx.stage, error = %err, "stage failed");
            ctx.signal(Signal::StageFailed, err.to_string()).await?;
            Ok(StageOutcome::Failure(err))
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
