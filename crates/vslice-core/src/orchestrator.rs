//! Pipeline orchestrator
//!
//! Drives a project through analysis, planning and slice building:
//!
//! ```text
//! pending ─► processing ─► analyzed ──(mark_configured)──► ready ─► building ─► complete
//!                 │             ▲                                        │
//!                 └── failed ◄──┴──────────── retryable: re-invoke ──────┘
//! ```
//!
//! `process` is re-entrant. Each invocation reads the project status and
//! checkpoint, skips completed work and continues from there. The
//! orchestrator is the only writer of project status; every status change
//! is a read-modify-write under a per-project lock so a concurrent
//! `pause` is never overwritten.

use crate::build_loop::{SelfHealingBuildLoop, SliceBuildRequest, TerminalOutcome};
use crate::collaborators::{
    CodeGenService, PlanningService, SandboxExecutor, SliceCompleteHook, Workspace,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::report::Reporter;
use crate::stage::{panic_message, AnalysisStage, StageContext, StageOutcome, StageRunner};
use crate::strategy::select_strategy;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use vslice_events::{
    ConfidenceAggregator, EventError, EventPayload, EventSink, NewEvent, ScoreKey, Signal,
};
use vslice_model::{
    ErrorContext, Project, ProjectId, ProjectStatus, Slice, SliceId, SliceStatus, TransitionError,
};
use vslice_store::{CheckpointStore, ProjectStore, StoreError};

/// Pipeline step name of the analysis phase
pub const ANALYSIS_STEP: &str = "analysis";
/// Pipeline step and checkpoint name of planning
pub const PLANNING_STEP: &str = "planning";
/// Pipeline step name of slice building
pub const BUILD_STEP: &str = "build";
/// Pipeline step name once every slice is complete
pub const COMPLETE_STEP: &str = "complete";

/// Result of one `process` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Whether the invocation ended without a project failure
    pub success: bool,
    /// What happened
    pub message: String,
    /// Project status afterwards
    pub status: ProjectStatus,
}

impl ProcessResult {
    fn ok(status: ProjectStatus, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            status,
        }
    }

    fn failed(status: ProjectStatus, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status,
        }
    }
}

/// Collaborators and stores wired into the orchestrator
pub struct PipelineDeps {
    /// Project and slice storage
    pub projects: Arc<dyn ProjectStore>,
    /// Checkpoint storage
    pub checkpoints: Arc<dyn CheckpointStore>,
    /// Event sink
    pub sink: Arc<dyn EventSink>,
    /// Aggregator updated by `sink`
    pub confidence: Arc<ConfidenceAggregator>,
    /// Analysis stages
    pub stages: Vec<Arc<dyn AnalysisStage>>,
    /// Slice planner
    pub planner: Arc<dyn PlanningService>,
    /// Code generation service, if available
    pub codegen: Option<Arc<dyn CodeGenService>>,
    /// Sandbox, if available
    pub sandbox: Option<Arc<dyn SandboxExecutor>>,
    /// Slice completion hook
    pub hook: Arc<dyn SliceCompleteHook>,
}

enum Flow {
    Continue(Project),
    Halt(ProcessResult),
}

/// Runs the migration pipeline for projects
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    projects: Arc<dyn ProjectStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    reporter: Reporter,
    confidence: Arc<ConfidenceAggregator>,
    stages: Vec<Arc<dyn AnalysisStage>>,
    planner: Arc<dyn PlanningService>,
    runner: StageRunner,
    build_loop: Arc<SelfHealingBuildLoop>,
    running: DashMap<ProjectId, ()>,
    locks: DashMap<ProjectId, Arc<Mutex<()>>>,
}

impl PipelineOrchestrator {
    /// Wire an orchestrator
    ///
    /// The build strategy is selected here, once.
    ///
    /// # Errors
    /// [`PipelineError::Config`] for invalid configuration, a threshold that
    /// differs from the aggregator's, or `real` mode without collaborators.
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Result<Self, PipelineError> {
        config.validate()?;
        if (deps.confidence.threshold() - config.completion_threshold).abs() > f64::EPSILON {
            return Err(PipelineError::Config(format!(
                "aggregator threshold {} differs from completion_threshold {}",
                deps.confidence.threshold(),
                config.completion_threshold
            )));
        }

        let strategy = select_strategy(
            config.execution_mode,
            deps.codegen,
            deps.sandbox,
            &config.commands,
        )?;
        let reporter = Reporter::new(deps.sink, config.append_attempts, config.event_pacing());
        let runner = StageRunner::new(
            deps.checkpoints.clone(),
            reporter.clone(),
            config.stage_timeout(),
        );
        let build_loop = Arc::new(SelfHealingBuildLoop::new(
            &config,
            strategy,
            reporter.clone(),
            deps.confidence.clone(),
            deps.projects.clone(),
            deps.hook,
        ));

        Ok(Self {
            config,
            projects: deps.projects,
            checkpoints: deps.checkpoints,
            reporter,
            confidence: deps.confidence,
            stages: deps.stages,
            planner: deps.planner,
            runner,
            build_loop,
            running: DashMap::new(),
            locks: DashMap::new(),
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Advance a project as far as it can go in one invocation
    ///
    /// A retryable failed project is reopened at the step that failed.
    /// Analysis halts at `analyzed` until [`Self::mark_configured`].
    /// Building halts at the next slice boundary when the project is paused.
    ///
    /// # Errors
    /// Fatal failures only: checkpoint corruption, event append exhaustion
    /// and storage errors. The failure is also recorded on the project when
    /// possible. Stage, planning and slice failures are returned as an
    /// unsuccessful [`ProcessResult`].
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, project_id: ProjectId) -> Result<ProcessResult, PipelineError> {
        let project = self.projects.get(project_id).await?;
        let Some(_running) = self.claim(project_id) else {
            return Ok(ProcessResult::failed(
                project.status,
                "project is already being processed",
            ));
        };

        self.confidence
            .seed(ScoreKey::Project(project_id), project.confidence_score);

        match self.drive(project).await {
            Ok(result) => {
                tracing::info!(
                    status = %result.status,
                    success = result.success,
                    message = %result.message,
                    "process finished"
                );
                Ok(result)
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline failed");
                self.record_fatal(project_id, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(&self, mut project: Project) -> Result<ProcessResult, PipelineError> {
        if project.status == ProjectStatus::Failed {
            let Some(context) = project.error_context.clone() else {
                return Ok(ProcessResult::failed(project.status, "project failed"));
            };
            if !context.retryable {
                return Ok(ProcessResult::failed(
                    project.status,
                    format!("failed at {}: {}", context.step, context.message),
                ));
            }
            project = self.reopen(project).await?;
        }

        match project.status {
            ProjectStatus::Paused => Ok(ProcessResult::ok(project.status, "project is paused")),
            ProjectStatus::Complete => {
                Ok(ProcessResult::ok(project.status, "project already complete"))
            }
            ProjectStatus::Failed => Ok(ProcessResult::failed(project.status, "project failed")),
            ProjectStatus::Pending | ProjectStatus::Processing => self.analyze(project).await,
            ProjectStatus::Analyzed => Ok(ProcessResult::ok(
                project.status,
                "analysis complete; awaiting configuration",
            )),
            ProjectStatus::Ready => match self.plan(project).await? {
                Flow::Continue(project) => self.build_slices(project).await,
                Flow::Halt(result) => Ok(result),
            },
            ProjectStatus::Building => self.build_slices(project).await,
        }
    }

    async fn analyze(&self, project: Project) -> Result<ProcessResult, PipelineError> {
        let id = project.id;
        let project = self
            .update_project(id, |p| {
                advance(p, ProjectStatus::Processing)?;
                p.set_step(ANALYSIS_STEP);
                Ok(())
            })
            .await?;
        if project.status == ProjectStatus::Paused {
            return Ok(ProcessResult::ok(project.status, "project is paused"));
        }

        let outcomes = self.runner.run_stages(id, &self.stages).await?;
        let mut fatal = Vec::new();
        for stage in &self.stages {
            let name = stage.name();
            let Some(StageOutcome::Failure(err)) = outcomes.get(name) else {
                continue;
            };
            let ctx = StageContext::new(id, name, self.reporter.clone());
            match stage.fallback(&ctx).await {
                Some(Ok(value)) => {
                    self.checkpoints.mark_stage_complete(id, name, value).await?;
                    self.emit(NewEvent::project(
                        id,
                        EventPayload::stage(name, Signal::StageFallback),
                        format!("{name} failed ({err}); using degraded result"),
                    ))
                    .await?;
                }
                Some(Err(fallback_err)) if stage.required() => {
                    fatal.push(format!("{name}: {err} (fallback: {fallback_err})"));
                }
                None if stage.required() => fatal.push(format!("{name}: {err}")),
                _ => {
                    tracing::warn!(stage = name, error = %err, "optional stage failed, continuing");
                }
            }
        }

        if !fatal.is_empty() {
            let message = fatal.join("; ");
            return self.fail_project(id, ANALYSIS_STEP, message, true).await;
        }

        let checkpoint = self.checkpoints.load(id).await?;
        let analysis: serde_json::Map<String, Value> = self
            .stages
            .iter()
            .filter_map(|s| {
                checkpoint
                    .result(s.name())
                    .map(|value| (s.name().to_string(), value.clone()))
            })
            .collect();
        let stage_count = analysis.len();

        let project = self
            .update_project(id, move |p| {
                p.analysis = Some(Value::Object(analysis));
                advance(p, ProjectStatus::Analyzed)
            })
            .await?;
        self.emit(NewEvent::project(
            id,
            EventPayload::signal(Signal::AnalysisComplete),
            format!("analysis complete ({stage_count} stages)"),
        ))
        .await?;
        self.emit(NewEvent::project(
            id,
            EventPayload::signal(Signal::Paused),
            "awaiting configuration",
        ))
        .await?;

        Ok(ProcessResult::ok(
            project.status,
            "analysis complete; awaiting configuration",
        ))
    }

    async fn plan(&self, project: Project) -> Result<Flow, PipelineError> {
        let id = project.id;
        let checkpoint = self.checkpoints.load(id).await?;
        let existing = self.projects.slices(id).await?;

        if checkpoint.is_complete(PLANNING_STEP) && !existing.is_empty() {
            tracing::info!(slices = existing.len(), "plan already checkpointed");
        } else {
            let project = self
                .update_project(id, |p| {
                    p.set_step(PLANNING_STEP);
                    Ok(())
                })
                .await?;
            self.emit(NewEvent::project(
                id,
                EventPayload::ToolCall {
                    tool: "plan".into(),
                },
                "planning slices",
            ))
            .await?;

            let stage_results: BTreeMap<String, Value> = checkpoint
                .stage_results()
                .iter()
                .filter(|(step, _)| step.as_str() != PLANNING_STEP)
                .map(|(step, value)| (step.clone(), value.clone()))
                .collect();

            let mut slices = match self.planner.plan(&project, &stage_results).await {
                Ok(slices) => slices,
                Err(err) => {
                    return self
                        .fail_project(id, PLANNING_STEP, format!("planning failed: {err}"), true)
                        .await
                        .map(Flow::Halt)
                }
            };
            for slice in &mut slices {
                slice.project_id = id;
            }
            if let Err(reason) = validate_plan(&slices) {
                return self
                    .fail_project(id, PLANNING_STEP, format!("invalid plan: {reason}"), true)
                    .await
                    .map(Flow::Halt);
            }

            self.projects.save_slices(id, &slices).await?;
            let ids: Vec<String> = slices.iter().map(|s| s.id.to_string()).collect();
            self.checkpoints
                .mark_stage_complete(id, PLANNING_STEP, json!({ "slices": ids }))
                .await?;
            self.emit(NewEvent::project(
                id,
                EventPayload::signal(Signal::PlanReady),
                format!("planned {} slices", slices.len()),
            ))
            .await?;
        }

        let project = self
            .update_project(id, |p| {
                advance(p, ProjectStatus::Building)?;
                p.set_step(BUILD_STEP);
                Ok(())
            })
            .await?;
        if project.status == ProjectStatus::Paused {
            return Ok(Flow::Halt(ProcessResult::ok(project.status, "project is paused")));
        }
        Ok(Flow::Continue(project))
    }

    async fn build_slices(&self, project: Project) -> Result<ProcessResult, PipelineError> {
        let id = project.id;
        let workspace = Workspace::for_project(id);
        let context = project.analysis.clone().unwrap_or(Value::Null);

        loop {
            let project = self.projects.get(id).await?;
            if project.status == ProjectStatus::Paused {
                self.emit(NewEvent::project(
                    id,
                    EventPayload::signal(Signal::Paused),
                    "paused before next slice",
                ))
                .await?;
                return Ok(ProcessResult::ok(project.status, "paused before next slice"));
            }

            let slices = self.projects.slices(id).await?;
            let completed: HashSet<SliceId> = slices
                .iter()
                .filter(|s| s.is_complete())
                .map(|s| s.id)
                .collect();

            if completed.len() == slices.len() {
                let project = self
                    .update_project(id, |p| {
                        p.transition(ProjectStatus::Complete)?;
                        p.set_step(COMPLETE_STEP);
                        Ok(())
                    })
                    .await?;
                let message = format!("all {} slices complete", slices.len());
                self.emit(NewEvent::project(id, EventPayload::Thought, message.clone()))
                    .await?;
                return Ok(ProcessResult::ok(project.status, message));
            }

            let mut ready: Vec<(usize, &Slice)> = slices
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_complete() && s.dependencies_met(&completed))
                .collect();
            if ready.is_empty() {
                return self
                    .fail_project(
                        id,
                        BUILD_STEP,
                        "no buildable slice: remaining slices have unmet dependencies".into(),
                        false,
                    )
                    .await;
            }
            ready.sort_by_key(|(index, s)| (s.priority, *index));

            let previous_files: Vec<String> = slices
                .iter()
                .filter(|s| s.is_complete())
                .flat_map(|s| s.files.iter().cloned())
                .collect();

            let mut tasks = JoinSet::new();
            let mut building = HashMap::new();
            for (_, slice) in ready.into_iter().take(self.config.max_concurrent_slices) {
                let build_loop = self.build_loop.clone();
                let request = SliceBuildRequest {
                    slice: slice.clone(),
                    workspace: workspace.clone(),
                    context: context.clone(),
                    previous_files: previous_files.clone(),
                    completed: completed.clone(),
                };
                let handle = tasks.spawn(async move { build_loop.build(request).await });
                building.insert(handle.id(), slice.clone());
            }

            let mut failures = Vec::new();
            let mut fatal: Option<PipelineError> = None;
            while let Some(joined) = tasks.join_next_with_id().await {
                match joined {
                    Ok((task, Ok(report))) => {
                        building.remove(&task);
                        if let TerminalOutcome::Failed { reason } = &report.outcome {
                            failures.push(format!("{}: {reason}", report.slice.name));
                        }
                    }
                    Ok((task, Err(err))) => {
                        building.remove(&task);
                        tracing::error!(error = %err, "slice build aborted");
                        fatal.get_or_insert(err.into());
                    }
                    Err(join_err) => {
                        let Some(slice) = building.remove(&join_err.id()) else {
                            continue;
                        };
                        let reason = if join_err.is_panic() {
                            format!("build task panicked: {}", panic_message(join_err.into_panic()))
                        } else {
                            "build task cancelled".to_string()
                        };
                        self.record_crashed_slice(slice.id, id, &reason).await?;
                        failures.push(format!("{}: {reason}", slice.name));
                    }
                }
            }
            if let Some(err) = fatal {
                return Err(err);
            }

            self.refresh_confidence(id).await?;
            if !failures.is_empty() {
                return self
                    .fail_project(id, BUILD_STEP, failures.join("; "), true)
                    .await;
            }
        }
    }

    async fn record_crashed_slice(
        &self,
        slice_id: SliceId,
        project_id: ProjectId,
        reason: &str,
    ) -> Result<(), PipelineError> {
        tracing::error!(slice = %slice_id, %reason, "slice build crashed");
        let mut slice = self
            .projects
            .slices(project_id)
            .await?
            .into_iter()
            .find(|s| s.id == slice_id)
            .ok_or(StoreError::SliceNotFound(slice_id))?;
        // A crashed task may leave any in-flight status behind.
        slice.status = SliceStatus::Failed;
        slice.failure_reason = Some(reason.to_string());
        self.projects.update_slice(&slice).await?;
        self.emit(NewEvent::slice(
            project_id,
            slice_id,
            EventPayload::signal(Signal::SliceFailed),
            reason,
        ))
        .await?;
        Ok(())
    }

    /// Project confidence is the mean of its slice scores
    #[allow(clippy::cast_precision_loss)]
    async fn refresh_confidence(&self, id: ProjectId) -> Result<(), PipelineError> {
        let slices = self.projects.slices(id).await?;
        if slices.is_empty() {
            return Ok(());
        }
        let mean = slices.iter().map(|s| s.confidence_score).sum::<f64>() / slices.len() as f64;
        let key = ScoreKey::Project(id);
        let delta = self.confidence.delta_to(key, mean);
        if delta.abs() > f64::EPSILON {
            self.emit(
                NewEvent::project(
                    id,
                    EventPayload::ConfidenceUpdate {
                        reason: "slice scores changed".into(),
                    },
                    format!("project confidence {mean:.2}"),
                )
                .with_delta(delta),
            )
            .await?;
        }
        let score = self.confidence.score(key);
        self.update_project(id, move |p| {
            p.confidence_score = score;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Reopen a retryable failed project at the step that failed
    async fn reopen(&self, project: Project) -> Result<Project, PipelineError> {
        let step = project
            .error_context
            .as_ref()
            .map(|c| c.step.clone())
            .unwrap_or_default();
        let target = match step.as_str() {
            ANALYSIS_STEP => ProjectStatus::Processing,
            PLANNING_STEP => ProjectStatus::Ready,
            _ => ProjectStatus::Building,
        };
        tracing::info!(%step, %target, "reopening failed project");

        if target == ProjectStatus::Building {
            for mut slice in self.projects.slices(project.id).await? {
                if slice.status == SliceStatus::Failed {
                    slice.reset_for_retry()?;
                    self.projects.update_slice(&slice).await?;
                }
            }
        }
        self.update_project(project.id, move |p| {
            p.clear_error();
            p.transition(target)
        })
        .await
    }

    async fn fail_project(
        &self,
        id: ProjectId,
        step: &str,
        message: String,
        retryable: bool,
    ) -> Result<ProcessResult, PipelineError> {
        tracing::warn!(step, %message, retryable, "project failed");
        let context = ErrorContext::new(step, message.clone(), retryable);
        let project = self.update_project(id, move |p| p.fail(context)).await?;
        self.emit(NewEvent::project(
            id,
            EventPayload::Thought,
            format!("{step} failed: {message}"),
        ))
        .await?;
        Ok(ProcessResult::failed(project.status, message))
    }

    async fn record_fatal(&self, id: ProjectId, err: &PipelineError) {
        let message = err.to_string();
        let retryable = err.is_retryable();
        let recorded = self
            .update_project(id, move |p| {
                let step = p.pipeline_step.clone().unwrap_or_else(|| "unknown".into());
                p.fail(ErrorContext::new(step, message, retryable))
            })
            .await;
        if let Err(record_err) = recorded {
            tracing::warn!(error = %record_err, "could not record pipeline failure");
        }
    }

    /// Pause a project; building stops at the next slice boundary
    ///
    /// # Errors
    /// [`PipelineError::Transition`] for complete projects.
    pub async fn pause(&self, id: ProjectId) -> Result<Project, PipelineError> {
        let project = self.update_project(id, Project::pause).await?;
        self.emit(NewEvent::project(
            id,
            EventPayload::signal(Signal::Paused),
            "paused",
        ))
        .await?;
        Ok(project)
    }

    /// Resume a paused project to the status it was paused from
    ///
    /// # Errors
    /// [`PipelineError::Transition`] if the project is not paused.
    pub async fn resume(&self, id: ProjectId) -> Result<Project, PipelineError> {
        self.update_project(id, Project::resume).await
    }

    /// Signal that external configuration is done; `analyzed` → `ready`
    ///
    /// # Errors
    /// [`PipelineError::InvalidState`] unless the project is `analyzed`.
    pub async fn mark_configured(&self, id: ProjectId) -> Result<Project, PipelineError> {
        let project = self.projects.get(id).await?;
        if project.status != ProjectStatus::Analyzed {
            return Err(PipelineError::InvalidState(format!(
                "project is {}, not analyzed",
                project.status
            )));
        }
        self.update_project(id, |p| p.transition(ProjectStatus::Ready))
            .await
    }

    /// Reset a failed slice to `pending` and reopen its project for building
    ///
    /// # Errors
    /// [`PipelineError::Transition`] unless the slice is `failed`.
    pub async fn retry_slice(
        &self,
        project_id: ProjectId,
        slice_id: SliceId,
    ) -> Result<Slice, PipelineError> {
        let mut slice = self
            .projects
            .slices(project_id)
            .await?
            .into_iter()
            .find(|s| s.id == slice_id)
            .ok_or(StoreError::SliceNotFound(slice_id))?;
        slice.reset_for_retry()?;
        self.projects.update_slice(&slice).await?;

        self.update_project(project_id, |p| {
            if p.status == ProjectStatus::Failed {
                p.clear_error();
                p.transition(ProjectStatus::Building)?;
                p.set_step(BUILD_STEP);
            }
            Ok(())
        })
        .await?;
        Ok(slice)
    }

    async fn emit(&self, event: NewEvent) -> Result<(), EventError> {
        self.reporter.emit(event).await.map(|_| ())
    }

    async fn update_project<F>(&self, id: ProjectId, apply: F) -> Result<Project, PipelineError>
    where
        F: FnOnce(&mut Project) -> Result<(), TransitionError> + Send,
    {
        let lock = self.locks.entry(id).or_default().clone();
        let _guard = lock.lock().await;
        let mut project = self.projects.get(id).await?;
        apply(&mut project)?;
        self.projects.save(&project).await?;
        Ok(project)
    }

    fn claim(&self, id: ProjectId) -> Option<Running<'_>> {
        match self.running.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Running {
                    running: &self.running,
                    id,
                })
            }
        }
    }
}

struct Running<'a> {
    running: &'a DashMap<ProjectId, ()>,
    id: ProjectId,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.id);
    }
}

/// Transition, or retarget the resume point of a paused project
fn advance(project: &mut Project, to: ProjectStatus) -> Result<(), TransitionError> {
    if project.status == ProjectStatus::Paused {
        if ProjectStatus::Paused.validate_transition(to).is_ok() {
            project.paused_from = Some(to);
        }
        return Ok(());
    }
    project.transition(to)
}

/// Dependencies must stay inside the plan and form no cycle
fn validate_plan(slices: &[Slice]) -> Result<(), String> {
    let mut graph: DiGraphMap<SliceId, ()> = DiGraphMap::new();
    for slice in slices {
        if graph.contains_node(slice.id) {
            return Err("duplicate slice id".into());
        }
        graph.add_node(slice.id);
    }
    for slice in slices {
        for dep in &slice.dependencies {
            if !graph.contains_node(*dep) {
                return Err(format!("{} depends on unknown slice {dep}", slice.name));
            }
            graph.add_edge(*dep, slice.id, ());
        }
    }
    toposort(&graph, None)
        .map(|_| ())
        .map_err(|_| "dependency cycle".to_string())
}
