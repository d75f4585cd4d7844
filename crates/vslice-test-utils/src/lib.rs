//! Testing utilities for the vslice workspace
//!
//! Scripted collaborators, fixtures and an in-memory harness.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use vslice_core::{
    AnalysisStage, CodeGenService, CollaboratorError, CommandOutput, Diagnosis, FileSpec,
    GeneratedCode, GeneratedTests, NoopHook, PipelineConfig, PipelineDeps, PipelineError,
    PipelineOrchestrator, PlanningService, SandboxExecutor, SliceCompleteHook, StageContext,
    StageError, Workspace,
};
use vslice_events::{ConfidenceAggregator, EventKind, MemoryEventSink};
use vslice_model::{Project, ProjectId, Slice, SliceContract, SliceId};
use vslice_store::{MemoryCheckpointStore, MemoryProjectStore, ProjectStore};

static TRACING: Once = Once::new();

/// Route `tracing` output through the test writer (once per process)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Jest-style test output
pub fn jest_output(passed: u32, failed: u32) -> CommandOutput {
    let stdout = if failed == 0 {
        format!("Tests:       {passed} passed, {passed} total")
    } else {
        format!(
            "Tests:       {failed} failed, {passed} passed, {} total",
            passed + failed
        )
    };
    CommandOutput {
        exit_code: i32::from(failed > 0),
        stdout,
        stderr: String::new(),
    }
}

/// Slice with a contract requiring `tests` tests
pub fn slice_fixture(project: ProjectId, name: &str, tests: u32) -> Slice {
    Slice::new(
        project,
        name,
        SliceContract::new(format!("{name} feature"))
            .with_criteria(vec![format!("{name} works end to end")])
            .with_required_tests(tests),
    )
}

// ---------------------------------------------------------------------------
// Analysis stages

/// Analysis stage with scripted latency and result
pub struct FnStage {
    name: String,
    delay: Duration,
    result: Result<Value, StageError>,
    fallback: Option<Value>,
    required: bool,
    calls: Arc<AtomicUsize>,
}

impl FnStage {
    pub fn ok(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            result: Ok(value),
            fallback: None,
            required: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            result: Err(StageError::Failed(message.to_string())),
            ..Self::ok(name, Value::Null)
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback = Some(value);
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Shared invocation counter
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl AnalysisStage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn run(&self, ctx: &StageContext) -> Result<Value, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ctx.progress(format!("{} running", self.name))
            .await
            .map_err(|e| StageError::Failed(e.to_string()))?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }

    async fn fallback(&self, _ctx: &StageContext) -> Option<Result<Value, StageError>> {
        self.fallback.clone().map(Ok)
    }
}

// ---------------------------------------------------------------------------
// Planning

/// Planner returning a fixed plan
pub struct StaticPlanner {
    plan: Mutex<Option<Vec<Slice>>>,
    calls: AtomicUsize,
}

impl StaticPlanner {
    pub fn new(slices: Vec<Slice>) -> Self {
        Self {
            plan: Mutex::new(Some(slices)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Planner that always fails
    pub fn failing() -> Self {
        Self {
            plan: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanningService for StaticPlanner {
    async fn plan(
        &self,
        _project: &Project,
        _stage_results: &BTreeMap<String, Value>,
    ) -> Result<Vec<Slice>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.plan
            .lock()
            .clone()
            .ok_or_else(|| CollaboratorError::Unavailable("planner offline".into()))
    }
}

// ---------------------------------------------------------------------------
// Code generation

/// Code generator with canned output
#[derive(Default)]
pub struct ScriptedCodeGen {
    diagnoses: Mutex<VecDeque<Diagnosis>>,
    fail_generation: bool,
    pub generate_calls: AtomicUsize,
    pub diagnose_calls: AtomicUsize,
}

impl ScriptedCodeGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code generation always errors
    pub fn unavailable() -> Self {
        Self {
            fail_generation: true,
            ..Self::default()
        }
    }

    /// Queue a diagnosis; once drained, a generic one is returned
    #[must_use]
    pub fn with_diagnosis(self, diagnosis: Diagnosis) -> Self {
        self.diagnoses.lock().push_back(diagnosis);
        self
    }
}

fn module_dir(contract: &SliceContract) -> String {
    let slug: String = contract
        .summary
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("src/{slug}")
}

#[async_trait]
impl CodeGenService for ScriptedCodeGen {
    async fn generate_code(
        &self,
        contract: &SliceContract,
        _context: &Value,
        _previous_files: &[String],
    ) -> Result<GeneratedCode, CollaboratorError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation {
            return Err(CollaboratorError::Unavailable("model overloaded".into()));
        }
        let dir = module_dir(contract);
        Ok(GeneratedCode {
            files: vec![
                FileSpec::new(
                    format!("{dir}/service.ts"),
                    "export function handle() {\n  return true;\n}\n",
                ),
                FileSpec::new(format!("{dir}/routes.ts"), "import { handle } from './service';\n"),
            ],
            reasoning: vec![format!("split {} into service and routes", contract.summary)],
        })
    }

    async fn generate_tests(
        &self,
        contract: &SliceContract,
        _files: &[FileSpec],
        _context: &Value,
    ) -> Result<GeneratedTests, CollaboratorError> {
        Ok(GeneratedTests {
            files: vec![FileSpec::new(
                format!("{}/service.test.ts", module_dir(contract)),
                "test('handle', () => expect(handle()).toBe(true));\n",
            )],
        })
    }

    async fn diagnose(
        &self,
        error_output: &str,
        _current_files: &[FileSpec],
        slice_name: &str,
    ) -> Result<Diagnosis, CollaboratorError> {
        self.diagnose_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.diagnoses.lock().pop_front().unwrap_or_else(|| Diagnosis {
            diagnosis: format!("{slice_name}: {}", error_output.lines().next().unwrap_or("")),
            fix_description: "patch service".into(),
            files: vec![FileSpec::new("src/fix.ts", "export const fixed = true;\n")],
        }))
    }
}

// ---------------------------------------------------------------------------
// Sandbox

/// Sandbox with scripted command results
///
/// Test commands pop from a queue; the last result repeats once the queue
/// has a single entry left.
pub struct ScriptedSandbox {
    test_results: Mutex<VecDeque<CommandOutput>>,
    build_result: CommandOutput,
    written: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
    test_command: String,
}

impl ScriptedSandbox {
    /// Every test run returns the next entry of `test_results`
    pub fn new(test_results: Vec<CommandOutput>) -> Self {
        Self {
            test_results: Mutex::new(test_results.into()),
            build_result: CommandOutput::ok("compiled"),
            written: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            test_command: vslice_core::SandboxCommands::default().test,
        }
    }

    /// Tests always pass with `count` tests
    pub fn passing(count: u32) -> Self {
        Self::new(vec![jest_output(count, 0)])
    }

    #[must_use]
    pub fn with_build_result(mut self, output: CommandOutput) -> Self {
        self.build_result = output;
        self
    }

    pub fn written(&self) -> Vec<String> {
        self.written.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn test_runs(&self) -> usize {
        self.commands
            .lock()
            .iter()
            .filter(|c| **c == self.test_command)
            .count()
    }
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn write_files(
        &self,
        _workspace: &Workspace,
        files: &[FileSpec],
    ) -> Result<(), CollaboratorError> {
        self.written
            .lock()
            .extend(files.iter().map(|f| f.path.clone()));
        Ok(())
    }

    async fn run_command(
        &self,
        _workspace: &Workspace,
        command: &str,
    ) -> Result<CommandOutput, CollaboratorError> {
        self.commands.lock().push(command.to_string());
        if command != self.test_command {
            return Ok(self.build_result.clone());
        }
        let mut queue = self.test_results.lock();
        let output = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        output.ok_or_else(|| CollaboratorError::Failed("no scripted test result".into()))
    }

    async fn read_file(
        &self,
        _workspace: &Workspace,
        path: &str,
    ) -> Result<String, CollaboratorError> {
        if self.written.lock().iter().any(|p| p == path) {
            Ok(String::new())
        } else {
            Err(CollaboratorError::Failed(format!("{path} not found")))
        }
    }

    async fn preview_url(
        &self,
        workspace: &Workspace,
        port: u16,
    ) -> Result<String, CollaboratorError> {
        Ok(format!("https://{workspace}-{port}.preview.local"))
    }
}

// ---------------------------------------------------------------------------
// Hooks

/// Records completed slice names
#[derive(Default)]
pub struct RecordingHook {
    completed: Mutex<Vec<String>>,
}

impl RecordingHook {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl SliceCompleteHook for RecordingHook {
    async fn slice_completed(&self, slice: &Slice) -> Result<(), CollaboratorError> {
        self.completed.lock().push(slice.name.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness

/// In-memory stores and sink shared by one test
pub struct Harness {
    pub config: PipelineConfig,
    pub projects: Arc<MemoryProjectStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
    pub confidence: Arc<ConfidenceAggregator>,
    pub sink: Arc<MemoryEventSink>,
}

impl Harness {
    pub fn new(config: PipelineConfig) -> Self {
        init_tracing();
        let confidence = Arc::new(ConfidenceAggregator::new(config.completion_threshold));
        Self {
            sink: Arc::new(MemoryEventSink::new(confidence.clone())),
            config,
            projects: Arc::new(MemoryProjectStore::new()),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            confidence,
        }
    }

    /// Store a new pending project
    pub async fn project(&self, name: &str) -> ProjectId {
        let project = Project::new(name);
        let id = project.id;
        self.projects
            .create(project)
            .await
            .unwrap_or_else(|e| panic!("create project: {e}"));
        id
    }

    /// Wire an orchestrator over this harness
    pub fn orchestrator(
        &self,
        stages: Vec<Arc<dyn AnalysisStage>>,
        planner: Arc<dyn PlanningService>,
        codegen: Option<Arc<dyn CodeGenService>>,
        sandbox: Option<Arc<dyn SandboxExecutor>>,
    ) -> Result<PipelineOrchestrator, PipelineError> {
        self.orchestrator_with_hook(stages, planner, codegen, sandbox, Arc::new(NoopHook))
    }

    pub fn orchestrator_with_hook(
        &self,
        stages: Vec<Arc<dyn AnalysisStage>>,
        planner: Arc<dyn PlanningService>,
        codegen: Option<Arc<dyn CodeGenService>>,
        sandbox: Option<Arc<dyn SandboxExecutor>>,
        hook: Arc<dyn SliceCompleteHook>,
    ) -> Result<PipelineOrchestrator, PipelineError> {
        PipelineOrchestrator::new(
            self.config.clone(),
            PipelineDeps {
                projects: self.projects.clone(),
                checkpoints: self.checkpoints.clone(),
                sink: self.sink.clone(),
                confidence: self.confidence.clone(),
                stages,
                planner,
                codegen,
                sandbox,
                hook,
            },
        )
    }

    /// Event kinds recorded for one slice, in order
    pub fn slice_kinds(&self, slice: SliceId) -> Vec<EventKind> {
        self.sink
            .events()
            .iter()
            .filter(|e| e.slice_id == Some(slice))
            .map(|e| e.kind())
            .collect()
    }
}
