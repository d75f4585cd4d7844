//! Self-healing slice build loop
//!
//! Drives one slice from `pending` to a terminal outcome:
//!
//! ```text
//! generate code → write files → build check → generate tests → run tests
//!                                                   │
//!                         ┌── failing ──────────────┘
//!                         ▼
//!          diagnose → apply fix → rebuild → re-test   (at most max_retries times)
//!                         │
//!               passing ──┴──► live verification (optional) → complete
//!               still failing after max_retries ──────────────► failed
//! ```
//!
//! Every step reports through the event sink. Confidence moves only through
//! event deltas. Collaborator failures feed the healing loop and never
//! escape; only store and event failures abort a build.

use crate::collaborators::{Diagnosis, FileSpec, SliceCompleteHook, Workspace};
use crate::config::{ConfidenceWeights, PipelineConfig};
use crate::error::BuildLoopError;
use crate::report::Reporter;
use crate::strategy::{BuildStrategy, SliceJob};
use crate::test_output::TestCounts;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use vslice_events::{ConfidenceAggregator, EventPayload, NewEvent, ScoreKey, Signal};
use vslice_model::{Slice, SliceId, SliceStatus};
use vslice_store::ProjectStore;

/// Everything one build needs
#[derive(Debug, Clone)]
pub struct SliceBuildRequest {
    /// Slice to build
    pub slice: Slice,
    /// Sandbox workspace of the project
    pub workspace: Workspace,
    /// Project analysis
    pub context: Value,
    /// Files written by earlier slices
    pub previous_files: Vec<String>,
    /// Slices already complete
    pub completed: HashSet<SliceId>,
}

/// Terminal result of a build
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// Tests passed; confidence is at or above the completion threshold
    Completed {
        /// Final slice confidence
        confidence: f64,
    },
    /// Retries exhausted or an unrecoverable collaborator failure
    Failed {
        /// Why the slice failed
        reason: String,
    },
}

impl TerminalOutcome {
    /// Whether the slice completed
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalOutcome::Completed { .. })
    }
}

/// Statistics of one build invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRun {
    /// Files written, fixes included
    pub files_written: usize,
    /// Lines written, fixes included
    pub lines_written: usize,
    /// Test suite runs
    pub test_attempts: u32,
    /// Heal cycles
    pub heal_attempts: u32,
    /// Counts from the latest test run
    pub last_counts: TestCounts,
    /// Whether a build check has passed
    pub build_passed: bool,
}

/// Result of [`SelfHealingBuildLoop::build`]
#[derive(Debug, Clone)]
pub struct SliceReport {
    /// Slice as persisted after the build
    pub slice: Slice,
    /// Terminal outcome
    pub outcome: TerminalOutcome,
    /// Per-invocation statistics
    pub run: BuildRun,
}

/// Builds slices with bounded self-healing
pub struct SelfHealingBuildLoop {
    strategy: Arc<dyn BuildStrategy>,
    reporter: Reporter,
    confidence: Arc<ConfidenceAggregator>,
    projects: Arc<dyn ProjectStore>,
    hook: Arc<dyn SliceCompleteHook>,
    max_retries: u32,
    weights: ConfidenceWeights,
    live_verification: bool,
    active: DashMap<SliceId, ()>,
}

impl SelfHealingBuildLoop {
    /// Create a build loop
    ///
    /// `confidence` must be the aggregator the reporter's sink updates.
    #[must_use]
    pub fn new(
        config: &PipelineConfig,
        strategy: Arc<dyn BuildStrategy>,
        reporter: Reporter,
        confidence: Arc<ConfidenceAggregator>,
        projects: Arc<dyn ProjectStore>,
        hook: Arc<dyn SliceCompleteHook>,
    ) -> Self {
        Self {
            strategy,
            reporter,
            confidence,
            projects,
            hook,
            max_retries: config.max_retries,
            weights: config.weights,
            live_verification: config.live_verification,
            active: DashMap::new(),
        }
    }

    /// Name of the selected strategy
    #[inline]
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Build one slice to a terminal outcome
    ///
    /// A slice that is already complete is returned unchanged without any
    /// events. A failed slice is reset and rebuilt. A slice left mid-build
    /// by an interrupted run restarts from `pending`.
    ///
    /// # Errors
    /// - [`BuildLoopError::DependenciesUnmet`] before any side effect
    /// - [`BuildLoopError::AlreadyBuilding`] if this slice is being built
    /// - [`BuildLoopError::Event`] / [`BuildLoopError::Store`] when progress
    ///   cannot be recorded
    #[tracing::instrument(skip_all, fields(slice = %request.slice.name, id = %request.slice.id))]
    pub async fn build(&self, request: SliceBuildRequest) -> Result<SliceReport, BuildLoopError> {
        let SliceBuildRequest {
            mut slice,
            workspace,
            context,
            previous_files,
            completed,
        } = request;

        if slice.is_complete() {
            tracing::debug!("slice already complete");
            return Ok(SliceReport {
                outcome: TerminalOutcome::Completed {
                    confidence: slice.confidence_score,
                },
                slice,
                run: BuildRun::default(),
            });
        }

        let missing = slice.unmet_dependencies(&completed);
        if !missing.is_empty() {
            return Err(BuildLoopError::DependenciesUnmet {
                slice: slice.name,
                missing,
            });
        }

        let _active = self.acquire(slice.id)?;

        match slice.status {
            SliceStatus::Pending => {}
            SliceStatus::Failed => slice.reset_for_retry()?,
            interrupted => {
                tracing::warn!(status = %interrupted, "restarting interrupted build");
                slice.status = SliceStatus::Pending;
            }
        }
        slice.retry_count = 0;
        self.confidence
            .seed(ScoreKey::Slice(slice.id), slice.confidence_score);

        SliceBuild {
            owner: self,
            slice,
            workspace,
            context,
            previous_files,
            files: BTreeMap::new(),
            run: BuildRun::default(),
        }
        .execute()
        .await
    }

    fn acquire(&self, slice: SliceId) -> Result<ActiveBuild<'_>, BuildLoopError> {
        match self.active.entry(slice) {
            Entry::Occupied(_) => Err(BuildLoopError::AlreadyBuilding(slice)),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(ActiveBuild {
                    active: &self.active,
                    slice,
                })
            }
        }
    }
}

/// Releases the per-slice build lock on drop
struct ActiveBuild<'a> {
    active: &'a DashMap<SliceId, ()>,
    slice: SliceId,
}

impl Drop for ActiveBuild<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.slice);
    }
}

/// State of one build invocation
struct SliceBuild<'a> {
    owner: &'a SelfHealingBuildLoop,
    slice: Slice,
    workspace: Workspace,
    context: Value,
    previous_files: Vec<String>,
    files: BTreeMap<String, FileSpec>,
    run: BuildRun,
}

impl SliceBuild<'_> {
    fn job(&self) -> SliceJob<'_> {
        SliceJob {
            slice: &self.slice,
            workspace: &self.workspace,
            context: &self.context,
            previous_files: &self.previous_files,
        }
    }

    fn key(&self) -> ScoreKey {
        ScoreKey::Slice(self.slice.id)
    }

    fn current_files(&self) -> Vec<FileSpec> {
        self.files.values().cloned().collect()
    }

    async fn emit(
        &self,
        payload: EventPayload,
        content: impl Into<String>,
        delta: Option<f64>,
    ) -> Result<(), BuildLoopError> {
        let mut event = NewEvent::slice(self.slice.project_id, self.slice.id, payload, content);
        if let Some(delta) = delta {
            event = event.with_delta(delta);
        }
        self.owner.reporter.emit(event).await?;
        Ok(())
    }

    async fn set_status(&mut self, to: SliceStatus) -> Result<(), BuildLoopError> {
        self.slice.transition(to)?;
        self.slice.confidence_score = self.owner.confidence.score(self.key());
        self.owner.projects.update_slice(&self.slice).await?;
        tracing::debug!(status = %to, "slice status");
        Ok(())
    }

    async fn execute(mut self) -> Result<SliceReport, BuildLoopError> {
        let weights = self.owner.weights;

        self.set_status(SliceStatus::Selected).await?;
        self.set_status(SliceStatus::Building).await?;
        self.emit(
            EventPayload::Thought,
            format!(
                "building {} with the {} strategy",
                self.slice.name,
                self.owner.strategy.name()
            ),
            None,
        )
        .await?;

        self.emit(
            EventPayload::ToolCall {
                tool: "generate_code".into(),
            },
            format!("generating code for {}", self.slice.contract.summary),
            None,
        )
        .await?;
        let generated = self.owner.strategy.generate_code(self.job()).await;
        let code = match generated {
            Ok(code) => code,
            Err(err) => return self.fail(format!("code generation failed: {err}")).await,
        };
        for note in &code.reasoning {
            self.emit(EventPayload::Thought, note.clone(), None).await?;
        }
        if let Some(failure) = self.write(code.files, Some(weights.per_file)).await? {
            return self.fail(failure).await;
        }

        let build_failure = self.check_build().await?;
        self.set_status(SliceStatus::Testing).await?;

        self.emit(
            EventPayload::ToolCall {
                tool: "generate_tests".into(),
            },
            "generating tests",
            None,
        )
        .await?;
        let sources = self.current_files();
        let generated = self.owner.strategy.generate_tests(self.job(), &sources).await;
        let test_failure = match generated {
            Ok(tests) => self.write(tests.files, Some(weights.per_file)).await?,
            Err(err) => Some(format!("test generation failed: {err}")),
        };

        let run_failure = self.test().await?;
        let mut failure = merge([build_failure, test_failure, run_failure]);

        while let Some(current) = failure {
            if self.slice.retry_count >= self.owner.max_retries {
                let reason = format!(
                    "still failing after {} heal attempts ({}): {}",
                    self.slice.retry_count,
                    self.run.last_counts,
                    first_line(&current)
                );
                return self.fail(reason).await;
            }
            self.slice.retry_count += 1;
            self.run.heal_attempts += 1;
            self.set_status(SliceStatus::SelfHealing).await?;

            failure = self.heal(self.slice.retry_count, &current).await?;
            if failure.is_some() {
                self.emit(
                    EventPayload::ConfidenceUpdate {
                        reason: "heal attempt did not fix the failure".into(),
                    },
                    format!("heal attempt {} did not fix the failure", self.slice.retry_count),
                    Some(weights.failed_retry),
                )
                .await?;
            }
        }

        self.complete().await
    }

    /// Write files; `Some(failure)` if the sandbox rejected them
    async fn write(
        &mut self,
        files: Vec<FileSpec>,
        delta: Option<f64>,
    ) -> Result<Option<String>, BuildLoopError> {
        if files.is_empty() {
            return Ok(None);
        }
        if let Err(err) = self.owner.strategy.write_files(self.job(), &files).await {
            tracing::warn!(error = %err, "writing files failed");
            return Ok(Some(format!("writing files failed: {err}")));
        }
        for file in files {
            let lines = file.lines();
            self.run.files_written += 1;
            self.run.lines_written += lines;
            self.emit(
                EventPayload::CodeWrite {
                    path: file.path.clone(),
                    lines,
                },
                format!("wrote {} ({lines} lines)", file.path),
                delta,
            )
            .await?;
            self.files.insert(file.path.clone(), file);
        }
        Ok(None)
    }

    /// Compile check; `Some(output)` on failure
    async fn check_build(&mut self) -> Result<Option<String>, BuildLoopError> {
        let checked = self.owner.strategy.build_check(self.job()).await;
        match checked {
            Ok(output) if output.success() => {
                let delta = (!self.run.build_passed).then_some(self.owner.weights.build_ok);
                self.run.build_passed = true;
                self.emit(EventPayload::signal(Signal::BuildPassed), "build check passed", delta)
                    .await?;
                Ok(None)
            }
            Ok(output) => {
                let text = output.combined();
                self.emit(
                    EventPayload::signal(Signal::BuildFailed),
                    format!("build check failed: {}", first_line(&text)),
                    None,
                )
                .await?;
                Ok(Some(text))
            }
            Err(err) => {
                let text = format!("build check failed: {err}");
                self.emit(EventPayload::signal(Signal::BuildFailed), text.clone(), None)
                    .await?;
                Ok(Some(text))
            }
        }
    }

    /// Run the suite; `Some(output)` unless every test passed
    async fn test(&mut self) -> Result<Option<String>, BuildLoopError> {
        self.run.test_attempts += 1;
        let attempt = self.run.test_attempts;
        self.emit(
            EventPayload::TestRun {
                attempt,
                command: self.owner.strategy.test_command().to_string(),
            },
            format!("running tests (attempt {attempt})"),
            None,
        )
        .await?;

        let (counts, passed, failure) = match self.owner.strategy.run_tests(self.job()).await {
            Ok(output) => {
                let text = output.combined();
                let counts = TestCounts::parse(&text);
                let passed = output.success() && counts.all_passed();
                let failure = if text.trim().is_empty() {
                    format!("tests failed: {counts}")
                } else {
                    text
                };
                (counts, passed, failure)
            }
            Err(err) => (TestCounts::default(), false, format!("test run failed: {err}")),
        };
        self.run.last_counts = counts;

        self.emit(
            EventPayload::TestResult {
                passed,
                passed_count: counts.passed,
                failed_count: counts.failed,
                attempt,
            },
            format!("{counts}"),
            passed.then_some(self.owner.weights.tests_passed),
        )
        .await?;

        Ok((!passed).then_some(failure))
    }

    /// One heal cycle; `Some(failure)` if it did not fix everything
    async fn heal(
        &mut self,
        attempt: u32,
        failure: &str,
    ) -> Result<Option<String>, BuildLoopError> {
        self.emit(
            EventPayload::ToolCall {
                tool: "diagnose".into(),
            },
            format!("diagnosing failure (attempt {attempt})"),
            None,
        )
        .await?;

        let current = self.current_files();
        let diagnosis = match self.owner.strategy.diagnose(self.job(), failure, &current).await {
            Ok(diagnosis) => diagnosis,
            Err(err) => {
                tracing::warn!(error = %err, "diagnosis failed");
                Diagnosis {
                    diagnosis: format!("diagnosis unavailable: {err}"),
                    fix_description: "no fix applied".into(),
                    files: Vec::new(),
                }
            }
        };
        self.emit(
            EventPayload::SelfHeal {
                attempt,
                diagnosis: diagnosis.diagnosis.clone(),
                fix_description: diagnosis.fix_description.clone(),
                files: diagnosis.files.len(),
            },
            diagnosis.diagnosis.clone(),
            None,
        )
        .await?;

        let write_failure = self.write(diagnosis.files, None).await?;
        self.set_status(SliceStatus::Testing).await?;
        let build_failure = self.check_build().await?;
        let test_failure = self.test().await?;
        Ok(merge([write_failure, build_failure, test_failure]))
    }

    async fn complete(mut self) -> Result<SliceReport, BuildLoopError> {
        let weights = self.owner.weights;

        if self.owner.live_verification {
            self.live_verify().await?;
        }

        let confidence = &self.owner.confidence;
        if !confidence.is_complete(self.key()) {
            let score = confidence.score(self.key());
            let target = (confidence.threshold() + weights.completion_margin).min(1.0);
            let delta = confidence.delta_reaching(self.key(), target);
            self.emit(
                EventPayload::ConfidenceUpdate {
                    reason: "tests passed".into(),
                },
                format!("tests passed, confidence {score:.2} -> {target:.2}"),
                Some(delta),
            )
            .await?;
        }

        self.slice.files = self.files.keys().cloned().collect();
        self.slice.failure_reason = None;
        self.set_status(SliceStatus::Complete).await?;
        self.emit(
            EventPayload::signal(Signal::SliceCompleted),
            format!(
                "{} complete at {:.2} confidence",
                self.slice.name, self.slice.confidence_score
            ),
            None,
        )
        .await?;
        tracing::info!(
            confidence = self.slice.confidence_score,
            retries = self.slice.retry_count,
            "slice complete"
        );

        if let Err(err) = self.owner.hook.slice_completed(&self.slice).await {
            tracing::warn!(error = %err, "slice completion hook failed");
        }

        Ok(SliceReport {
            outcome: TerminalOutcome::Completed {
                confidence: self.slice.confidence_score,
            },
            slice: self.slice,
            run: self.run,
        })
    }

    async fn live_verify(&mut self) -> Result<(), BuildLoopError> {
        let weights = self.owner.weights;
        self.emit(
            EventPayload::ToolCall {
                tool: "live_verify".into(),
            },
            "starting live verification",
            None,
        )
        .await?;

        match self.owner.strategy.live_verify(self.job()).await {
            Ok(report) if report.passed => {
                let content = match &report.preview_url {
                    Some(url) => format!("live verification passed at {url}"),
                    None => "live verification passed".to_string(),
                };
                self.emit(
                    EventPayload::signal(Signal::LivePassed),
                    content,
                    Some(weights.live_verified),
                )
                .await
            }
            Ok(report) => {
                let delta = (report.checks.passed > 0).then_some(weights.live_partial);
                self.emit(
                    EventPayload::signal(Signal::LiveFailed),
                    format!("live verification: {}", report.checks),
                    delta,
                )
                .await
            }
            Err(err) => {
                tracing::warn!(error = %err, "live verification unavailable");
                self.emit(
                    EventPayload::signal(Signal::LiveFailed),
                    format!("live verification unavailable: {err}"),
                    None,
                )
                .await
            }
        }
    }

    async fn fail(mut self, reason: String) -> Result<SliceReport, BuildLoopError> {
        tracing::warn!(%reason, "slice failed");
        self.slice.failure_reason = Some(reason.clone());
        self.set_status(SliceStatus::Failed).await?;
        self.emit(EventPayload::signal(Signal::SliceFailed), reason.clone(), None)
            .await?;
        Ok(SliceReport {
            slice: self.slice,
            outcome: TerminalOutcome::Failed { reason },
            run: self.run,
        })
    }
}

fn merge<const N: usize>(parts: [Option<String>; N]) -> Option<String> {
    let joined = parts.into_iter().flatten().collect::<Vec<_>>().join("\n");
    (!joined.is_empty()).then_some(joined)
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_skips_missing_parts() {
        assert_eq!(merge([None, None]), None);
        assert_eq!(
            merge([Some("a".into()), None, Some("b".into())]).as_deref(),
            Some("a\nb")
        );
    }

    #[test]
    fn first_line_skips_blank_lines() {
        assert_eq!(
            first_line("\n  \nerror TS2304: Cannot find name\nmore"),
            "error TS2304: Cannot find name"
        );
        assert_eq!(first_line(""), "");
    }
}
