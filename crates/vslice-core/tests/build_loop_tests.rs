//! Build Loop Tests
//!
//! Self-healing behaviour of a single slice build against scripted
//! collaborators.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use vslice_core::*;
use vslice_events::{EventKind, EventPayload, ScoreKey, Signal};
use vslice_model::{Project, Slice, SliceStatus};
use vslice_store::ProjectStore;
use vslice_test_utils::*;

struct Fixture {
    harness: Harness,
    build_loop: SelfHealingBuildLoop,
    sandbox: Arc<ScriptedSandbox>,
    hook: Arc<RecordingHook>,
    slice: Slice,
}

async fn fixture(
    config: PipelineConfig,
    codegen: ScriptedCodeGen,
    sandbox: ScriptedSandbox,
) -> Fixture {
    let harness = Harness::new(config);
    let project = Project::new("legacy-shop");
    let slice = slice_fixture(project.id, "User Auth", 8);
    harness.projects.create(project.clone()).await.unwrap();
    harness
        .projects
        .save_slices(project.id, &[slice.clone()])
        .await
        .unwrap();

    let sandbox = Arc::new(sandbox);
    let hook = Arc::new(RecordingHook::default());
    let strategy = select_strategy(
        ExecutionMode::Real,
        Some(Arc::new(codegen)),
        Some(sandbox.clone()),
        &harness.config.commands,
    )
    .unwrap();
    let reporter = Reporter::new(
        harness.sink.clone(),
        harness.config.append_attempts,
        harness.config.event_pacing(),
    );
    let build_loop = SelfHealingBuildLoop::new(
        &harness.config,
        strategy,
        reporter,
        harness.confidence.clone(),
        harness.projects.clone(),
        hook.clone(),
    );

    Fixture {
        harness,
        build_loop,
        sandbox,
        hook,
        slice,
    }
}

fn request(slice: &Slice) -> SliceBuildRequest {
    SliceBuildRequest {
        slice: slice.clone(),
        workspace: Workspace::for_project(slice.project_id),
        context: serde_json::json!({ "framework": "express" }),
        previous_files: Vec::new(),
        completed: HashSet::new(),
    }
}

fn count(kinds: &[EventKind], kind: EventKind) -> usize {
    kinds.iter().filter(|k| **k == kind).count()
}

#[tokio::test]
async fn failing_suite_heals_on_first_retry() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::new(),
        ScriptedSandbox::new(vec![jest_output(6, 2), jest_output(8, 0)]),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    assert!(report.outcome.is_completed());
    assert_eq!(report.slice.status, SliceStatus::Complete);
    assert_eq!(report.slice.retry_count, 1);
    assert!(report.slice.confidence_score >= 0.85);
    assert_eq!(report.run.test_attempts, 2);
    assert_eq!(report.run.last_counts, TestCounts::new(8, 0));

    let kinds: Vec<EventKind> = f
        .harness
        .slice_kinds(f.slice.id)
        .into_iter()
        .filter(|k| {
            matches!(
                k,
                EventKind::CodeWrite
                    | EventKind::TestRun
                    | EventKind::TestResult
                    | EventKind::SelfHeal
            )
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::CodeWrite,
            EventKind::CodeWrite,
            EventKind::CodeWrite,
            EventKind::TestRun,
            EventKind::TestResult,
            EventKind::SelfHeal,
            EventKind::CodeWrite,
            EventKind::TestRun,
            EventKind::TestResult,
        ]
    );

    let results: Vec<(bool, u32, u32)> = f
        .harness
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::TestResult {
                passed,
                passed_count,
                failed_count,
                ..
            } => Some((passed, passed_count, failed_count)),
            _ => None,
        })
        .collect();
    assert_eq!(results, vec![(false, 6, 2), (true, 8, 0)]);

    let stored = f.harness.projects.slices(f.slice.project_id).await.unwrap();
    assert_eq!(stored[0].status, SliceStatus::Complete);
    assert_eq!(stored[0].files.len(), 4);
    assert_eq!(f.hook.completed(), vec!["User Auth".to_string()]);
}

#[tokio::test]
async fn exhausted_retries_fail_the_slice() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::new(),
        ScriptedSandbox::new(vec![jest_output(6, 2)]),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    let TerminalOutcome::Failed { reason } = &report.outcome else {
        panic!("expected failure, got {:?}", report.outcome);
    };
    assert!(reason.contains("3 heal attempts"), "{reason}");
    assert_eq!(report.slice.status, SliceStatus::Failed);
    assert_eq!(report.slice.retry_count, 3);

    let kinds = f.harness.slice_kinds(f.slice.id);
    assert_eq!(count(&kinds, EventKind::SelfHeal), 3);
    assert_eq!(count(&kinds, EventKind::TestRun), 4);
    assert_eq!(f.sandbox.test_runs(), 4);
    assert!(f.hook.completed().is_empty());

    let stored = f.harness.projects.slices(f.slice.project_id).await.unwrap();
    assert_eq!(stored[0].status, SliceStatus::Failed);
    assert!(stored[0].failure_reason.is_some());
}

#[tokio::test]
async fn passing_suite_reaches_threshold_without_healing() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(8),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    let TerminalOutcome::Completed { confidence } = report.outcome else {
        panic!("expected completion");
    };
    assert!(confidence >= 0.85);
    assert_eq!(report.slice.retry_count, 0);
    let kinds = f.harness.slice_kinds(f.slice.id);
    assert_eq!(count(&kinds, EventKind::SelfHeal), 0);
    assert_eq!(count(&kinds, EventKind::ConfidenceUpdate), 1);
}

#[tokio::test]
async fn complete_slice_is_a_no_op() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(1),
    )
    .await;
    let mut slice = f.slice.clone();
    slice.status = SliceStatus::Complete;
    slice.confidence_score = 0.9;

    let report = f.build_loop.build(request(&slice)).await.unwrap();

    assert_eq!(report.outcome, TerminalOutcome::Completed { confidence: 0.9 });
    assert!(f.harness.sink.is_empty());
}

#[tokio::test]
async fn unmet_dependencies_are_rejected_before_side_effects() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(1),
    )
    .await;
    let prerequisite = slice_fixture(f.slice.project_id, "Catalog", 2);
    let slice = f.slice.clone().depends_on(prerequisite.id);

    let err = f.build_loop.build(request(&slice)).await.unwrap_err();

    assert!(matches!(
        err,
        BuildLoopError::DependenciesUnmet { ref missing, .. } if missing == &vec![prerequisite.id]
    ));
    assert!(f.harness.sink.is_empty());
    assert!(f.sandbox.commands().is_empty());
}

#[tokio::test]
async fn code_generation_outage_fails_the_slice() {
    let f = fixture(
        PipelineConfig::default(),
        ScriptedCodeGen::unavailable(),
        ScriptedSandbox::passing(1),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    let TerminalOutcome::Failed { reason } = report.outcome else {
        panic!("expected failure");
    };
    assert!(reason.contains("code generation failed"));
    assert!(f.sandbox.written().is_empty());
}

#[tokio::test]
async fn concurrent_builds_of_one_slice_are_rejected() {
    let config = PipelineConfig {
        event_pacing_ms: 5,
        ..PipelineConfig::default()
    };
    let f = fixture(config, ScriptedCodeGen::new(), ScriptedSandbox::passing(2)).await;

    let (first, second) = tokio::join!(
        f.build_loop.build(request(&f.slice)),
        f.build_loop.build(request(&f.slice)),
    );

    assert!(first.unwrap().outcome.is_completed());
    assert!(matches!(second, Err(BuildLoopError::AlreadyBuilding(id)) if id == f.slice.id));
}

#[tokio::test]
async fn failed_slice_is_rebuilt_from_scratch() {
    let f = fixture(
        PipelineConfig::default().with_max_retries(1),
        ScriptedCodeGen::new(),
        ScriptedSandbox::new(vec![jest_output(1, 1), jest_output(1, 1), jest_output(2, 0)]),
    )
    .await;

    let first = f.build_loop.build(request(&f.slice)).await.unwrap();
    assert_eq!(first.slice.status, SliceStatus::Failed);

    let second = f.build_loop.build(request(&first.slice)).await.unwrap();
    assert!(second.outcome.is_completed());
    assert_eq!(second.slice.retry_count, 0);
    assert!(second.slice.failure_reason.is_none());
}

#[tokio::test]
async fn build_failure_is_healed_like_a_test_failure() {
    let f = fixture(
        PipelineConfig::default().with_max_retries(2),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(3)
            .with_build_result(CommandOutput::failed(2, "", "error TS2304: Cannot find name 'db'")),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    // The compile check never passes, so the slice cannot complete.
    assert!(!report.outcome.is_completed());
    let build_failures = f
        .harness
        .sink
        .events()
        .into_iter()
        .filter(|e| e.payload == EventPayload::signal(Signal::BuildFailed))
        .count();
    assert_eq!(build_failures, 3);
}

#[tokio::test]
async fn live_verification_reports_preview() {
    let f = fixture(
        PipelineConfig::default().with_live_verification(true),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(4),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    assert!(report.outcome.is_completed());
    let live = f
        .harness
        .sink
        .events()
        .into_iter()
        .find(|e| e.payload == EventPayload::signal(Signal::LivePassed))
        .expect("live verification event");
    assert!(live.content.contains("preview.local"));
    assert!(live.confidence_delta.is_some());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn build_always_terminates_within_budget(
        outcomes in prop::collection::vec(any::<bool>(), 1..8),
        max_retries in 1u32..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outputs = outcomes
            .iter()
            .map(|pass| if *pass { jest_output(5, 0) } else { jest_output(4, 1) })
            .collect::<Vec<_>>();

        let (report, test_runs) = runtime.block_on(async {
            let f = fixture(
                PipelineConfig::default().with_max_retries(max_retries),
                ScriptedCodeGen::new(),
                ScriptedSandbox::new(outputs),
            )
            .await;
            let report = f.build_loop.build(request(&f.slice)).await.unwrap();
            (report, f.sandbox.test_runs())
        });

        let budget = max_retries as usize + 1;
        prop_assert!(test_runs <= budget);
        prop_assert!(report.slice.retry_count <= max_retries);

        // The queue repeats its last entry once drained.
        let effective = |i: usize| outcomes[i.min(outcomes.len() - 1)];
        let expected_pass = (0..budget).any(effective);
        prop_assert_eq!(report.outcome.is_completed(), expected_pass);
        if let TerminalOutcome::Completed { confidence } = report.outcome {
            prop_assert!(confidence >= 0.85);
        }
    }
}

#[tokio::test]
async fn passing_build_reaches_threshold_without_margin() {
    let weights = ConfidenceWeights {
        per_file: 0.0,
        build_ok: 0.0,
        tests_passed: 0.059,
        completion_margin: 0.0,
        ..ConfidenceWeights::default()
    };
    let f = fixture(
        PipelineConfig::default().with_weights(weights),
        ScriptedCodeGen::new(),
        ScriptedSandbox::passing(8),
    )
    .await;

    let report = f.build_loop.build(request(&f.slice)).await.unwrap();

    let TerminalOutcome::Completed { confidence } = report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert!(confidence >= 0.85, "confidence {confidence}");
    assert!(f.harness.confidence.is_complete(ScoreKey::Slice(f.slice.id)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn passing_build_meets_threshold_for_any_weights(
        threshold in 0.0f64..=1.0,
        per_file in 0.0f64..0.2,
        build_ok in 0.0f64..0.3,
        tests_passed in 0.0f64..0.9,
        failed_retry in -0.3f64..=0.0,
        margin in prop_oneof![Just(0.0f64), 0.0f64..0.2],
        first_pass in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let weights = ConfidenceWeights {
            per_file,
            build_ok,
            tests_passed,
            failed_retry,
            completion_margin: margin,
            ..ConfidenceWeights::default()
        };
        let config = PipelineConfig::default()
            .with_completion_threshold(threshold)
            .with_weights(weights);
        let outputs = if first_pass {
            vec![jest_output(8, 0)]
        } else {
            vec![jest_output(6, 2), jest_output(8, 0)]
        };

        let (report, complete) = runtime.block_on(async {
            let f = fixture(config, ScriptedCodeGen::new(), ScriptedSandbox::new(outputs)).await;
            let report = f.build_loop.build(request(&f.slice)).await.unwrap();
            let key = ScoreKey::Slice(f.slice.id);
            (report, f.harness.confidence.is_complete(key))
        });

        let TerminalOutcome::Completed { confidence } = report.outcome else {
            return Err(TestCaseError::fail(format!("not completed: {:?}", report.outcome)));
        };
        prop_assert!(confidence >= threshold, "{} < {}", confidence, threshold);
        prop_assert!(complete);
    }
}

#[tokio::test]
async fn event_pacing_delays_each_event() {
    let config = PipelineConfig {
        event_pacing_ms: 2,
        ..PipelineConfig::default()
    };
    let f = fixture(config, ScriptedCodeGen::new(), ScriptedSandbox::passing(1)).await;

    let started = std::time::Instant::now();
    f.build_loop.build(request(&f.slice)).await.unwrap();
    let events = f.harness.sink.len() as u32;

    assert!(started.elapsed() >= Duration::from_millis(2) * events);
}
