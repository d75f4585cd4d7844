//! Stage Runner Tests
//!
//! Outcome maps returned by `run_stages` for mixed stage results.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use vslice_core::*;
use vslice_store::CheckpointStore;
use vslice_test_utils::*;

fn runner(h: &Harness) -> StageRunner {
    let reporter = Reporter::new(
        h.sink.clone(),
        h.config.append_attempts,
        h.config.event_pacing(),
    );
    StageRunner::new(h.checkpoints.clone(), reporter, None)
}

#[tokio::test]
async fn failed_stage_is_isolated_in_outcome_map() {
    let h = Harness::new(PipelineConfig::default());
    let project = h.project("legacy-crm").await;
    let stages: Vec<Arc<dyn AnalysisStage>> = vec![
        Arc::new(
            FnStage::failing("code_analysis", "tree-sitter grammar missing")
                .with_delay(Duration::from_millis(100)),
        ),
        Arc::new(
            FnStage::ok("behavior_analysis", json!({"screens": 5}))
                .with_delay(Duration::from_millis(200)),
        ),
    ];

    let outcomes = runner(&h).run_stages(project, &stages).await.unwrap();

    let expected = BTreeMap::from([
        (
            "behavior_analysis".to_string(),
            StageOutcome::Success(json!({"screens": 5})),
        ),
        (
            "code_analysis".to_string(),
            StageOutcome::Failure(StageError::Failed("tree-sitter grammar missing".into())),
        ),
    ]);
    assert_eq!(outcomes, expected);

    let checkpoint = h.checkpoints.load(project).await.unwrap();
    assert_eq!(
        checkpoint.completed_steps().collect::<Vec<_>>(),
        vec!["behavior_analysis"]
    );
    assert_eq!(
        checkpoint.result("behavior_analysis"),
        Some(&json!({"screens": 5}))
    );
}

#[tokio::test]
async fn checkpointed_stage_is_skipped_on_rerun() {
    let h = Harness::new(PipelineConfig::default());
    let project = h.project("legacy-crm").await;
    let behavior = FnStage::ok("behavior_analysis", json!({"screens": 5}));
    let calls = behavior.calls();
    let stages: Vec<Arc<dyn AnalysisStage>> = vec![
        Arc::new(FnStage::failing("code_analysis", "timeout")),
        Arc::new(behavior),
    ];

    let runner = runner(&h);
    runner.run_stages(project, &stages).await.unwrap();
    let outcomes = runner.run_stages(project, &stages).await.unwrap();

    assert_eq!(outcomes["behavior_analysis"], StageOutcome::Skipped);
    assert!(outcomes["code_analysis"].is_failure());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}
