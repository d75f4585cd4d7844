//! Replay Tests
//!
//! The event log is the source of truth: folding the stored deltas in order
//! must reproduce every score the aggregator reported.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use vslice_events::*;
use vslice_model::{ProjectId, SliceId};

fn replay(events: &[AgentEvent]) -> HashMap<ScoreKey, f64> {
    let mut scores = HashMap::new();
    for event in events {
        if event.score_after.is_none() {
            continue;
        }
        let key = match event.slice_id {
            Some(slice) => ScoreKey::Slice(slice),
            None => ScoreKey::Project(event.project_id),
        };
        let score = scores.entry(key).or_insert(0.0);
        *score = clamp_step(*score, event.confidence_delta.unwrap_or(0.0));
        assert_eq!(Some(*score), event.score_after, "replay diverged at {}", event.id);
    }
    scores
}

proptest! {
    #[test]
    fn prop_replay_matches_aggregator(
        steps in proptest::collection::vec((0usize..3, -3.0f64..3.0, any::<bool>()), 1..60)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let confidence = Arc::new(ConfidenceAggregator::new(0.85));
            let sink = MemoryEventSink::new(confidence.clone());
            let project = ProjectId::new();
            let slices = [SliceId::new(), SliceId::new()];

            for (target, delta, with_delta) in &steps {
                let event = match *target {
                    0 => NewEvent::project(project, EventPayload::Thought, "p"),
                    n => NewEvent::slice(project, slices[n - 1], EventPayload::Thought, "s"),
                };
                let event = if *with_delta { event.with_delta(*delta) } else { event };
                sink.append(event).await.unwrap();
            }

            let events = sink.stream_since(project, EventId::ORIGIN).await.unwrap();
            let replayed = replay(&events);
            for (key, score) in replayed {
                assert_eq!(confidence.score(key), score);
            }
            sink.verify_integrity().unwrap();
        });
    }
}

#[tokio::test]
async fn concurrent_appends_keep_order_and_chain() {
    let sink = Arc::new(MemoryEventSink::default());
    let project = ProjectId::new();

    let mut handles = Vec::new();
    for worker in 0..4 {
        let sink = sink.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                sink.append(NewEvent::project(
                    project,
                    EventPayload::stage(format!("stage-{worker}"), Signal::StageStarted),
                    format!("{worker}:{i}"),
                ))
                .await
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let events = sink.stream_since(project, EventId::ORIGIN).await.unwrap();
    assert_eq!(events.len(), 100);
    assert!(events.windows(2).all(|w| w[1].id == w[0].id.next()));
    sink.verify_integrity().unwrap();

    // Per-worker order is preserved.
    for worker in 0..4 {
        let seen: Vec<_> = events
            .iter()
            .filter(|e| e.content.starts_with(&format!("{worker}:")))
            .map(|e| e.content.clone())
            .collect();
        let expected: Vec<_> = (0..25).map(|i| format!("{worker}:{i}")).collect();
        pretty_assertions::assert_eq!(seen, expected);
    }
}
