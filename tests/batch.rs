//! Batch driver over many records.

mod common;

use article_enrich::batch::{eligible_ids, run_batch, BatchOptions};
use article_enrich::store::{MemoryRecordStore, RecordStore};
use article_enrich::{LlmError, Phase, RecordId, VehicleCategory};
use common::{
    editorial_reply, orchestrator, record, vehicle_for, RecordingSleeper, ScriptedLlmClient,
};
use std::sync::Arc;
use std::time::Duration;

fn store_with(count: usize) -> Arc<MemoryRecordStore> {
    let mut records: Vec<_> = (0..count)
        .map(|i| {
            record(
                &format!("rec-{i:02}"),
                vehicle_for(VehicleCategory::Car),
                Phase::BaseGenerated,
            )
        })
        .collect();
    records.push(record(
        "done",
        vehicle_for(VehicleCategory::Pickup),
        Phase::Completed,
    ));
    Arc::new(MemoryRecordStore::with_records(records))
}

fn options(jobs: usize) -> BatchOptions {
    BatchOptions {
        limit: None,
        delay: Duration::ZERO,
        jobs,
        to_completion: false,
    }
}

#[test]
fn only_eligible_records_are_queued() {
    let store = store_with(3);
    let ids = eligible_ids(store.as_ref()).expect("ids");
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&RecordId::new("done")));
}

#[test]
fn limit_caps_the_records_processed() {
    let store = store_with(4);
    let client = ScriptedLlmClient::new(vec![Ok(editorial_reply()); 2]);
    let orchestrator = orchestrator(store.clone(), client.clone());

    let report = run_batch(
        &orchestrator,
        &RecordingSleeper::default(),
        &BatchOptions {
            limit: Some(2),
            ..options(1)
        },
    )
    .expect("batch");

    let ids: Vec<&str> = report.items.iter().map(|i| i.record_id.as_str()).collect();
    assert_eq!(ids, vec!["rec-00", "rec-01"]);
    assert_eq!(client.calls(), 2);
    let untouched = store.load(&RecordId::new("rec-03")).expect("load");
    assert_eq!(untouched.phase, Phase::BaseGenerated);
}

#[test]
fn parallel_workers_advance_each_record_once() {
    let store = store_with(6);
    let client = ScriptedLlmClient::new(vec![Ok(editorial_reply()); 6]);
    let orchestrator = orchestrator(store.clone(), client.clone());

    let report = run_batch(&orchestrator, &RecordingSleeper::default(), &options(3))
        .expect("batch");

    assert_eq!(report.items.len(), 6);
    assert_eq!(report.succeeded(), 6);
    assert_eq!(client.calls(), 6);
    for item in &report.items {
        assert_eq!(item.outcomes.len(), 1);
        let stored = store.load(&item.record_id).expect("load");
        assert_eq!(stored.phase, Phase::EditorialCompleted);
    }
}

#[test]
fn workers_pause_between_records() {
    let store = store_with(3);
    let client = ScriptedLlmClient::new(vec![Ok(editorial_reply()); 3]);
    let orchestrator = orchestrator(store, client);
    let sleeper = RecordingSleeper::default();

    run_batch(
        &orchestrator,
        &sleeper,
        &BatchOptions {
            delay: Duration::from_millis(500),
            ..options(1)
        },
    )
    .expect("batch");

    assert_eq!(sleeper.naps(), vec![Duration::from_millis(500); 2]);
}

#[test]
fn one_failed_record_does_not_stop_the_batch() {
    let store = store_with(2);
    let client = ScriptedLlmClient::new(vec![
        Err(LlmError::Unauthorized("expired key".to_string())),
        Ok(editorial_reply()),
    ]);
    let orchestrator = orchestrator(store.clone(), client);

    let report = run_batch(&orchestrator, &RecordingSleeper::default(), &options(1))
        .expect("batch");

    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(report.items[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("expired key")));
    assert_eq!(
        store.load(&RecordId::new("rec-00")).expect("load").phase,
        Phase::Failed
    );
    assert_eq!(
        store.load(&RecordId::new("rec-01")).expect("load").phase,
        Phase::EditorialCompleted
    );
}

#[test]
fn to_completion_runs_both_phases_and_counts_fallbacks() {
    let store = store_with(2);
    let orchestrator = orchestrator(store.clone(), ScriptedLlmClient::failing());

    let report = run_batch(
        &orchestrator,
        &RecordingSleeper::default(),
        &BatchOptions {
            to_completion: true,
            ..options(2)
        },
    )
    .expect("batch");

    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.fallbacks(), 4);
    for id in ["rec-00", "rec-01"] {
        let stored = store.load(&RecordId::new(id)).expect("load");
        assert_eq!(stored.phase, Phase::Completed);
    }
}

#[test]
fn partial_progress_is_reported_when_a_later_phase_fails() {
    let store = store_with(1);
    let client = ScriptedLlmClient::new(vec![
        Ok(editorial_reply()),
        Err(LlmError::Unauthorized("revoked".to_string())),
    ]);
    let orchestrator = orchestrator(store.clone(), client);

    let report = run_batch(
        &orchestrator,
        &RecordingSleeper::default(),
        &BatchOptions {
            to_completion: true,
            ..options(1)
        },
    )
    .expect("batch");

    let item = &report.items[0];
    assert!(item.error.as_deref().is_some_and(|e| e.contains("revoked")));
    assert_eq!(item.outcomes.len(), 1);
    assert_eq!(item.outcomes[0].state, Phase::EditorialCompleted);
    let stored = store.load(&RecordId::new("rec-00")).expect("load");
    assert_eq!(stored.phase, Phase::Failed);
    assert!(stored.phase_outputs.editorial.is_some());
}
