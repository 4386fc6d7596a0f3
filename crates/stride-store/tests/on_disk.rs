//! Persistence across process restarts, using real database files.

use stride_store::{
    Checkpoint, HistoryQuery, RemoteStore, SqliteRemote, StepLog, Store, UpsertOutcome,
    history_for_user,
};
use stride_types::{RemoteStepDoc, StepRecord};
use time::macros::date;

#[test]
fn test_step_log_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steps.db");

    {
        let log = StepLog::new(Store::open(&path).unwrap());
        log.upsert(StepRecord::new(date!(2024 - 01 - 01), 500)).unwrap();
        log.upsert(StepRecord::new(date!(2024 - 01 - 02), 120)).unwrap();
        log.save_checkpoint(&Checkpoint {
            day: date!(2024 - 01 - 02),
            day_total: 120,
            last_raw: Some(4_321),
        })
        .unwrap();
    }

    let log = StepLog::new(Store::open(&path).unwrap());
    assert_eq!(
        log.history(&HistoryQuery::new()).unwrap(),
        vec![
            StepRecord::new(date!(2024 - 01 - 02), 120),
            StepRecord::new(date!(2024 - 01 - 01), 500),
        ]
    );
    assert_eq!(
        log.load_checkpoint().unwrap().and_then(|c| c.last_raw),
        Some(4_321)
    );
    assert_eq!(log.total_steps().unwrap(), 620);
}

#[test]
fn test_remote_max_wins_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let day = StepRecord::new(date!(2024 - 01 - 01), 250);

    {
        let remote = SqliteRemote::open(&path).unwrap();
        assert_eq!(
            remote
                .upsert_if_greater(&RemoteStepDoc::from_record("alice", &day))
                .unwrap(),
            UpsertOutcome::Created
        );
    }

    // A late, smaller write from another writer does not lower the day.
    let remote = SqliteRemote::open(&path).unwrap();
    let stale = StepRecord::new(day.date, 200);
    assert_eq!(
        remote
            .upsert_if_greater(&RemoteStepDoc::from_record("alice", &stale))
            .unwrap(),
        UpsertOutcome::Unchanged { existing: 250 }
    );

    let docs = history_for_user(&remote, "alice").unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].steps, 250);
    assert!(history_for_user(&remote, "bob").unwrap().is_empty());
}
