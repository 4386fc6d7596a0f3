//! Bulk reconciliation between the local log and the remote collection.
//!
//! The tracker mirrors days one write at a time. These helpers cover the
//! gaps: pushing every local day after an offline stretch, and pulling a
//! user's days back onto a fresh install. Both directions use max-wins, so
//! running them any number of times never lowers a total.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stride_store::{HistoryQuery, RemoteStore, StepLog, UpsertOutcome, history_for_user};
use stride_types::{RemoteStepDoc, StepRecord};

use crate::error::{Error, Result};

/// Counts from a bulk reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Days written where none existed.
    pub created: usize,
    /// Days raised to a larger total.
    pub updated: usize,
    /// Days already at least as large on the other side.
    pub unchanged: usize,
    /// Days whose write failed.
    pub failed: usize,
}

impl SyncReport {
    /// Days examined.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged + self.failed
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated { .. } => self.updated += 1,
            UpsertOutcome::Unchanged { .. } => self.unchanged += 1,
        }
    }
}

/// Push local days matching `query` to `remote` for `user_uid`.
///
/// A failed write is counted and skipped; the rest still go out.
pub fn push_history(
    log: &StepLog,
    remote: &dyn RemoteStore,
    user_uid: &str,
    query: &HistoryQuery,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for record in log.history(query)? {
        let doc = RemoteStepDoc::from_record(user_uid, &record);
        match remote.upsert_if_greater(&doc) {
            Ok(outcome) => {
                debug!("Pushed {}: {:?}", record, outcome);
                report.record(outcome);
            }
            Err(e) => {
                warn!("Failed to push {}: {}", record, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Pushed {} days for {}: {} created, {} updated, {} unchanged, {} failed",
        report.total(),
        user_uid,
        report.created,
        report.updated,
        report.unchanged,
        report.failed
    );
    Ok(report)
}

/// Pull `user_uid`'s remote days into the local log.
///
/// A remote day only replaces a local one when it holds more steps.
pub fn pull_history(log: &StepLog, remote: &dyn RemoteStore, user_uid: &str) -> Result<SyncReport> {
    let docs = history_for_user(remote, user_uid).map_err(Error::remote)?;
    let mut report = SyncReport::default();

    for doc in docs {
        let incoming = doc.to_record();
        let outcome = match log.get(incoming.date)? {
            None => UpsertOutcome::Created,
            Some(local) if incoming.count > local.count => UpsertOutcome::Updated {
                previous: local.count,
            },
            Some(local) => UpsertOutcome::Unchanged {
                existing: local.count,
            },
        };

        if outcome.applied() {
            log.upsert(StepRecord::new(incoming.date, incoming.count))?;
        }
        report.record(outcome);
    }

    info!(
        "Pulled {} days for {}: {} created, {} updated, {} unchanged",
        report.total(),
        user_uid,
        report.created,
        report.updated,
        report.unchanged
    );
    Ok(report)
}
