//! Remote step document store.
//!
//! The hosted document database is an external collaborator; this module
//! defines the contract the tracker relies on and two local backends for it.
//! The contract has one rule that matters: [`RemoteStore::upsert_if_greater`]
//! only overwrites a document when the incoming step count is strictly
//! larger, so duplicate or out-of-order writes can never regress a day.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::debug;

use stride_types::{ParseError, RemoteStepDoc, parse_day};

use crate::error::{Error, Result};
use crate::models::UpsertOutcome;
use crate::store::{open_connection, open_memory_connection};

/// Contract for the remote per-user, per-day document collection.
pub trait RemoteStore: Send + Sync {
    /// Write `doc` unless the stored document already has at least as many
    /// steps.
    fn upsert_if_greater(&self, doc: &RemoteStepDoc) -> Result<UpsertOutcome>;

    /// Fetch a single document by key.
    fn get(&self, key: &str) -> Result<Option<RemoteStepDoc>>;

    /// Fetch the whole collection, unordered.
    fn list_all(&self) -> Result<Vec<RemoteStepDoc>>;
}

/// Documents owned by `user_uid`, newest day first.
///
/// Reads the whole collection and filters client-side, which is how the
/// collection is queried in practice.
pub fn history_for_user(store: &dyn RemoteStore, user_uid: &str) -> Result<Vec<RemoteStepDoc>> {
    let mut docs: Vec<RemoteStepDoc> = store
        .list_all()?
        .into_iter()
        .filter(|doc| doc.user_uid == user_uid)
        .collect();
    docs.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(docs)
}

fn steps_to_sql(steps: u64) -> Result<i64> {
    i64::try_from(steps)
        .map_err(|_| ParseError::InvalidValue(format!("step count {} out of range", steps)).into())
}

/// SQLite-backed document collection.
pub struct SqliteRemote {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRemote").finish_non_exhaustive()
    }
}

impl SqliteRemote {
    /// Open or create a collection database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path.as_ref())?),
        })
    }

    /// Open the default collection location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_remote_db_path())
    }

    /// Open an in-memory collection (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(open_memory_connection()?),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::LockPoisoned("remote connection"))
    }

    fn row_to_doc(row: &rusqlite::Row<'_>) -> rusqlite::Result<RemoteStepDoc> {
        let date: String = row.get(1)?;
        let steps: i64 = row.get(2)?;
        let timestamp: i64 = row.get(3)?;

        Ok(RemoteStepDoc {
            user_uid: row.get(0)?,
            date: parse_day(&date).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
            })?,
            steps: u64::try_from(steps).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, Box::new(e))
            })?,
            timestamp: OffsetDateTime::from_unix_timestamp(timestamp).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e))
            })?,
        })
    }
}

impl RemoteStore for SqliteRemote {
    fn upsert_if_greater(&self, doc: &RemoteStepDoc) -> Result<UpsertOutcome> {
        let key = doc.key();
        let steps = steps_to_sql(doc.steps)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT steps FROM step_docs WHERE key = ?", [&key], |row| {
                row.get(0)
            })
            .optional()?;

        let outcome = match existing {
            None => UpsertOutcome::Created,
            Some(prev) if steps > prev => UpsertOutcome::Updated {
                previous: prev.max(0) as u64,
            },
            Some(prev) => UpsertOutcome::Unchanged {
                existing: prev.max(0) as u64,
            },
        };

        if outcome.applied() {
            // The WHERE guard keeps the rule even for writers that skip the read.
            tx.execute(
                "INSERT INTO step_docs (key, user_uid, date, steps, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    steps = excluded.steps,
                    timestamp = excluded.timestamp
                 WHERE excluded.steps > step_docs.steps",
                rusqlite::params![
                    key,
                    doc.user_uid,
                    stride_types::format_day(doc.date),
                    steps,
                    doc.timestamp.unix_timestamp(),
                ],
            )?;
        }

        tx.commit()?;
        debug!("Remote upsert {} -> {:?}", key, outcome);
        Ok(outcome)
    }

    fn get(&self, key: &str) -> Result<Option<RemoteStepDoc>> {
        let conn = self.lock()?;
        let doc = conn
            .query_row(
                "SELECT user_uid, date, steps, timestamp FROM step_docs WHERE key = ?",
                [key],
                Self::row_to_doc,
            )
            .optional()?;
        Ok(doc)
    }

    fn list_all(&self) -> Result<Vec<RemoteStepDoc>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT user_uid, date, steps, timestamp FROM step_docs")?;
        let docs = stmt
            .query_map([], Self::row_to_doc)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs)
    }
}

/// In-memory document collection.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    docs: Mutex<BTreeMap<String, RemoteStepDoc>>,
}

impl MemoryRemote {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, RemoteStepDoc>>> {
        self.docs
            .lock()
            .map_err(|_| Error::LockPoisoned("memory remote"))
    }
}

impl RemoteStore for MemoryRemote {
    fn upsert_if_greater(&self, doc: &RemoteStepDoc) -> Result<UpsertOutcome> {
        let mut docs = self.lock()?;
        let key = doc.key();

        let outcome = match docs.get(&key) {
            None => UpsertOutcome::Created,
            Some(existing) if doc.steps > existing.steps => UpsertOutcome::Updated {
                previous: existing.steps,
            },
            Some(existing) => UpsertOutcome::Unchanged {
                existing: existing.steps,
            },
        };

        if outcome.applied() {
            docs.insert(key, doc.clone());
        }
        Ok(outcome)
    }

    fn get(&self, key: &str) -> Result<Option<RemoteStepDoc>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn list_all(&self) -> Result<Vec<RemoteStepDoc>> {
        Ok(self.lock()?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Date;
    use time::macros::{date, datetime};

    fn doc(user: &str, day: Date, steps: u64) -> RemoteStepDoc {
        RemoteStepDoc {
            user_uid: user.to_string(),
            date: day,
            steps,
            timestamp: datetime!(2024-01-01 12:00 UTC),
        }
    }

    fn backends() -> Vec<Box<dyn RemoteStore>> {
        vec![
            Box::new(MemoryRemote::new()),
            Box::new(SqliteRemote::open_in_memory().unwrap()),
        ]
    }

    #[test]
    fn test_first_write_creates() {
        for store in backends() {
            let outcome = store
                .upsert_if_greater(&doc("u", date!(2024 - 01 - 01), 100))
                .unwrap();
            assert_eq!(outcome, UpsertOutcome::Created);

            let stored = store.get("u_2024-01-01").unwrap().unwrap();
            assert_eq!(stored.steps, 100);
        }
    }

    #[test]
    fn test_larger_write_updates() {
        for store in backends() {
            store
                .upsert_if_greater(&doc("u", date!(2024 - 01 - 01), 100))
                .unwrap();
            let outcome = store
                .upsert_if_greater(&doc("u", date!(2024 - 01 - 01), 150))
                .unwrap();

            assert_eq!(outcome, UpsertOutcome::Updated { previous: 100 });
            assert_eq!(store.get("u_2024-01-01").unwrap().unwrap().steps, 150);
        }
    }

    #[test]
    fn test_smaller_or_equal_write_is_ignored() {
        for store in backends() {
            let original = doc("u", date!(2024 - 01 - 01), 100);
            store.upsert_if_greater(&original).unwrap();

            let mut stale = doc("u", date!(2024 - 01 - 01), 90);
            stale.timestamp = datetime!(2024-01-02 00:00 UTC);
            assert_eq!(
                store.upsert_if_greater(&stale).unwrap(),
                UpsertOutcome::Unchanged { existing: 100 }
            );

            let mut duplicate = doc("u", date!(2024 - 01 - 01), 100);
            duplicate.timestamp = datetime!(2024-01-03 00:00 UTC);
            assert_eq!(
                store.upsert_if_greater(&duplicate).unwrap(),
                UpsertOutcome::Unchanged { existing: 100 }
            );

            // Neither steps nor timestamp moved.
            assert_eq!(store.get("u_2024-01-01").unwrap().unwrap(), original);
        }
    }

    #[test]
    fn test_history_for_user_filters_and_sorts() {
        for store in backends() {
            store
                .upsert_if_greater(&doc("alice", date!(2024 - 01 - 01), 10))
                .unwrap();
            store
                .upsert_if_greater(&doc("alice", date!(2024 - 01 - 03), 30))
                .unwrap();
            store
                .upsert_if_greater(&doc("bob", date!(2024 - 01 - 02), 20))
                .unwrap();
            store
                .upsert_if_greater(&doc("alice", date!(2024 - 01 - 02), 25))
                .unwrap();

            let history = history_for_user(store.as_ref(), "alice").unwrap();
            let days: Vec<Date> = history.iter().map(|d| d.date).collect();
            assert_eq!(
                days,
                vec![
                    date!(2024 - 01 - 03),
                    date!(2024 - 01 - 02),
                    date!(2024 - 01 - 01)
                ]
            );
            assert!(history.iter().all(|d| d.user_uid == "alice"));
        }
    }

    #[test]
    fn test_get_missing() {
        for store in backends() {
            assert!(store.get("nobody_2024-01-01").unwrap().is_none());
        }
    }

    #[test]
    fn test_sqlite_rejects_out_of_range_steps() {
        let store = SqliteRemote::open_in_memory().unwrap();
        let result = store.upsert_if_greater(&doc("u", date!(2024 - 01 - 01), u64::MAX));
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
