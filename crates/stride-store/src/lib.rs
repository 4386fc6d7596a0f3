//! Local and remote persistence for daily step totals.
//!
//! Two stores back the pedometer:
//!
//! - A device-local string key-value store ([`KeyValueStore`]) holding the
//!   per-day list through [`StepLog`], plus the reconciler [`Checkpoint`].
//! - A remote per-user document collection ([`RemoteStore`]) written with
//!   upsert-if-greater semantics.
//!
//! Both have SQLite backends ([`Store`], [`SqliteRemote`]) and in-memory
//! backends for tests ([`MemoryKv`], [`MemoryRemote`]).
//!
//! # Example
//!
//! ```no_run
//! use stride_store::{HistoryQuery, StepLog, Store};
//!
//! let log = StepLog::new(Store::open_default()?);
//! for record in log.history(&HistoryQuery::new().limit(7))? {
//!     println!("{}", record);
//! }
//! # Ok::<(), stride_store::Error>(())
//! ```

mod error;
mod export;
mod kv;
mod models;
mod queries;
mod remote;
mod schema;
mod step_log;
mod store;

pub use error::{Error, Result};
pub use export::{write_docs_csv, write_records_csv};
pub use kv::{KeyValueStore, MemoryKv};
pub use models::{Checkpoint, UpsertOutcome};
pub use queries::HistoryQuery;
pub use remote::{MemoryRemote, RemoteStore, SqliteRemote, history_for_user};
pub use step_log::{CHECKPOINT_KEY, STEPS_KEY, StepLog};
pub use store::Store;

fn data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("stride")
}

/// Default local database path following platform conventions.
///
/// - Linux: `~/.local/share/stride/steps.db`
/// - macOS: `~/Library/Application Support/stride/steps.db`
/// - Windows: `C:\Users\<user>\AppData\Local\stride\steps.db`
pub fn default_db_path() -> std::path::PathBuf {
    data_dir().join("steps.db")
}

/// Default path of the SQLite-backed remote collection.
pub fn default_remote_db_path() -> std::path::PathBuf {
    data_dir().join("remote.db")
}
