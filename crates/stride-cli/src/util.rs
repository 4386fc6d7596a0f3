//! Shared helpers for command implementations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stride_store::{HistoryQuery, SqliteRemote, StepLog, Store};
use time::Date;

use crate::cli::RangeArgs;

/// Parse a `YYYY-MM-DD` argument.
pub fn parse_day_arg(s: &str) -> Result<Date> {
    stride_types::parse_day(s).with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", s))
}

/// Build a history query from range flags.
pub fn build_query(range: &RangeArgs) -> Result<HistoryQuery> {
    let mut query = HistoryQuery::new();
    if let Some(since) = &range.since {
        query = query.since(parse_day_arg(since)?);
    }
    if let Some(until) = &range.until {
        query = query.until(parse_day_arg(until)?);
    }
    if range.limit > 0 {
        query = query.limit(range.limit);
    }
    if range.oldest_first {
        query = query.oldest_first();
    }
    Ok(query)
}

/// Open the local step log backed by SQLite at `path`.
pub fn open_log(path: &Path) -> Result<StepLog> {
    let store = Store::open(path)
        .with_context(|| format!("Failed to open step database {}", path.display()))?;
    Ok(StepLog::new(store))
}

/// Open the remote store at `path`.
pub fn open_remote(path: &Path) -> Result<SqliteRemote> {
    SqliteRemote::open(path)
        .with_context(|| format!("Failed to open remote database {}", path.display()))
}

/// Write content to file or stdout.
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
