//! Sync command - bulk reconciliation between the local and remote stores.

use anyhow::{Context as _, Result};
use stride_core::{SyncReport, pull_history, push_history};
use stride_store::HistoryQuery;

use super::Context;
use crate::cli::SyncDirection;
use crate::util::{open_log, open_remote, parse_day_arg, write_output};

pub fn cmd_sync(ctx: &Context<'_>, direction: SyncDirection) -> Result<()> {
    let log = open_log(&ctx.db_path())?;
    let remote = open_remote(&ctx.remote_db_path())?;

    let (verb, report) = match direction {
        SyncDirection::Push { user, since } => {
            let user = ctx.config.resolve_user(user)?;
            let mut query = HistoryQuery::new().oldest_first();
            if let Some(since) = since {
                query = query.since(parse_day_arg(&since)?);
            }
            let report = push_history(&log, &remote, &user, &query)
                .with_context(|| format!("Failed to push days for {}", user))?;
            ("Pushed", report)
        }
        SyncDirection::Pull { user } => {
            let user = ctx.config.resolve_user(user)?;
            let report = pull_history(&log, &remote, &user)
                .with_context(|| format!("Failed to pull days for {}", user))?;
            ("Pulled", report)
        }
    };

    if ctx.quiet && report.failed == 0 {
        return Ok(());
    }
    write_output(ctx.output, &describe(verb, &report))
}

fn describe(verb: &str, report: &SyncReport) -> String {
    let mut line = format!(
        "{} {} days: {} created, {} updated, {} unchanged",
        verb,
        report.total(),
        report.created,
        report.updated,
        report.unchanged
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    line.push('\n');
    line
}
