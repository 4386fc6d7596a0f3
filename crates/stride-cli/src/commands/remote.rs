//! Remote command - a user's documents from the remote store.

use anyhow::{Context as _, Result};
use stride_store::{HistoryQuery, history_for_user};
use stride_types::RemoteStepDoc;

use super::Context;
use crate::cli::{OutputArgs, OutputFormat, RangeArgs};
use crate::format::{format_docs_csv, format_docs_json, format_docs_text};
use crate::util::{build_query, open_remote, write_output};

pub fn cmd_remote(
    ctx: &Context<'_>,
    user: Option<String>,
    range: &RangeArgs,
    output: &OutputArgs,
) -> Result<()> {
    let user = ctx.config.resolve_user(user)?;
    let query = build_query(range)?;
    let remote = open_remote(&ctx.remote_db_path())?;

    let docs = history_for_user(&remote, &user)
        .with_context(|| format!("Failed to list remote days for {}", user))?;
    let docs = select(docs, &query);

    let opts = ctx.format_options(output.no_header);
    let content = match output.format {
        OutputFormat::Text => format_docs_text(&user, &docs, &opts),
        OutputFormat::Json => format_docs_json(&docs)?,
        OutputFormat::Csv => format_docs_csv(&docs, &opts)?,
    };
    write_output(ctx.output, &content)
}

/// Apply the query's filters, ordering and paging to remote documents.
fn select(docs: Vec<RemoteStepDoc>, query: &HistoryQuery) -> Vec<RemoteStepDoc> {
    let mut docs: Vec<_> = docs.into_iter().filter(|d| query.matches(d.date)).collect();
    if query.newest_first {
        docs.sort_by(|a, b| b.date.cmp(&a.date));
    } else {
        docs.sort_by(|a, b| a.date.cmp(&b.date));
    }

    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    docs.into_iter().skip(offset).take(limit).collect()
}
