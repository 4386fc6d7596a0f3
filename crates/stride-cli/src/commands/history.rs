//! History command - daily totals from the local store.

use anyhow::Result;

use super::Context;
use crate::cli::{OutputArgs, OutputFormat, RangeArgs};
use crate::format::{format_records_csv, format_records_json, format_records_text};
use crate::util::{build_query, open_log, write_output};

pub fn cmd_history(ctx: &Context<'_>, range: &RangeArgs, output: &OutputArgs) -> Result<()> {
    let query = build_query(range)?;
    let log = open_log(&ctx.db_path())?;
    let records = log.history(&query)?;

    let opts = ctx.format_options(output.no_header);
    let content = match output.format {
        OutputFormat::Text => format_records_text(&records, &opts),
        OutputFormat::Json => format_records_json(&records)?,
        OutputFormat::Csv => format_records_csv(&records, &opts)?,
    };
    write_output(ctx.output, &content)
}
