//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use stride_core::{Permission, PermissionStatus, TrackerSummary};
use stride_store::{write_docs_csv, write_records_csv};
use stride_types::{RemoteStepDoc, StepRecord};
use tabled::builder::Builder;
use tabled::settings::Style;
use time::format_description::well_known::Rfc3339;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            no_header: false,
        }
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    fn bold(&self, text: impl std::fmt::Display) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().to_string()
        }
    }
}

/// Pretty JSON with a trailing newline.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

fn csv_string(write: impl FnOnce(&mut Vec<u8>) -> stride_store::Result<()>) -> Result<String> {
    let mut buf = Vec::new();
    write(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

// ============================================================================
// Daily records
// ============================================================================

pub fn format_records_text(records: &[StepRecord], opts: &FormatOptions) -> String {
    if records.is_empty() {
        return "No days recorded.\n".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(["Date", "Steps"]);
    for record in records {
        builder.push_record([record.day_string(), record.count.to_string()]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());

    let total: u64 = records.iter().map(|r| r.count).sum();
    format!(
        "{}\nTotal: {} steps over {} days\n",
        table,
        opts.bold(total),
        records.len()
    )
}

pub fn format_records_json(records: &[StepRecord]) -> Result<String> {
    to_json(records)
}

pub fn format_records_csv(records: &[StepRecord], opts: &FormatOptions) -> Result<String> {
    csv_string(|buf| write_records_csv(buf, records, !opts.no_header))
}

// ============================================================================
// Remote documents
// ============================================================================

pub fn format_docs_text(user_uid: &str, docs: &[RemoteStepDoc], opts: &FormatOptions) -> String {
    if docs.is_empty() {
        return format!("No remote days for {}.\n", user_uid);
    }

    let mut builder = Builder::default();
    builder.push_record(["Date", "Steps", "Written"]);
    for doc in docs {
        let written = doc
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| doc.timestamp.to_string());
        builder.push_record([doc.to_record().day_string(), doc.steps.to_string(), written]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());

    format!("Remote days for {}:\n{}\n", opts.bold(user_uid), table)
}

pub fn format_docs_json(docs: &[RemoteStepDoc]) -> Result<String> {
    to_json(docs)
}

pub fn format_docs_csv(docs: &[RemoteStepDoc], opts: &FormatOptions) -> Result<String> {
    csv_string(|buf| write_docs_csv(buf, docs, !opts.no_header))
}

// ============================================================================
// Tracker runs
// ============================================================================

/// Days a run touched: the ones it closed, then the one it ended on.
pub fn summary_days(summary: &TrackerSummary) -> Vec<StepRecord> {
    let mut days = summary.days_closed.clone();
    if let Some(finished) = summary.finished
        && !days.iter().any(|d| d.date == finished.date)
    {
        days.push(finished);
    }
    days
}

pub fn format_summary_text(summary: &TrackerSummary, opts: &FormatOptions) -> String {
    let mut out = String::new();

    if let Some(today) = summary.finished {
        out.push_str(&format!(
            "{}: {} steps\n",
            today.day_string(),
            opts.bold(today.count)
        ));
    }
    for record in &summary.days_closed {
        out.push_str(&format!("  closed {}\n", record));
    }

    out.push_str(&format!(
        "  readings: {}, added: {}, counter resets: {}\n",
        summary.readings, summary.steps_added, summary.counter_resets
    ));
    if summary.syncs_completed > 0 || summary.syncs_failed > 0 {
        out.push_str(&format!(
            "  remote writes: {} ok, {} failed\n",
            summary.syncs_completed, summary.syncs_failed
        ));
    }
    if summary.persist_failures > 0 {
        out.push_str(&format!(
            "  local writes failed: {}\n",
            summary.persist_failures
        ));
    }
    if let Some(error) = &summary.sensor_error {
        let line = format!("  sensor error: {}", error);
        if opts.no_color {
            out.push_str(&line);
        } else {
            out.push_str(&line.yellow().to_string());
        }
        out.push('\n');
    }
    if summary.cancelled {
        out.push_str("  stopped by user\n");
    }
    out
}

pub fn format_summary_json(summary: &TrackerSummary) -> Result<String> {
    to_json(summary)
}

pub fn format_summary_csv(summary: &TrackerSummary, opts: &FormatOptions) -> Result<String> {
    format_records_csv(&summary_days(summary), opts)
}

// ============================================================================
// Permissions
// ============================================================================

#[derive(Serialize)]
struct PermissionRow {
    permission: Permission,
    status: PermissionStatus,
}

pub fn format_permissions_text(
    statuses: &[(Permission, PermissionStatus)],
    opts: &FormatOptions,
) -> String {
    if statuses.is_empty() {
        return "No runtime permissions required on this platform.\n".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(["Permission", "Status"]);
    for (permission, status) in statuses {
        let label = match (status, opts.no_color) {
            (PermissionStatus::Granted, true) => "granted".to_string(),
            (PermissionStatus::Denied, true) => "denied".to_string(),
            (PermissionStatus::Granted, false) => "granted".green().to_string(),
            (PermissionStatus::Denied, false) => "denied".red().to_string(),
        };
        builder.push_record([permission.to_string(), label]);
    }
    let mut table = builder.build();
    table.with(Style::rounded());
    format!("{}\n", table)
}

pub fn format_permissions_json(statuses: &[(Permission, PermissionStatus)]) -> Result<String> {
    let rows: Vec<PermissionRow> = statuses
        .iter()
        .map(|(permission, status)| PermissionRow {
            permission: *permission,
            status: *status,
        })
        .collect();
    to_json(&rows)
}

pub fn format_permissions_csv(
    statuses: &[(Permission, PermissionStatus)],
    opts: &FormatOptions,
) -> String {
    let mut out = String::new();
    if !opts.no_header {
        out.push_str("permission,status\n");
    }
    for (permission, status) in statuses {
        let status = if status.is_granted() { "granted" } else { "denied" };
        out.push_str(&format!("{},{}\n", permission.as_str(), status));
    }
    out
}
