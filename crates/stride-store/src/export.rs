//! CSV export of step history.

use std::io::Write;

use time::format_description::well_known::Rfc3339;

use stride_types::{RemoteStepDoc, StepRecord, format_day};

use crate::error::Result;

/// Write day records as `date,steps` rows.
pub fn write_records_csv<W: Write>(writer: W, records: &[StepRecord], header: bool) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    if header {
        csv.write_record(["date", "steps"])?;
    }
    for record in records {
        csv.write_record([record.day_string(), record.count.to_string()])?;
    }

    csv.flush()?;
    Ok(())
}

/// Write remote documents as `user_uid,date,steps,timestamp` rows.
pub fn write_docs_csv<W: Write>(writer: W, docs: &[RemoteStepDoc], header: bool) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    if header {
        csv.write_record(["user_uid", "date", "steps", "timestamp"])?;
    }
    for doc in docs {
        let timestamp = doc
            .timestamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| doc.timestamp.unix_timestamp().to_string());
        csv.write_record([
            doc.user_uid.clone(),
            format_day(doc.date),
            doc.steps.to_string(),
            timestamp,
        ])?;
    }

    csv.flush()?;
    Ok(())
}
