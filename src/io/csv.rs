//! Semicolon-delimited CSV ingestion and emission (§4.6), grounded in the
//! original prototype's `pandas.read_csv(..., delimiter=';')` /
//! `to_csv(..., sep=';')` convention.

use std::io::{Read, Write};

use crate::engine::{EmittedEvent, EngineError, EventRecord};

const CASE_ID_COL: &str = "Case ID";
const ACTIVITY_COL: &str = "Activity";
const DURATION_COL: &str = "Duration";
const HOLDER_ID_COL: &str = "Holder_ID";
const EVENT_NR_COL: &str = "Event_Nr";

/// Reads a flat event table. Required columns: `Case ID`, `Activity`,
/// `Duration`. `Holder_ID` is read when the header carries it.
pub fn read_events<R: Read>(reader: R) -> Result<Vec<EventRecord>, EngineError> {
    let mut rdr = ::csv::ReaderBuilder::new().delimiter(b';').has_headers(true).from_reader(reader);

    let headers = rdr.headers().map_err(|e| EngineError::MalformedInput(format!("could not read header: {e}")))?.clone();
    let case_idx = column_index(&headers, CASE_ID_COL)?;
    let activity_idx = column_index(&headers, ACTIVITY_COL)?;
    let duration_idx = column_index(&headers, DURATION_COL)?;
    let holder_idx = headers.iter().position(|h| h == HOLDER_ID_COL);

    let mut events = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| EngineError::MalformedInput(format!("malformed row: {e}")))?;
        let case_id = field(&record, case_idx, CASE_ID_COL)?.to_string();
        let activity = field(&record, activity_idx, ACTIVITY_COL)?.to_string();
        let duration: f64 = field(&record, duration_idx, DURATION_COL)?
            .trim()
            .parse()
            .map_err(|_| EngineError::MalformedInput(format!("non-numeric duration for case '{case_id}'")))?;

        let mut event = EventRecord::new(case_id, activity, duration);
        if let Some(idx) = holder_idx {
            if let Some(holder) = record.get(idx) {
                if !holder.is_empty() {
                    event = event.with_holder(holder.to_string());
                }
            }
        }
        events.push(event);
    }
    Ok(events)
}

fn column_index(headers: &::csv::StringRecord, name: &str) -> Result<usize, EngineError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| EngineError::MalformedInput(format!("missing required column '{name}'")))
}

fn field<'a>(record: &'a ::csv::StringRecord, idx: usize, name: &str) -> Result<&'a str, EngineError> {
    record.get(idx).ok_or_else(|| EngineError::MalformedInput(format!("row missing '{name}' field")))
}

/// Writes the sanitized output table (already sorted by `emit`).
/// `Holder_ID` is emitted only when at least one row carries one, matching
/// the input-presence rule of §4.6.
pub fn write_events<W: Write>(writer: W, rows: &[EmittedEvent]) -> Result<(), EngineError> {
    let include_holder = rows.iter().any(|r| r.holder_id.is_some());
    let mut wtr = ::csv::WriterBuilder::new().delimiter(b';').from_writer(writer);

    let mut header = vec![CASE_ID_COL, ACTIVITY_COL, DURATION_COL, EVENT_NR_COL];
    if include_holder {
        header.push(HOLDER_ID_COL);
    }
    wtr.write_record(&header).map_err(|e| EngineError::InvariantViolation(format!("could not write header: {e}")))?;

    for row in rows {
        let mut fields = vec![row.case_id.clone(), row.activity.clone(), row.duration.to_string(), row.event_nr.to_string()];
        if include_holder {
            fields.push(row.holder_id.clone().unwrap_or_default());
        }
        wtr.write_record(&fields).map_err(|e| EngineError::InvariantViolation(format!("could not write row: {e}")))?;
    }
    wtr.flush().map_err(|e| EngineError::InvariantViolation(format!("could not flush output: {e}")))?;
    Ok(())
}
