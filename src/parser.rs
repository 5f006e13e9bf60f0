// Reads flow logs shaped like
// timestamp,source_ip,destination_ip,port,protocol,bytes_transferred

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::domain::RawFlowRecord;

const FIELD_COUNT: usize = 6;

pub fn load_flows_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<RawFlowRecord>> {
    let file = File::open(path.as_ref())?;
    let flows = load_flows(BufReader::new(file))?;
    info!(
        path = %path.as_ref().display(),
        rows = flows.len(),
        "Loaded flow log"
    );
    Ok(flows)
}

/// Parses every row of a CSV flow log. The first non-blank line is skipped when it is a header.
pub fn load_flows<R: BufRead>(reader: R) -> Result<Vec<RawFlowRecord>> {
    let mut flows = Vec::new();
    let mut first_content = true;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;

        if line.trim().is_empty() {
            continue;
        }
        if std::mem::take(&mut first_content) && line.contains("timestamp") {
            debug!(line = line_no, "Skipping header row");
            continue;
        }

        flows.push(parse_line(&line, line_no)?);
    }

    Ok(flows)
}

pub fn parse_line(line: &str, line_no: usize) -> Result<RawFlowRecord> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() != FIELD_COUNT {
        return Err(PipelineError::schema(
            line_no,
            format!("expected {} fields, found {}", FIELD_COUNT, parts.len()),
        ));
    }

    Ok(RawFlowRecord {
        timestamp: parse_timestamp(parts[0])
            .ok_or_else(|| PipelineError::schema(line_no, format!("bad timestamp {:?}", parts[0])))?,
        source_ip: parts[1].to_string(),
        destination_ip: parts[2].to_string(),
        port: parse_nullable(parts[3])
            .map_err(|_| PipelineError::schema(line_no, format!("bad port {:?}", parts[3])))?,
        protocol: nullable_text(parts[4]),
        bytes_transferred: parse_nullable(parts[5]).map_err(|_| {
            PipelineError::schema(line_no, format!("bad bytes_transferred {:?}", parts[5]))
        })?,
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` as UTC, or Unix epoch seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn nullable_text(raw: &str) -> Option<String> {
    (!raw.is_empty() && !raw.eq_ignore_ascii_case("null")).then(|| raw.to_string())
}

fn parse_nullable<T: std::str::FromStr>(raw: &str) -> std::result::Result<Option<T>, T::Err> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    raw.parse().map(Some)
}
