//! Cleaning step between the flow source and the aggregator.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::models::domain::{FlowRecord, RawFlowRecord};

/// Zero-fills numeric nulls, drops exact duplicates and drops the excluded protocol.
///
/// A null protocol never compares equal or unequal to the excluded one, so
/// such rows are dropped whenever an exclusion is configured.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    excluded_protocol: Option<String>,
}

impl Preprocessor {
    pub fn new(excluded_protocol: Option<&str>) -> Self {
        Self {
            excluded_protocol: excluded_protocol.map(str::to_string),
        }
    }

    /// Survivors keep the order of their first occurrence.
    pub fn clean<I>(&self, rows: I) -> Vec<FlowRecord>
    where
        I: IntoIterator<Item = RawFlowRecord>,
    {
        let mut seen = HashSet::new();
        let mut cleaned = Vec::new();
        let mut total = 0usize;
        let mut duplicates = 0usize;
        let mut excluded = 0usize;

        for row in rows {
            total += 1;
            let unknown_protocol = row.protocol.is_none();
            let record = fill_nulls(row);

            if !seen.insert(record.clone()) {
                duplicates += 1;
                continue;
            }
            if self.is_excluded(&record) || (unknown_protocol && self.excluded_protocol.is_some()) {
                excluded += 1;
                continue;
            }
            cleaned.push(record);
        }

        debug!(duplicates, excluded, "Preprocessor dropped rows");
        info!(input = total, cleaned = cleaned.len(), "Cleaned flow records");
        cleaned
    }

    pub fn is_excluded(&self, record: &FlowRecord) -> bool {
        self.excluded_protocol
            .as_deref()
            .map_or(false, |protocol| record.protocol == protocol)
    }
}

fn fill_nulls(row: RawFlowRecord) -> FlowRecord {
    FlowRecord {
        timestamp: row.timestamp,
        source_ip: row.source_ip,
        destination_ip: row.destination_ip,
        port: row.port.unwrap_or(0),
        protocol: row.protocol.unwrap_or_default(),
        bytes_transferred: row.bytes_transferred.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw(src: &str, port: Option<u16>, protocol: &str, bytes: Option<u64>) -> RawFlowRecord {
        RawFlowRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            source_ip: src.to_string(),
            destination_ip: "10.0.0.254".to_string(),
            port,
            protocol: Some(protocol.to_string()),
            bytes_transferred: bytes,
        }
    }

    #[test]
    fn zero_fills_missing_numbers() {
        let cleaned = Preprocessor::new(Some("ICMP")).clean(vec![raw("A", None, "TCP", None)]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].port, 0);
        assert_eq!(cleaned[0].bytes_transferred, 0);
    }

    #[test]
    fn null_and_zero_rows_are_duplicates_after_filling() {
        let cleaned = Preprocessor::new(None).clean(vec![
            raw("A", None, "TCP", Some(10)),
            raw("A", Some(0), "TCP", Some(10)),
        ]);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn drops_exact_duplicates_only() {
        let cleaned = Preprocessor::new(None).clean(vec![
            raw("A", Some(80), "TCP", Some(10)),
            raw("A", Some(80), "TCP", Some(10)),
            raw("A", Some(80), "TCP", Some(11)),
        ]);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].bytes_transferred, 10);
        assert_eq!(cleaned[1].bytes_transferred, 11);
    }

    #[test]
    fn excludes_configured_protocol() {
        let cleaned = Preprocessor::new(Some("ICMP")).clean(vec![
            raw("A", Some(0), "ICMP", Some(64)),
            raw("B", Some(53), "UDP", Some(80)),
            raw("C", Some(0), "icmp", Some(64)),
        ]);
        assert!(cleaned.iter().all(|r| r.protocol != "ICMP"));
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn null_protocol_follows_the_exclusion_filter() {
        let unknown = RawFlowRecord {
            protocol: None,
            ..raw("A", Some(80), "TCP", Some(10))
        };

        let filtered = Preprocessor::new(Some("ICMP")).clean(vec![unknown.clone()]);
        assert!(filtered.is_empty());

        let unfiltered = Preprocessor::new(None).clean(vec![unknown]);
        assert_eq!(unfiltered.len(), 1);
        assert_eq!(unfiltered[0].protocol, "");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let pre = Preprocessor::new(Some("ICMP"));
        let once = pre.clean(vec![
            raw("A", Some(80), "TCP", Some(10)),
            raw("A", Some(80), "TCP", Some(10)),
            raw("B", None, "ICMP", None),
            raw("C", None, "UDP", None),
        ]);
        let twice = pre.clean(once.iter().cloned().map(RawFlowRecord::from));
        assert_eq!(once, twice);

        let unique: HashSet<_> = twice.iter().collect();
        assert_eq!(unique.len(), twice.len());
    }
}
