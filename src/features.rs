//! Traffic features computed from the cleaned dataset.
//!
//! All four views come out of one scan. Each partition fills its own
//! [`FeatureAccumulator`]; the partials are merged at a single join point,
//! so no counter is ever shared between workers.

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::unbounded;
use std::collections::HashMap;
use std::thread;
use tracing::debug;

use crate::error::Result;
use crate::models::domain::FlowRecord;
use crate::stats::ByteStats;

/// Partial aggregates for a slice of the dataset.
#[derive(Debug, Clone)]
pub struct FeatureAccumulator {
    window_secs: i64,
    volume_by_source: HashMap<String, u64>,
    bytes_by_protocol: HashMap<String, u128>,
    traffic_by_window: HashMap<DateTime<Utc>, u64>,
    last_seen_by_source: HashMap<String, DateTime<Utc>>,
    bytes: ByteStats,
}

impl FeatureAccumulator {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            volume_by_source: HashMap::new(),
            bytes_by_protocol: HashMap::new(),
            traffic_by_window: HashMap::new(),
            last_seen_by_source: HashMap::new(),
            bytes: ByteStats::new(),
        }
    }

    pub fn update(&mut self, record: &FlowRecord) {
        *self
            .volume_by_source
            .entry(record.source_ip.clone())
            .or_insert(0) += 1;
        *self
            .bytes_by_protocol
            .entry(record.protocol.clone())
            .or_insert(0) += record.bytes_transferred as u128;
        *self
            .traffic_by_window
            .entry(window_start(record.timestamp, self.window_secs))
            .or_insert(0) += 1;
        self.last_seen_by_source
            .entry(record.source_ip.clone())
            .and_modify(|seen| *seen = (*seen).max(record.timestamp))
            .or_insert(record.timestamp);
        self.bytes.update(record.bytes_transferred);
    }

    /// Folds `other` into `self`. Order of merging does not matter.
    pub fn merge(&mut self, other: FeatureAccumulator) {
        debug_assert_eq!(self.window_secs, other.window_secs);

        for (source, count) in other.volume_by_source {
            *self.volume_by_source.entry(source).or_insert(0) += count;
        }
        for (protocol, bytes) in other.bytes_by_protocol {
            *self.bytes_by_protocol.entry(protocol).or_insert(0) += bytes;
        }
        for (window, count) in other.traffic_by_window {
            *self.traffic_by_window.entry(window).or_insert(0) += count;
        }
        for (source, seen) in other.last_seen_by_source {
            self.last_seen_by_source
                .entry(source)
                .and_modify(|current| *current = (*current).max(seen))
                .or_insert(seen);
        }
        self.bytes.merge(&other.bytes);
    }

    pub fn finish(self) -> TrafficFeatures {
        TrafficFeatures {
            window_secs: self.window_secs,
            volume_by_source: self.volume_by_source,
            bytes_by_protocol: self.bytes_by_protocol,
            traffic_by_window: self.traffic_by_window,
            last_seen_by_source: self.last_seen_by_source,
            bytes: self.bytes,
        }
    }
}

/// Start of the epoch-aligned window containing `timestamp`.
///
/// A start earlier than the first representable instant is pinned to it, so
/// every record lands in some bucket.
pub fn window_start(timestamp: DateTime<Utc>, window_secs: i64) -> DateTime<Utc> {
    timestamp
        .timestamp()
        .div_euclid(window_secs)
        .checked_mul(window_secs)
        .and_then(|start| DateTime::from_timestamp(start, 0))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// The aggregate views. Maps are sparse: keys with no records are absent.
#[derive(Debug, Clone)]
pub struct TrafficFeatures {
    window_secs: i64,
    volume_by_source: HashMap<String, u64>,
    bytes_by_protocol: HashMap<String, u128>,
    traffic_by_window: HashMap<DateTime<Utc>, u64>,
    last_seen_by_source: HashMap<String, DateTime<Utc>>,
    bytes: ByteStats,
}

impl TrafficFeatures {
    pub fn record_count(&self) -> u64 {
        self.bytes.count()
    }

    pub fn byte_stats(&self) -> &ByteStats {
        &self.bytes
    }

    pub fn window_size(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }

    pub fn volume_of(&self, source_ip: &str) -> u64 {
        self.volume_by_source.get(source_ip).copied().unwrap_or(0)
    }

    /// TrafficVolumeBySource, unordered.
    pub fn volume_by_source(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.volume_by_source
            .iter()
            .map(|(source, count)| (source.as_str(), *count))
    }

    /// BytesByProtocol, unordered.
    pub fn bytes_by_protocol(&self) -> impl Iterator<Item = (&str, u128)> + '_ {
        self.bytes_by_protocol
            .iter()
            .map(|(protocol, bytes)| (protocol.as_str(), *bytes))
    }

    /// TrafficByTimeWindow keyed by window start, unordered.
    pub fn traffic_by_window(&self) -> impl Iterator<Item = (DateTime<Utc>, u64)> + '_ {
        self.traffic_by_window
            .iter()
            .map(|(start, count)| (*start, *count))
    }

    /// End of the window starting at `start`, capped at the last representable instant.
    pub fn window_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_signed(self.window_size())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Timestamp of the newest flow from `source_ip`.
    pub fn last_seen(&self, source_ip: &str) -> Option<DateTime<Utc>> {
        self.last_seen_by_source.get(source_ip).copied()
    }

    /// Fails on an empty dataset instead of reporting 0 or NaN.
    pub fn average_bytes(&self) -> Result<f64> {
        self.bytes.mean()
    }

    pub fn sorted_volume_by_source(&self) -> Vec<(&str, u64)> {
        let mut pairs: Vec<_> = self.volume_by_source().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    pub fn sorted_bytes_by_protocol(&self) -> Vec<(&str, u128)> {
        let mut pairs: Vec<_> = self.bytes_by_protocol().collect();
        pairs.sort_unstable_by(|a, b| a.0.cmp(b.0));
        pairs
    }

    pub fn sorted_traffic_by_window(&self) -> Vec<(DateTime<Utc>, u64)> {
        let mut pairs: Vec<_> = self.traffic_by_window().collect();
        pairs.sort_unstable_by_key(|(start, _)| *start);
        pairs
    }
}

/// Runs the feature scan over `partitions` worker threads.
#[derive(Debug, Clone)]
pub struct FeatureAggregator {
    window_secs: i64,
    partitions: usize,
}

impl FeatureAggregator {
    pub fn new(window_secs: i64, partitions: usize) -> Self {
        Self {
            window_secs,
            partitions: partitions.max(1),
        }
    }

    pub fn aggregate(&self, records: &[FlowRecord]) -> TrafficFeatures {
        if self.partitions == 1 || records.len() < 2 {
            return self.scan(records).finish();
        }

        let chunk_size = records.len().div_ceil(self.partitions);
        let (tx, rx) = unbounded();

        thread::scope(|scope| {
            for (partition, chunk) in records.chunks(chunk_size).enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let partial = self.scan(chunk);
                    debug!(partition, records = chunk.len(), "Partition scanned");
                    tx.send(partial).unwrap_or_else(|e| {
                        debug!("Join point gone before partition {} reported: {}", partition, e)
                    });
                });
            }
        });
        drop(tx);

        let mut total = FeatureAccumulator::new(self.window_secs);
        for partial in rx {
            total.merge(partial);
        }
        total.finish()
    }

    fn scan(&self, records: &[FlowRecord]) -> FeatureAccumulator {
        let mut acc = FeatureAccumulator::new(self.window_secs);
        for record in records {
            acc.update(record);
        }
        acc
    }
}
