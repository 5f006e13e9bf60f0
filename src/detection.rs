use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::Result;
use crate::features::TrafficFeatures;
use crate::models::domain::FlowRecord;
use crate::stats::ByteStats;

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousActivity {
    pub activity_type: String,
    pub source: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

/// Flags sources sending more flows than the threshold.
#[derive(Debug, Clone, Copy)]
pub struct VolumeDetector {
    threshold: u64,
}

impl VolumeDetector {
    pub fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Sources whose count is strictly above the threshold. Equal is not flagged.
    pub fn detect(&self, features: &TrafficFeatures) -> BTreeSet<String> {
        features
            .volume_by_source()
            .filter(|(_, count)| *count > self.threshold)
            .map(|(source, _)| source.to_string())
            .collect()
    }
}

/// Two-phase z-score test on `bytes_transferred`.
#[derive(Debug, Clone, Copy)]
pub struct OutlierDetector {
    multiplier: f64,
}

/// Global statistics from phase one, ready to classify single records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutlierModel {
    pub mean: f64,
    pub stddev: f64,
    pub multiplier: f64,
    /// `multiplier * stddev`; a record is an outlier when it lies farther than this from the mean.
    pub cutoff: f64,
}

impl OutlierDetector {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Phase one. Needs the whole cleaned dataset.
    pub fn fit(&self, stats: &ByteStats) -> Result<OutlierModel> {
        let summary = stats.summary()?;
        let model = OutlierModel {
            mean: summary.mean,
            stddev: summary.stddev,
            multiplier: self.multiplier,
            cutoff: self.multiplier * summary.stddev,
        };
        debug!(
            mean = model.mean,
            stddev = model.stddev,
            cutoff = model.cutoff,
            "Fitted byte outlier model"
        );
        Ok(model)
    }

    pub fn detect(&self, stats: &ByteStats, records: &[FlowRecord]) -> Result<Vec<FlowRecord>> {
        let model = self.fit(stats)?;
        Ok(model.classify(records))
    }
}

impl OutlierModel {
    /// Multiplies instead of dividing, so a zero stddev flags only values off the mean.
    #[inline]
    pub fn is_outlier(&self, bytes_transferred: u64) -> bool {
        (bytes_transferred as f64 - self.mean).abs() > self.cutoff
    }

    /// Phase two. Each record is judged on its own.
    pub fn classify(&self, records: &[FlowRecord]) -> Vec<FlowRecord> {
        records
            .iter()
            .filter(|record| self.is_outlier(record.bytes_transferred))
            .cloned()
            .collect()
    }

    pub fn z_score(&self, bytes_transferred: u64) -> Option<f64> {
        (self.stddev > 0.0).then(|| (bytes_transferred as f64 - self.mean) / self.stddev)
    }
}

/// Everything the two detectors found in one dataset.
#[derive(Debug, Clone)]
pub struct Detections {
    pub suspicious_sources: BTreeSet<String>,
    pub model: OutlierModel,
    pub outliers: Vec<FlowRecord>,
    pub findings: Vec<SuspiciousActivity>,
}

#[derive(Debug, Clone, Copy)]
pub struct TrafficAnalyzer {
    volume: VolumeDetector,
    outliers: OutlierDetector,
}

impl TrafficAnalyzer {
    pub fn new(volume_threshold: u64, outlier_stddev_multiplier: f64) -> Self {
        Self {
            volume: VolumeDetector::new(volume_threshold),
            outliers: OutlierDetector::new(outlier_stddev_multiplier),
        }
    }

    pub fn detect_suspicious_traffic(
        &self,
        features: &TrafficFeatures,
        records: &[FlowRecord],
    ) -> Result<Detections> {
        let mut findings = Vec::new();

        // High traffic volume from a single source
        let suspicious_sources = self.detect_high_volume(features, &mut findings);

        // Byte counts far from the global mean
        let (model, outliers) = self.detect_byte_outliers(features, records, &mut findings)?;

        Ok(Detections {
            suspicious_sources,
            model,
            outliers,
            findings,
        })
    }

    fn detect_high_volume(
        &self,
        features: &TrafficFeatures,
        findings: &mut Vec<SuspiciousActivity>,
    ) -> BTreeSet<String> {
        let suspicious = self.volume.detect(features);

        for source in &suspicious {
            let volume = features.volume_of(source);
            warn!(source = %source, volume, "High traffic volume");
            findings.push(SuspiciousActivity {
                activity_type: "High Traffic Volume".to_string(),
                source: source.clone(),
                details: format!(
                    "{} flows, threshold {}",
                    volume,
                    self.volume.threshold()
                ),
                timestamp: features
                    .last_seen(source)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            });
        }
        suspicious
    }

    fn detect_byte_outliers(
        &self,
        features: &TrafficFeatures,
        records: &[FlowRecord],
        findings: &mut Vec<SuspiciousActivity>,
    ) -> Result<(OutlierModel, Vec<FlowRecord>)> {
        let model = self.outliers.fit(features.byte_stats())?;
        let outliers = model.classify(records);

        for record in &outliers {
            warn!(
                source = %record.source_ip,
                destination = %record.destination_ip,
                bytes = record.bytes_transferred,
                "Byte transfer outlier"
            );
            let z = model
                .z_score(record.bytes_transferred)
                .map(|z| format!("{:.2}", z))
                .unwrap_or_else(|| "n/a".to_string());
            findings.push(SuspiciousActivity {
                activity_type: "Byte Transfer Outlier".to_string(),
                source: record.source_ip.clone(),
                details: format!(
                    "Transferred {} bytes to {} over {} (mean {:.1}, z {})",
                    record.bytes_transferred, record.destination_ip, record.protocol, model.mean, z
                ),
                timestamp: record.timestamp,
            });
        }
        Ok((model, outliers))
    }
}
