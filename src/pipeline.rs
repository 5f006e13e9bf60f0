//! Source -> Preprocessor -> FeatureAggregator -> detectors.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::config::PipelineConfig;
use crate::detection::{OutlierModel, SuspiciousActivity, TrafficAnalyzer};
use crate::error::Result;
use crate::features::{FeatureAggregator, TrafficFeatures};
use crate::models::domain::{FlowRecord, RawFlowRecord};
use crate::parser;
use crate::preprocess::Preprocessor;

/// Result of a completed run. Never built from a failed stage.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub cleaned_records: usize,
    pub features: TrafficFeatures,
    pub byte_stats: OutlierModel,
    pub suspicious_sources: BTreeSet<String>,
    pub outliers: Vec<FlowRecord>,
    pub findings: Vec<SuspiciousActivity>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    aggregator: FeatureAggregator,
    analyzer: TrafficAnalyzer,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            preprocessor: Preprocessor::new(config.excluded_protocol()),
            aggregator: FeatureAggregator::new(config.time_window_secs, config.partitions),
            analyzer: TrafficAnalyzer::new(
                config.volume_threshold,
                config.outlier_stddev_multiplier,
            ),
        })
    }

    pub fn run_file<P: AsRef<Path>>(&self, path: P) -> Result<AnalysisReport> {
        let rows = parser::load_flows_from_path(path)?;
        self.run(rows)
    }

    pub fn run<I>(&self, rows: I) -> Result<AnalysisReport>
    where
        I: IntoIterator<Item = RawFlowRecord>,
    {
        let cleaned = self.preprocessor.clean(rows);
        self.analyze(cleaned)
    }

    /// Runs the aggregate and detection stages on an already cleaned dataset.
    pub fn analyze(&self, cleaned: Vec<FlowRecord>) -> Result<AnalysisReport> {
        let features = self.aggregator.aggregate(&cleaned);
        let average = features.average_bytes()?;
        info!(
            records = cleaned.len(),
            sources = features.volume_by_source().count(),
            average_bytes = average,
            "Computed traffic features"
        );

        let detections = self
            .analyzer
            .detect_suspicious_traffic(&features, &cleaned)?;
        info!(
            suspicious_sources = detections.suspicious_sources.len(),
            outliers = detections.outliers.len(),
            "Detection finished"
        );

        Ok(AnalysisReport {
            cleaned_records: cleaned.len(),
            features,
            byte_stats: detections.model,
            suspicious_sources: detections.suspicious_sources,
            outliers: detections.outliers,
            findings: detections.findings,
        })
    }
}
