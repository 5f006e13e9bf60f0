use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::thread;

use crate::error::{PipelineError, Result};

pub const DEFAULT_EXCLUDED_PROTOCOL: &str = "ICMP";
pub const DEFAULT_VOLUME_THRESHOLD: u64 = 1000;
pub const DEFAULT_OUTLIER_MULTIPLIER: f64 = 3.0;
pub const DEFAULT_TIME_WINDOW_SECS: i64 = 3600;
/// One leap year.
pub const MAX_TIME_WINDOW_SECS: i64 = 366 * 24 * 3600;

/// Knobs for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Flows with this protocol are dropped before aggregation. Empty disables the filter.
    pub excluded_protocol: String,
    /// A source is suspicious when its flow count is strictly greater than this.
    pub volume_threshold: u64,
    /// `k` in `|bytes - mean| > k * stddev`.
    pub outlier_stddev_multiplier: f64,
    pub time_window_secs: i64,
    /// Worker count for the aggregation scan.
    pub partitions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            excluded_protocol: DEFAULT_EXCLUDED_PROTOCOL.to_string(),
            volume_threshold: DEFAULT_VOLUME_THRESHOLD,
            outlier_stddev_multiplier: DEFAULT_OUTLIER_MULTIPLIER,
            time_window_secs: DEFAULT_TIME_WINDOW_SECS,
            partitions: default_partitions(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `FLOWWATCH_*` variables, read after loading `.env`.
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Self::default();

        Self {
            excluded_protocol: env::var("FLOWWATCH_EXCLUDED_PROTOCOL")
                .unwrap_or(defaults.excluded_protocol),
            volume_threshold: env::var("FLOWWATCH_VOLUME_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.volume_threshold),
            outlier_stddev_multiplier: env::var("FLOWWATCH_OUTLIER_MULTIPLIER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.outlier_stddev_multiplier),
            time_window_secs: env::var("FLOWWATCH_TIME_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.time_window_secs),
            partitions: env::var("FLOWWATCH_PARTITIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.partitions),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_window_secs <= 0 || self.time_window_secs > MAX_TIME_WINDOW_SECS {
            return Err(PipelineError::InvalidConfig(format!(
                "time_window_secs must be in 1..={}, got {}",
                MAX_TIME_WINDOW_SECS, self.time_window_secs
            )));
        }
        if !self.outlier_stddev_multiplier.is_finite() || self.outlier_stddev_multiplier < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "outlier_stddev_multiplier must be a non-negative number, got {}",
                self.outlier_stddev_multiplier
            )));
        }
        if self.partitions == 0 {
            return Err(PipelineError::InvalidConfig(
                "partitions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn excluded_protocol(&self) -> Option<&str> {
        Some(self.excluded_protocol.as_str()).filter(|p| !p.is_empty())
    }
}

fn default_partitions() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_batch_job() {
        let config = PipelineConfig::default();
        assert_eq!(config.excluded_protocol, "ICMP");
        assert_eq!(config.volume_threshold, 1000);
        assert_eq!(config.outlier_stddev_multiplier, 3.0);
        assert_eq!(config.time_window_secs, 3600);
        assert!(config.partitions >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_window() {
        let config = PipelineConfig {
            time_window_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_oversized_window() {
        let widest = PipelineConfig {
            time_window_secs: MAX_TIME_WINDOW_SECS,
            ..PipelineConfig::default()
        };
        assert!(widest.validate().is_ok());

        let huge = PipelineConfig {
            time_window_secs: i64::MAX / 2,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_bad_multiplier_and_partitions() {
        let negative = PipelineConfig {
            outlier_stddev_multiplier: -1.0,
            ..PipelineConfig::default()
        };
        assert!(negative.validate().is_err());

        let nan = PipelineConfig {
            outlier_stddev_multiplier: f64::NAN,
            ..PipelineConfig::default()
        };
        assert!(nan.validate().is_err());

        let no_workers = PipelineConfig {
            partitions: 0,
            ..PipelineConfig::default()
        };
        assert!(no_workers.validate().is_err());
    }

    #[test]
    fn empty_exclusion_disables_filter() {
        let config = PipelineConfig {
            excluded_protocol: String::new(),
            ..PipelineConfig::default()
        };
        assert_eq!(config.excluded_protocol(), None);
        assert_eq!(PipelineConfig::default().excluded_protocol(), Some("ICMP"));
    }
}
