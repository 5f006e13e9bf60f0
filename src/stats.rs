//! Streaming statistics over `bytes_transferred`.
//!
//! Count and sum are exact integers, and so is the sum of squares while it
//! fits in a `u128`. Past that, variance comes from Welford moments merged
//! with Chan's pairwise update, which agree across partitions up to float
//! rounding.

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Count, sum and second moment of byte counts.
#[derive(Debug, Clone, Copy)]
pub struct ByteStats {
    count: u64,
    sum: u128,
    /// `None` once the exact sum of squares no longer fits.
    sum_sq: Option<u128>,
    mean: f64,
    m2: f64,
}

/// Mean and sample standard deviation of a non-empty dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ByteSummary {
    pub count: u64,
    pub mean: f64,
    pub stddev: f64,
}

impl Default for ByteStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            sum_sq: Some(0),
            mean: 0.0,
            m2: 0.0,
        }
    }
}

impl ByteStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, bytes: u64) {
        let value = bytes as u128;
        self.count += 1;
        self.sum += value;
        self.sum_sq = self.sum_sq.and_then(|s| s.checked_add(value * value));

        // Welford
        let x = bytes as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn merge(&mut self, other: &ByteStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }

        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;

        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq = self
            .sum_sq
            .zip(other.sum_sq)
            .and_then(|(a, b)| a.checked_add(b));
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> u128 {
        self.sum
    }

    /// Exact sum of squares, if it fits.
    pub fn sum_of_squares(&self) -> Option<u128> {
        self.sum_sq
    }

    pub fn mean(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(PipelineError::EmptyDataset {
                stage: "average bytes",
            });
        }
        Ok(self.sum as f64 / self.count as f64)
    }

    /// Sample variance (n - 1 denominator). A single record has variance 0.
    pub fn variance(&self) -> Result<f64> {
        if self.count == 0 {
            return Err(PipelineError::EmptyDataset {
                stage: "byte standard deviation",
            });
        }
        if self.count < 2 {
            return Ok(0.0);
        }

        let n = self.count as u128;
        // n * sum_sq - sum^2 is never negative.
        let exact = self
            .sum_sq
            .and_then(|sum_sq| n.checked_mul(sum_sq))
            .zip(self.sum.checked_mul(self.sum))
            .and_then(|(scaled, squared)| scaled.checked_sub(squared));

        let variance = match exact {
            Some(numerator) => numerator as f64 / (n * (n - 1)) as f64,
            None => self.m2.max(0.0) / (self.count - 1) as f64,
        };
        Ok(variance)
    }

    pub fn stddev(&self) -> Result<f64> {
        self.variance().map(f64::sqrt)
    }

    pub fn summary(&self) -> Result<ByteSummary> {
        Ok(ByteSummary {
            count: self.count,
            mean: self.mean()?,
            stddev: self.stddev()?,
        })
    }
}

impl FromIterator<u64> for ByteStats {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut stats = ByteStats::new();
        for bytes in iter {
            stats.update(bytes);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_mean() {
        let stats = ByteStats::new();
        assert!(matches!(stats.mean(), Err(PipelineError::EmptyDataset { .. })));
        assert!(matches!(stats.stddev(), Err(PipelineError::EmptyDataset { .. })));
        assert!(stats.summary().is_err());
    }

    #[test]
    fn sample_stddev_of_skewed_values() {
        let stats: ByteStats = [10, 10, 10, 10, 1000].into_iter().collect();
        let summary = stats.summary().unwrap();
        assert_eq!(summary.mean, 208.0);
        assert!((summary.stddev - 442.741_46).abs() < 1e-4);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let stats: ByteStats = [42].into_iter().collect();
        assert_eq!(stats.mean().unwrap(), 42.0);
        assert_eq!(stats.stddev().unwrap(), 0.0);
    }

    #[test]
    fn identical_values_have_zero_spread() {
        let stats: ByteStats = std::iter::repeat(1500).take(50).collect();
        assert_eq!(stats.mean().unwrap(), 1500.0);
        assert_eq!(stats.stddev().unwrap(), 0.0);
    }

    #[test]
    fn merge_matches_single_pass() {
        let values: Vec<u64> = (0..100).map(|i| i * 37 % 1009).collect();
        let whole: ByteStats = values.iter().copied().collect();

        let mut left: ByteStats = values[..40].iter().copied().collect();
        let right: ByteStats = values[40..].iter().copied().collect();
        left.merge(&right);

        let mut reversed = right;
        reversed.merge(&values[..40].iter().copied().collect());

        for merged in [left, reversed] {
            assert_eq!(merged.count(), whole.count());
            assert_eq!(merged.sum(), whole.sum());
            assert_eq!(merged.sum_of_squares(), whole.sum_of_squares());
            assert_eq!(merged.stddev().unwrap(), whole.stddev().unwrap());
        }
    }

    fn two_pass_stddev(values: &[u64]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let ss: f64 = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    }

    fn assert_close(actual: f64, expected: f64) {
        let rel = ((actual - expected) / expected).abs();
        assert!(rel < 1e-9, "{} vs {}", actual, expected);
    }

    #[test]
    fn huge_values_keep_their_spread() {
        let values = [u64::MAX, u64::MAX, 0];
        let stats: ByteStats = values.into_iter().collect();

        assert_eq!(stats.sum_of_squares(), None);
        let stddev = stats.stddev().unwrap();
        assert!(stddev > 1.0e19);
        assert_close(stddev, two_pass_stddev(&values));
    }

    #[test]
    fn long_range_values_keep_their_spread() {
        let big = i64::MAX as u64;
        let values = [big, big, big, big, big, 0];
        let stats: ByteStats = values.into_iter().collect();

        assert_eq!(stats.sum_of_squares(), None);
        assert_close(stats.stddev().unwrap(), two_pass_stddev(&values));
    }

    #[test]
    fn overflowing_partitions_merge_within_tolerance() {
        let big = i64::MAX as u64;
        let values: Vec<u64> = (0..60).map(|i| if i % 4 == 0 { 0 } else { big - i }).collect();
        let whole: ByteStats = values.iter().copied().collect();

        let mut merged = ByteStats::new();
        for chunk in values.chunks(7).rev() {
            merged.merge(&chunk.iter().copied().collect());
        }

        assert_eq!(merged.count(), whole.count());
        assert_eq!(merged.sum(), whole.sum());
        assert_eq!(merged.sum_of_squares(), None);
        assert_close(merged.stddev().unwrap(), whole.stddev().unwrap());
        assert_close(merged.stddev().unwrap(), two_pass_stddev(&values));
    }
}
