pub mod domain {
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    /// A flow row as it comes off the source, before null handling.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RawFlowRecord {
        pub timestamp: DateTime<Utc>,
        pub source_ip: String,
        pub destination_ip: String,
        pub port: Option<u16>,
        pub protocol: Option<String>,
        pub bytes_transferred: Option<u64>,
    }

    /// One observed network flow. Equality and hashing cover every field.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
    pub struct FlowRecord {
        pub timestamp: DateTime<Utc>,
        pub source_ip: String,
        pub destination_ip: String,
        pub port: u16,
        pub protocol: String,
        pub bytes_transferred: u64,
    }

    impl FlowRecord {
        pub fn new(
            timestamp: DateTime<Utc>,
            source_ip: &str,
            destination_ip: &str,
            port: u16,
            protocol: &str,
            bytes_transferred: u64,
        ) -> Self {
            FlowRecord {
                timestamp,
                source_ip: source_ip.to_string(),
                destination_ip: destination_ip.to_string(),
                port,
                protocol: protocol.to_string(),
                bytes_transferred,
            }
        }
    }

    impl From<FlowRecord> for RawFlowRecord {
        fn from(record: FlowRecord) -> Self {
            RawFlowRecord {
                timestamp: record.timestamp,
                source_ip: record.source_ip,
                destination_ip: record.destination_ip,
                port: Some(record.port),
                protocol: Some(record.protocol),
                bytes_transferred: Some(record.bytes_transferred),
            }
        }
    }
}

pub mod dto {
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    use super::domain::FlowRecord;
    use crate::detection::SuspiciousActivity;
    use crate::pipeline::AnalysisReport;

    #[derive(Debug, Serialize, Clone)]
    pub struct SourceVolumeDTO {
        pub source_ip: String,
        pub traffic_volume: u64,
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct ProtocolBytesDTO {
        pub protocol: String,
        pub total_bytes: u128,
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct TimeWindowDTO {
        pub window_start: DateTime<Utc>,
        pub window_end: DateTime<Utc>,
        pub traffic_count: u64,
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct ByteStatsDTO {
        pub mean: f64,
        pub stddev: f64,
        pub outlier_cutoff: f64,
    }

    #[derive(Debug, Serialize, Clone)]
    pub struct AnalysisReportDTO {
        pub cleaned_records: usize,
        pub avg_bytes_transferred: f64,
        pub traffic_volume_per_ip: Vec<SourceVolumeDTO>,
        pub bytes_per_protocol: Vec<ProtocolBytesDTO>,
        pub traffic_over_time: Vec<TimeWindowDTO>,
        pub byte_stats: ByteStatsDTO,
        pub suspicious_ips: Vec<SourceVolumeDTO>,
        pub outliers: Vec<FlowRecord>,
        pub findings: Vec<SuspiciousActivity>,
    }

    impl From<&AnalysisReport> for AnalysisReportDTO {
        fn from(report: &AnalysisReport) -> Self {
            let features = &report.features;

            AnalysisReportDTO {
                cleaned_records: report.cleaned_records,
                avg_bytes_transferred: report.byte_stats.mean,
                traffic_volume_per_ip: features
                    .sorted_volume_by_source()
                    .into_iter()
                    .map(|(source_ip, traffic_volume)| SourceVolumeDTO {
                        source_ip: source_ip.to_string(),
                        traffic_volume,
                    })
                    .collect(),
                bytes_per_protocol: features
                    .sorted_bytes_by_protocol()
                    .into_iter()
                    .map(|(protocol, total_bytes)| ProtocolBytesDTO {
                        protocol: protocol.to_string(),
                        total_bytes,
                    })
                    .collect(),
                traffic_over_time: features
                    .sorted_traffic_by_window()
                    .into_iter()
                    .map(|(window_start, traffic_count)| TimeWindowDTO {
                        window_start,
                        window_end: features.window_end(window_start),
                        traffic_count,
                    })
                    .collect(),
                byte_stats: ByteStatsDTO {
                    mean: report.byte_stats.mean,
                    stddev: report.byte_stats.stddev,
                    outlier_cutoff: report.byte_stats.cutoff,
                },
                suspicious_ips: report
                    .suspicious_sources
                    .iter()
                    .map(|source_ip| SourceVolumeDTO {
                        source_ip: source_ip.clone(),
                        traffic_volume: features.volume_of(source_ip),
                    })
                    .collect(),
                outliers: report.outliers.clone(),
                findings: report.findings.clone(),
            }
        }
    }
}
