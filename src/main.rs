use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowwatch::models::dto::AnalysisReportDTO;
use flowwatch::{AnalysisReport, Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Flag flooding sources and byte-count outliers in a flow log.
#[derive(Debug, Parser)]
#[command(name = "flowwatch", version, about)]
struct Cli {
    /// CSV flow log: timestamp,source_ip,destination_ip,port,protocol,bytes_transferred
    input: PathBuf,

    /// Protocol dropped before analysis ("" keeps everything)
    #[arg(long)]
    excluded_protocol: Option<String>,

    /// Flag sources with more flows than this
    #[arg(short = 't', long)]
    volume_threshold: Option<u64>,

    /// Standard deviations from the mean before a flow is an outlier
    #[arg(short = 'k', long)]
    outlier_multiplier: Option<f64>,

    /// Time window size in seconds
    #[arg(long)]
    window_secs: Option<i64>,

    /// Aggregation worker threads
    #[arg(short, long)]
    partitions: Option<usize>,

    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::from_env();
        if let Some(protocol) = &self.excluded_protocol {
            config.excluded_protocol = protocol.clone();
        }
        if let Some(threshold) = self.volume_threshold {
            config.volume_threshold = threshold;
        }
        if let Some(k) = self.outlier_multiplier {
            config.outlier_stddev_multiplier = k;
        }
        if let Some(secs) = self.window_secs {
            config.time_window_secs = secs;
        }
        if let Some(partitions) = self.partitions {
            config.partitions = partitions;
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = cli.config();
    let pipeline = Pipeline::new(&config).context("configuration")?;
    let report = pipeline
        .run_file(&cli.input)
        .with_context(|| format!("analysis of {} failed", cli.input.display()))?;

    match cli.format {
        OutputFormat::Table => print_report(&report),
        OutputFormat::Json => {
            let dto = AnalysisReportDTO::from(&report);
            println!("{}", serde_json::to_string_pretty(&dto)?);
        }
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let features = &report.features;

    println!("Cleaned flow records: {}", report.cleaned_records);

    println!("\nTraffic volume per source IP:");
    for (source, volume) in features.sorted_volume_by_source() {
        println!("  {:<40} {:>10}", source, volume);
    }

    println!("\nTotal bytes per protocol:");
    for (protocol, bytes) in features.sorted_bytes_by_protocol() {
        println!("  {:<40} {:>10}", protocol, bytes);
    }

    println!("\nAverage bytes transferred: {:.2}", report.byte_stats.mean);

    println!("\nTraffic over time:");
    for (start, count) in features.sorted_traffic_by_window() {
        println!("  {} .. {} {:>10}", start, features.window_end(start), count);
    }

    println!("\nSuspicious IPs:");
    if report.suspicious_sources.is_empty() {
        println!("  none");
    }
    for source in &report.suspicious_sources {
        println!("  {:<40} {:>10}", source, features.volume_of(source));
    }

    println!(
        "\nByte outliers (mean {:.2}, stddev {:.2}, cutoff +/-{:.2}):",
        report.byte_stats.mean, report.byte_stats.stddev, report.byte_stats.cutoff
    );
    if report.outliers.is_empty() {
        println!("  none");
    }
    for record in &report.outliers {
        println!(
            "  {} {} -> {}:{} {} {} bytes",
            record.timestamp,
            record.source_ip,
            record.destination_ip,
            record.port,
            record.protocol,
            record.bytes_transferred
        );
    }
}
