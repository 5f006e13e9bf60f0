pub mod config;
pub mod detection;
pub mod error;
pub mod features;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod preprocess;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use models::domain::{FlowRecord, RawFlowRecord};
pub use pipeline::{AnalysisReport, Pipeline};
