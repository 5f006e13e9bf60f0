use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A row of the input does not match the flow record schema.
    #[error("input schema error at line {line}: {reason}")]
    InputSchema { line: usize, reason: String },

    /// Mean and standard deviation have no value without records.
    #[error("no data: {stage} needs at least one cleaned flow record")]
    EmptyDataset { stage: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn schema(line: usize, reason: impl Into<String>) -> Self {
        PipelineError::InputSchema {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
