use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("accelerator error in {op}: {message}")]
    Resource { op: String, message: String },

    #[error("communication error: {0}")]
    Comm(String),

    #[error("no replay entry for ordering: {0}")]
    ReplayMiss(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl CoreError {
    /// Accelerator runtime failure attributed to the operation `op`.
    pub fn resource(op: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Resource { op: op.into(), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
