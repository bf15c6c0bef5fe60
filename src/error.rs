use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("unreadable image: {0}")]
    UnreadableImage(PathBuf),
    #[error("cannot open stream: {0}")]
    StreamOpen(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("processing failed: {0}")]
    Processing(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("detector is busy with another invocation")]
    Busy,
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("inference error: {0}")]
    Inference(#[from] ort::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
