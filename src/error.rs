use thiserror::Error;

use burn::record::RecorderError;

/// Errors raised while configuring, training or persisting a subset policy.
#[derive(Debug, Error)]
pub enum SubsetError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("set size {set_size} does not fit in a universe of {universe} integers")]
    SetTooLarge { set_size: usize, universe: usize },
    #[error("batch of {instances} instances does not match {values} action values")]
    ShapeMismatch { instances: usize, values: usize },
    #[error("tensor data conversion failed: {0}")]
    Tensor(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checkpoint encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("checkpoint decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("model record error: {0}")]
    Record(#[from] RecorderError),
    #[error("chart rendering failed: {0}")]
    Chart(String),
}
