use crate::imaging::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The pipeline was described incorrectly: missing source, missing
    /// dimensions, rejected operation name, invalid placement arguments.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Propagated unchanged from the image engine.
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
