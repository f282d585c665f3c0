//! Common error types for mauth

use thiserror::Error;

/// Common result type for mauth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the extractor, trainer and verification engine
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer usable labeled examples than training requires
    #[error("Insufficient training data: {found} usable examples, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    /// Model fitting failed numerically; no artifact was written
    #[error("Training failed: {0}")]
    TrainingFailed(String),

    /// Another training run holds the trainer lock
    #[error("Training already in progress")]
    TrainingInProgress,

    /// No valid model artifact is available
    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    /// Malformed trace or missing required field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
