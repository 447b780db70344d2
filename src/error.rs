//! Error types for streamscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribeError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Lifecycle errors
    #[error("Invalid lifecycle operation: {message}")]
    Lifecycle { message: String },

    // Ingestion errors (capture/read source or queue hand-off failures)
    #[error("Ingestion failed: {message}")]
    Ingestion { message: String },

    // Transcription engine errors
    #[error("Transcription engine failed: {message}")]
    Engine { message: String },

    // Batch job conflicts
    #[error("Batch transcriber busy: {message}")]
    Busy { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ScribeError>;
