//! Error types for agentwire.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Insufficient examples: {0}")]
    InsufficientExamples(String),

    #[error("Translation validation failed: {0}")]
    TranslationValidation(String),

    #[error("Reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    #[error("Model error: {0}")]
    Model(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(s: impl Into<String>) -> Self {
        Error::Other(s.into())
    }
}
