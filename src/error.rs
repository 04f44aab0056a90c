//! Error types for Lumen

use thiserror::Error;

/// Result type alias for Lumen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Lumen
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration (e.g. no API key)
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Microphone permission refused or no capture device
    #[error("microphone access denied: {0}")]
    MicAccessDenied(String),

    /// Transport or API failure on a one-shot request
    #[error("backend error: {0}")]
    Backend(String),

    /// Live session failure
    #[error("session error: {0}")]
    Session(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Remote tool call with an unknown name or invalid arguments
    #[error("invalid tool call: {0}")]
    InvalidToolCall(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Session(err.to_string())
    }
}
