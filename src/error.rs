//! Error types for the voxroute router

use thiserror::Error;

/// Result type alias for voxroute operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside voxroute clients
///
/// The routing pipeline itself never surfaces these to callers; each
/// stage converts them into a user-facing fallback string.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Classification backend error
    #[error("classification error: {0}")]
    Classification(String),

    /// Handler execution error
    #[error("handler error: {0}")]
    Handler(String),

    /// Remote call exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Audio file error
    #[error("audio error: {0}")]
    Audio(#[from] hound::Error),
}
