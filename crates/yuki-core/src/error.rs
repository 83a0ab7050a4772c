//! Error types for the Yuki turn pipeline

use thiserror::Error;

/// Result type alias for Yuki operations
pub type YukiResult<T> = Result<T, YukiError>;

/// Errors raised by the backends and the configuration layer.
///
/// None of these reach the HTTP layer during a turn: the chat adapter and the
/// audio pipeline translate them into degraded replies.
#[derive(Error, Debug)]
pub enum YukiError {
    /// Chat backend unreachable, timed out, or answered with a non-success status.
    #[error("Chat transport error: {0}")]
    ChatTransport(String),

    /// Chat backend answered but the body could not be understood.
    #[error("Chat response parse error: {0}")]
    ChatParse(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Voice conversion error: {0}")]
    Conversion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for YukiError {
    fn from(err: config::ConfigError) -> Self {
        YukiError::Config(err.to_string())
    }
}

impl YukiError {
    /// True for failures of the chat transport (network, timeout, HTTP status).
    pub fn is_transport(&self) -> bool {
        matches!(self, YukiError::ChatTransport(_))
    }
}
