//! Core error types for the audio bridge
use thiserror::Error;

/// Result type alias using `BridgeError`
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Core error type for the audio bridge
///
/// Nothing on the audio path returns this to the SDK: frame callbacks log and
/// continue. It is used by listeners to report a failed frame and by the
/// control surface (configuration, tag lookup, shared-instance install).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A processor could not handle a frame
    #[error("Processor '{name}' failed: {message}")]
    Processor {
        /// Processor name
        name: String,
        /// What went wrong
        message: String,
    },

    /// Audio format the pipeline cannot work with
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared pipeline manager was already created
    #[error("Shared pipeline manager is already initialized")]
    AlreadyInitialized,

    /// No renderer is registered under the given tag
    #[error("No audio renderer registered for tag: {0}")]
    UnknownRenderer(String),

    /// Serialization errors
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl BridgeError {
    /// Create a processor failure
    pub fn processor(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid format error
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
