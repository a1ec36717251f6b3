/// Result alias that carries the custom [`DealerError`] type.
pub type Result<T> = std::result::Result<T, DealerError>;

/// Common error type for the core crate.
///
/// Nothing in here ever stops the deal timeline: collaborator failures are
/// logged and downgraded by the component that observes them.
#[derive(Debug, thiserror::Error)]
pub enum DealerError {
    /// Free-form failure reported by a collaborator.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Raw announcement bytes could not be turned into playable audio.
    #[error("audio decode failed: {0}")]
    Decode(String),
    /// The remote announcement generator failed (network, quota, ...).
    #[error("announcement generation failed: {0}")]
    Generation(String),
    /// Timers need a tokio runtime to schedule on.
    #[error("no async runtime available: {0}")]
    Runtime(String),
    #[error("unknown language `{0}`")]
    UnknownLanguage(String),
}

impl DealerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn generation<T: Into<String>>(msg: T) -> Self {
        Self::Generation(msg.into())
    }
}

impl From<&str> for DealerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for DealerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<symphonia::core::errors::Error> for DealerError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
