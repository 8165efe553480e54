use thiserror::Error;

/// Errors that can occur while producing or consuming the relay stream format
#[derive(Debug, Error)]
pub enum WireError {
    /// The underlying byte source failed mid-stream
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A complete stream line was not valid UTF-8
    #[error("invalid UTF-8 in stream line: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Serializing an outgoing frame payload failed
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WireError {
    /// Wrap an arbitrary byte-source error
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}
