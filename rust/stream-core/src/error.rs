// rust/stream-core/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {

    #[error("Transport error at '{address}': {message}")]
    Transport {
        address: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Decode error: {message}")]
    Decode {
        message: String,
    },

    #[error("Encode error: {message}")]
    Encode {
        message: String,
    },

    #[error("Protocol violation: {message}")]
    ProtocolViolation {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Stream was cancelled before it finished")]
    Cancelled,

    #[error("Prefetch worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, StreamError>;

// Convenience constructors
impl StreamError {

    pub fn transport(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            address: address.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn transport_with_source(
        address: impl Into<String>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Transport {
            address: address.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the error means the remote stream can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Decode { .. } | Self::ProtocolViolation { .. }
        )
    }
}
