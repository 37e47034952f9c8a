use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Wire-level error classification sent to clients before the connection
/// closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidInitConfig,
    UnsupportedFeature,
    UnsupportedLexicon,
    BufferOverflow,
    ProtocolError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInitConfig => "invalid_init_config",
            ErrorCode::UnsupportedFeature => "unsupported_feature",
            ErrorCode::UnsupportedLexicon => "unsupported_lexicon",
            ErrorCode::BufferOverflow => "buffer_overflow",
            ErrorCode::ProtocolError => "protocol_error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal, client-facing error: sent at most once per connection, always
/// followed by closure.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct ProxyError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProxyError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProtocolError, message)
    }
}
