use thiserror::Error;

/// Errors the parser can terminate a connection with. Both are terminal:
/// once returned, further `parse()` calls return `Failed` without progress.
#[derive(Debug, Clone, Error)]
pub enum ParserError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("request exceeded configured limit: {0}")]
    TooBigRequest(String),
}

impl ParserError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ParserError::MalformedRequest(msg.into())
    }

    pub(crate) fn too_big(msg: impl Into<String>) -> Self {
        ParserError::TooBigRequest(msg.into())
    }

    pub fn is_terminal(&self) -> bool {
        true
    }

    /// Neither variant is recoverable; both end the connection. Mirrors the
    /// `is_recoverable`/`is_terminal` pair used at the channel boundary so
    /// callers can branch on severity the same way regardless of which
    /// layer raised the error.
    pub fn is_recoverable(&self) -> bool {
        false
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ParserError::MalformedRequest(_) => 400,
            ParserError::TooBigRequest(_) => 413,
        }
    }
}

/// Validation failure for a single `HttpServerOptions` entry. The option's
/// stored value is left unchanged whenever this is returned.
#[derive(Debug, Error)]
pub enum ServerOptionError {
    #[error("{option} must be non-negative")]
    Negative { option: &'static str },
    #[error("{option} must be at most {max}")]
    AboveMaximum { option: &'static str, max: i64 },
    #[error("{option} must be at least {min}")]
    BelowMinimum { option: &'static str, min: i64 },
}
