use thiserror::Error;

/// Errors surfaced at the channel boundary. The parser and buffer layers
/// never produce these directly; they bubble up from the transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("transport read failed: {0}")]
    ReadFailed(String),
    #[error("transport write failed: {0}")]
    WriteFailed(String),
    #[error("transport closed by peer")]
    Closed,
}

impl ChannelError {
    /// Whether the connection can keep running after this error (it
    /// cannot — every channel-level failure is terminal for the
    /// connection, unlike parser errors which distinguish the two).
    pub fn is_terminal(&self) -> bool {
        true
    }
}
