use thiserror::Error;

/// Errors surfaced by the worker-local network services. Every variant
/// here is a fatal condition per spec.md §7 — the caller is expected to
/// abort the process with the diagnostic, not retry.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("signalfd creation failed: {0}")]
    SignalFdCreationFailed(std::io::Error),

    #[error("sigprocmask failed: {0}")]
    SigprocmaskFailed(std::io::Error),

    #[error("a UnixSignalListener already exists in this process")]
    SingletonAlreadyConstructed,

    #[error("signal {0} was requested but is not in the listener's registered set")]
    UnregisteredSignal(i32),

    #[error("reading pending signalfd records failed: {0}")]
    SignalReadFailed(std::io::Error),

    #[error("signalfd is not available on this platform")]
    UnsupportedPlatform,
}

impl NetError {
    /// Every `NetError` is an internal fatal condition per spec.md §7;
    /// none of them are recoverable.
    pub fn is_recoverable(&self) -> bool {
        false
    }

    pub fn is_terminal(&self) -> bool {
        true
    }
}
