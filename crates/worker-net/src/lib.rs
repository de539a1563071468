//! Per-worker network services that sit alongside the HTTP/1.1 channel:
//! DNS lookup coalescing, process-wide Unix signal delivery, and the TLS
//! record-transport contract.

mod error;
mod host_fetcher;
mod invariants;
mod signal_listener;
mod tls_source;

pub use error::NetError;
pub use host_fetcher::{add_host_lookup, install, on_host_resolved, remove_host_lookup, HostAddressFetcher, LookupOutcome, ReceiverId};
pub use signal_listener::UnixSignalListener;
pub use tls_source::{TlsEngine, TlsSocketDataSource};
