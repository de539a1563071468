//! Contiguous ring buffer and buffered I/O channel used as the read/write
//! staging layer beneath the HTTP request parser.
//!
//! `RingBuffer` linearizes lazily: most reads are served as a borrow of
//! already-contiguous memory, and a wrapped read only pays for copying
//! when the caller actually needs contiguous bytes across the wrap.
//! `IOChannel` layers edge-triggered read/write readiness notification
//! on top of a pair of ring buffers, generic over the transport so TCP,
//! TLS, and test doubles all plug in the same way.

mod channel;
mod error;
mod invariants;
mod ring_buffer;
mod simd;

pub use channel::{DataSink, DataSource, IOChannel, NotificationSink};
pub use error::ChannelError;
pub use ring_buffer::{RingBuffer, DEFAULT_CAPACITY};
pub use simd::{find_first_byte, find_first_non_field_char, find_first_non_hex_digit, SimdIterator, Window32Source};
