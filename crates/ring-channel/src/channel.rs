//! Buffered I/O channel mediating between ring buffers and an opaque
//! transport, with edge-triggered read/write readiness notification.
//!
//! The channel never blocks and never runs concurrently with itself: the
//! owning reactor (out of scope here) guarantees that `read_from_channel`,
//! `write_to_channel`, and every buffer-facing method are called from one
//! worker thread, one at a time.

use crate::error::ChannelError;
use crate::invariants::{
    debug_assert_read_notification_matches_fullness, debug_assert_write_notification_matches_emptiness,
};
use crate::ring_buffer::RingBuffer;

/// The readable side of a transport (TCP socket, TLS record layer, ...).
pub trait DataSource {
    /// Bytes currently available to read without blocking.
    fn data_available(&self) -> usize;
    /// Reads up to `buf.len()` bytes. Returns `0` when nothing is
    /// currently available; never blocks.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError>;
}

/// The writable side of a transport.
pub trait DataSink {
    /// Writes up to `data.len()` bytes, returning how many were accepted
    /// without blocking.
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError>;
}

/// Callback boundary the reactor implements to arm/disarm the underlying
/// readiness source whenever a notification flag transitions.
pub trait NotificationSink {
    fn on_read_notification_changed(&mut self, enabled: bool);
    fn on_write_notification_changed(&mut self, enabled: bool);
}

/// Buffered channel over one `DataSource`/`DataSink` pair.
pub struct IOChannel<D, K, N> {
    read_buffer: RingBuffer,
    write_buffer: RingBuffer,
    read_notification_enabled: bool,
    write_notification_enabled: bool,
    source: D,
    sink: K,
    notify: N,
}

impl<D, K, N> IOChannel<D, K, N>
where
    D: DataSource,
    K: DataSink,
    N: NotificationSink,
{
    pub fn new(source: D, sink: K, notify: N) -> Self {
        Self {
            read_buffer: RingBuffer::new(0),
            write_buffer: RingBuffer::new(0),
            read_notification_enabled: true,
            write_notification_enabled: true,
            source,
            sink,
            notify,
        }
    }

    pub fn data_available(&self) -> usize {
        self.read_buffer.size()
    }

    pub fn data_to_write(&self) -> usize {
        self.write_buffer.size()
    }

    pub fn peek_char(&self, index: usize) -> u8 {
        self.read_buffer.peek_char(index)
    }

    pub fn slice_with<R>(&mut self, pos: usize, count: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        self.read_buffer.slice_with(pos, count, f)
    }

    pub fn peek_all_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.read_buffer.peek_all_with(f)
    }

    /// Reads and consumes the whole read buffer. Re-enables read
    /// notification if the buffer was full.
    pub fn read_all_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        let was_full = self.read_buffer.is_full();
        let result = self.read_buffer.read_all_with(f);
        if was_full {
            self.set_read_notification_enabled(true);
        }
        result
    }

    pub fn skip(&mut self, max_size: usize) -> usize {
        let was_full = self.read_buffer.is_full();
        let popped = self.read_buffer.pop_front(max_size);
        self.set_read_notification_enabled(popped > 0 || !was_full);
        popped
    }

    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let was_full = self.read_buffer.is_full();
        let n = self.read_buffer.read_into(buf);
        self.set_read_notification_enabled(n > 0 || !was_full);
        n
    }

    pub(crate) fn load32(&self, index: usize) -> [u8; 32] {
        self.read_buffer.load32(index)
    }

    /// Never partially accepts: pushes straight to the sink when the write
    /// buffer is empty, buffering any remainder.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut sent = 0;
        if self.write_buffer.is_empty() {
            sent = self.sink.write(data)?;
        }
        if sent < data.len() {
            self.write_buffer.write(&data[sent..]);
        }
        self.set_write_notification_enabled(!self.write_buffer.is_empty());
        Ok(data.len())
    }

    pub fn read_buffer_capacity(&self) -> usize {
        self.read_buffer.capacity()
    }

    pub fn set_read_buffer_capacity(&mut self, capacity: usize) -> bool {
        self.read_buffer.set_capacity(capacity)
    }

    pub fn clear(&mut self) {
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.set_read_notification_enabled(true);
        self.set_write_notification_enabled(true);
    }

    pub fn reset(&mut self) -> bool {
        self.read_buffer.reset() && self.write_buffer.reset()
    }

    /// Pulls from the `DataSource` into the read buffer. Disables read
    /// notification iff the read buffer becomes full as a result. Returns
    /// how many bytes were actually pulled.
    pub fn read_from_channel(&mut self) -> Result<usize, ChannelError> {
        let available = self.source.data_available();
        if available == 0 {
            return Ok(0);
        }
        let mut staging = vec![0u8; available];
        let n = self.source.read(&mut staging)?;
        let written = self.read_buffer.write(&staging[..n]);
        if written > 0 {
            self.set_read_notification_enabled(!self.read_buffer.is_full());
        }
        Ok(written)
    }

    /// Drains the write buffer into the `DataSink`. Disables write
    /// notification iff the write buffer becomes empty as a result.
    pub fn write_to_channel(&mut self) -> Result<usize, ChannelError> {
        if self.write_buffer.is_empty() {
            return Ok(0);
        }
        let staged = self.write_buffer.peek_all();
        let n = self.sink.write(&staged)?;
        self.write_buffer.pop_front(n);
        self.set_write_notification_enabled(!self.write_buffer.is_empty());
        Ok(n)
    }

    fn set_read_notification_enabled(&mut self, enabled: bool) {
        if self.read_notification_enabled != enabled {
            self.read_notification_enabled = enabled;
            tracing::trace!(enabled, "read notification transitioned");
            self.notify.on_read_notification_changed(enabled);
        }
        debug_assert_read_notification_matches_fullness!(
            self.read_notification_enabled,
            self.read_buffer.is_full()
        );
    }

    fn set_write_notification_enabled(&mut self, enabled: bool) {
        if self.write_notification_enabled != enabled {
            self.write_notification_enabled = enabled;
            tracing::trace!(enabled, "write notification transitioned");
            self.notify.on_write_notification_changed(enabled);
        }
        debug_assert_write_notification_matches_emptiness!(
            self.write_notification_enabled,
            self.write_buffer.is_empty()
        );
    }

    pub fn is_read_notification_enabled(&self) -> bool {
        self.read_notification_enabled
    }

    pub fn is_write_notification_enabled(&self) -> bool {
        self.write_notification_enabled
    }
}
