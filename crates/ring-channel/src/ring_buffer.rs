//! Single-producer single-consumer byte queue with lazy linearization.
//!
//! The buffer is one allocation split into two logical blocks: a "right"
//! block running from a read cursor toward the physical end, and a "left"
//! block wrapped at the physical start. The left block is only ever
//! nonzero once the right block has reached the physical end — see
//! INV-RING-02 in `invariants.rs`.

use std::cell::RefCell;

use crate::invariants::{
    debug_assert_empty_cursor_reset, debug_assert_left_block_only_after_wrap,
    debug_assert_size_within_capacity, debug_assert_within_hard_cap,
};

/// Bytes reserved past `capacity` in the backing allocation. Large enough
/// that a 32-byte vectorized load starting anywhere in `0..=size` never
/// reads past the allocation, with headroom for alignment.
const RESERVED_TAIL: usize = 64;

/// Width of the tail mirror: a 32-byte window is the largest unit the
/// parser's classifier ever loads in one shot.
const MIRROR_WIDTH: usize = 32;

/// Initial and post-`clear` capacity.
pub const DEFAULT_CAPACITY: usize = 128;

thread_local! {
    /// Reused scratch for linearizing wrapped reads, shared by every ring
    /// buffer on this thread. Grown monotonically, never shrunk.
    static SCRATCH: RefCell<Vec<u8>> = RefCell::new(Vec::new());
}

/// An ordered byte queue with capacity policy and zero-copy linear slicing.
///
/// Not `Send`/`Sync` by design: a channel's buffers are only ever touched
/// by the one worker thread that owns the connection.
pub struct RingBuffer {
    buf: Vec<u8>,
    /// Current allocation size, excluding `RESERVED_TAIL`.
    capacity: usize,
    /// Configured hard cap; 0 means unbounded.
    hard_cap: usize,
    cursor: usize,
    right_len: usize,
    left_len: usize,
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RingBuffer {
    /// Creates a buffer with the given hard cap (0 = unbounded).
    pub fn new(hard_cap: usize) -> Self {
        let capacity = if hard_cap != 0 {
            hard_cap.min(DEFAULT_CAPACITY)
        } else {
            DEFAULT_CAPACITY
        };
        let mut ring = Self {
            buf: vec![0u8; capacity + RESERVED_TAIL],
            capacity,
            hard_cap,
            cursor: 0,
            right_len: 0,
            left_len: 0,
        };
        ring.refresh_tail_mirror();
        ring
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.right_len + self.left_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size() == self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    #[inline]
    fn free_space(&self) -> usize {
        self.capacity - self.size()
    }

    /// Appends as many bytes as the cap allows, growing first if needed.
    /// Returns the number of bytes actually written; only less than
    /// `bytes.len()` when the hard cap is reached.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        if self.free_space() < bytes.len() {
            self.grow_for(bytes.len());
        }
        let n = bytes.len().min(self.free_space());
        let mut written = 0;
        if self.left_len == 0 {
            let tail_start = self.cursor + self.right_len;
            let tail_free = self.capacity - tail_start;
            let take = (n - written).min(tail_free);
            self.buf[tail_start..tail_start + take].copy_from_slice(&bytes[written..written + take]);
            self.right_len += take;
            written += take;
        }
        if written < n {
            let front_free = self.cursor - self.left_len;
            let take = (n - written).min(front_free);
            self.buf[self.left_len..self.left_len + take]
                .copy_from_slice(&bytes[written..written + take]);
            self.left_len += take;
            written += take;
        }
        self.refresh_tail_mirror();
        self.check_invariants();
        written
    }

    /// Dequeues up to `dst.len()` bytes, advancing the read cursor.
    pub fn read_into(&mut self, dst: &mut [u8]) -> usize {
        let n = self.take(dst.len(), |chunk, offset| {
            dst[offset..offset + chunk.len()].copy_from_slice(chunk);
        });
        n
    }

    /// Drops up to `n` bytes from the front without copying them anywhere.
    pub fn pop_front(&mut self, n: usize) -> usize {
        self.take(n, |_, _| {})
    }

    /// Visits up to `max` bytes from the front, removing them, invoking
    /// `on_chunk(bytes, offset_into_logical_output)` once per contiguous
    /// segment (at most twice: the remaining right block, then the
    /// rotated-in left block).
    fn take(&mut self, max: usize, mut on_chunk: impl FnMut(&[u8], usize)) -> usize {
        let mut remaining = max.min(self.size());
        let mut total = 0;
        if remaining > 0 && self.right_len > 0 {
            let take_n = remaining.min(self.right_len);
            on_chunk(&self.buf[self.cursor..self.cursor + take_n], total);
            self.cursor += take_n;
            self.right_len -= take_n;
            remaining -= take_n;
            total += take_n;
        }
        if self.right_len == 0 && self.left_len > 0 {
            self.cursor = 0;
            self.right_len = self.left_len;
            self.left_len = 0;
        }
        if remaining > 0 && self.right_len > 0 {
            let take_n = remaining.min(self.right_len);
            on_chunk(&self.buf[self.cursor..self.cursor + take_n], total);
            self.cursor += take_n;
            self.right_len -= take_n;
            total += take_n;
        }
        if self.size() == 0 {
            self.cursor = 0;
        }
        self.refresh_tail_mirror();
        self.check_invariants();
        total
    }

    /// O(1) byte access with wrap logic. Panics if `i >= size()`.
    pub fn peek_char(&self, i: usize) -> u8 {
        debug_assert!(i < self.size());
        if i < self.right_len {
            self.buf[self.cursor + i]
        } else {
            self.buf[i - self.right_len]
        }
    }

    /// Copies `count` logical bytes starting at `pos` into `dst`.
    fn copy_logical_range(&self, pos: usize, count: usize, dst: &mut [u8]) {
        let mut written = 0;
        if pos < self.right_len {
            let take = count.min(self.right_len - pos);
            dst[..take].copy_from_slice(&self.buf[self.cursor + pos..self.cursor + pos + take]);
            written += take;
        }
        if written < count {
            let left_pos = if pos > self.right_len { pos - self.right_len } else { 0 };
            let take = count - written;
            dst[written..written + take].copy_from_slice(&self.buf[left_pos..left_pos + take]);
        }
    }

    /// Invokes `f` with a contiguous view of `count` bytes starting at
    /// logical position `pos`. Zero-copy when the range sits entirely in
    /// one block; otherwise linearizes through the thread-local scratch,
    /// falling back to making this buffer's own storage contiguous if the
    /// scratch is already borrowed by a reentrant call on this thread.
    pub fn slice_with<R>(&mut self, pos: usize, count: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        debug_assert!(pos + count <= self.size());
        if count == 0 {
            return f(&[]);
        }
        if pos + count <= self.right_len {
            return f(&self.buf[self.cursor + pos..self.cursor + pos + count]);
        }
        if pos >= self.right_len {
            let left_pos = pos - self.right_len;
            return f(&self.buf[left_pos..left_pos + count]);
        }
        self.linearized(pos, count, f)
    }

    fn linearized<R>(&mut self, pos: usize, count: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        let result = SCRATCH.with(|cell| match cell.try_borrow_mut() {
            Ok(mut scratch) => {
                if scratch.len() < count {
                    scratch.resize(count.max(4096), 0);
                }
                self.copy_logical_range(pos, count, &mut scratch[..count]);
                Ok(f(&scratch[..count]))
            }
            Err(_) => Err(()),
        });
        match result {
            Ok(r) => r,
            Err(()) => {
                // Reentrant call on this thread already holds the scratch;
                // straighten this buffer's own storage instead.
                self.linearize_in_place();
                f(&self.buf[pos..pos + count])
            }
        }
    }

    /// Returns the full contents as a single contiguous view, without
    /// consuming them.
    pub fn peek_all_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        let size = self.size();
        self.slice_with(0, size, f)
    }

    /// Returns the full contents as a single contiguous view and consumes
    /// them (cursor resets to the physical start).
    pub fn read_all_with<R>(&mut self, f: impl FnOnce(&[u8]) -> R) -> R {
        let result = self.peek_all_with(f);
        self.cursor = 0;
        self.right_len = 0;
        self.left_len = 0;
        self.refresh_tail_mirror();
        result
    }

    /// Convenience allocating wrapper over [`peek_all_with`].
    pub fn peek_all(&mut self) -> Vec<u8> {
        self.peek_all_with(<[u8]>::to_vec)
    }

    /// Convenience allocating wrapper over [`read_all_with`].
    pub fn read_all(&mut self) -> Vec<u8> {
        self.read_all_with(<[u8]>::to_vec)
    }

    /// `cap = 0` removes the hard cap; `cap >= capacity()` just records the
    /// new cap; otherwise succeeds only if `cap >= size()`, shrinking the
    /// allocation and linearizing.
    pub fn set_capacity(&mut self, cap: usize) -> bool {
        if cap == 0 {
            self.hard_cap = 0;
            return true;
        }
        if cap >= self.capacity {
            self.hard_cap = cap;
            return true;
        }
        let size = self.size();
        if cap < size {
            return false;
        }
        let new_capacity = cap.min(DEFAULT_CAPACITY.max(size.next_power_of_two()));
        self.hard_cap = cap;
        self.reallocate(new_capacity);
        true
    }

    /// Empties the buffer unconditionally; shrinks back to
    /// [`DEFAULT_CAPACITY`] if it had grown beyond it. The hard cap is
    /// preserved.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.right_len = 0;
        self.left_len = 0;
        if self.capacity > DEFAULT_CAPACITY {
            self.reallocate(DEFAULT_CAPACITY);
        } else {
            self.refresh_tail_mirror();
        }
    }

    /// Equivalent to [`clear`](Self::clear), but only when already empty.
    pub fn reset(&mut self) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.clear();
        true
    }

    fn grow_for(&mut self, incoming: usize) {
        let shortfall = incoming.saturating_sub(self.free_space());
        if shortfall == 0 {
            return;
        }
        let bound = if self.hard_cap != 0 { self.hard_cap } else { usize::MAX };
        let needed = self.capacity.saturating_add(shortfall);
        let new_capacity = bound.min(needed.next_power_of_two());
        if new_capacity > self.capacity {
            self.reallocate(new_capacity);
        }
    }

    /// Reallocates to `new_capacity`, copying the right block then the left
    /// block starting at physical offset 0 (cursor resets to 0).
    fn reallocate(&mut self, new_capacity: usize) {
        let size = self.size();
        let mut new_buf = vec![0u8; new_capacity + RESERVED_TAIL];
        let mut written = 0;
        if self.right_len > 0 {
            new_buf[..self.right_len].copy_from_slice(&self.buf[self.cursor..self.cursor + self.right_len]);
            written += self.right_len;
        }
        if self.left_len > 0 {
            new_buf[written..written + self.left_len].copy_from_slice(&self.buf[..self.left_len]);
        }
        self.buf = new_buf;
        self.capacity = new_capacity;
        self.cursor = 0;
        self.right_len = size;
        self.left_len = 0;
        self.refresh_tail_mirror();
    }

    /// Straightens this buffer's own storage into one contiguous region of
    /// the same capacity, used when the thread-local scratch is
    /// unavailable for linearization.
    fn linearize_in_place(&mut self) {
        let capacity = self.capacity;
        self.reallocate(capacity);
    }

    /// Mirrors the first [`MIRROR_WIDTH`] physical bytes into the reserved
    /// tail so a 32-byte load starting near the right-block boundary reads
    /// the left block's real leading bytes instead of uninitialized slack.
    fn refresh_tail_mirror(&mut self) {
        let n = MIRROR_WIDTH.min(self.capacity);
        let (head, tail) = self.buf.split_at_mut(self.capacity);
        tail[..n].copy_from_slice(&head[..n]);
    }

    /// Loads 32 consecutive bytes of the logical stream starting at
    /// `index`, for the SIMD classifier. Legal for any `index <= size()`.
    pub(crate) fn load32(&self, index: usize) -> [u8; 32] {
        debug_assert!(index <= self.size());
        let mut out = [0u8; 32];
        let start = if index < self.right_len {
            self.cursor + index
        } else {
            index - self.right_len
        };
        let n = MIRROR_WIDTH.min(self.buf.len() - start);
        out[..n].copy_from_slice(&self.buf[start..start + n]);
        out
    }

    fn check_invariants(&self) {
        debug_assert_size_within_capacity!(self.size(), self.capacity);
        debug_assert_left_block_only_after_wrap!(self.left_len, self.cursor, self.right_len, self.capacity);
        debug_assert_empty_cursor_reset!(self.size(), self.cursor);
        debug_assert_within_hard_cap!(self.capacity, self.hard_cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(bytes: &[u8]) -> RingBuffer {
        let mut rb = RingBuffer::new(0);
        assert_eq!(rb.write(bytes), bytes.len());
        rb
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut rb = filled(b"hello world");
        let mut out = [0u8; 11];
        assert_eq!(rb.read_into(&mut out), 11);
        assert_eq!(&out, b"hello world");
        assert!(rb.is_empty());
    }

    #[test]
    fn wrap_around_keeps_fifo_order() {
        let mut rb = RingBuffer::new(0);
        rb.write(&[0u8; 100]);
        let mut sink = [0u8; 100];
        rb.read_into(&mut sink);
        assert!(rb.is_empty());
        // cursor is back at 0; next write/read pair should wrap once
        // capacity (128) is exceeded.
        rb.write(&vec![1u8; 120]);
        rb.write(&vec![2u8; 20]);
        let mut out = vec![0u8; 140];
        assert_eq!(rb.read_into(&mut out), 140);
        assert!(out[..120].iter().all(|&b| b == 1));
        assert!(out[120..].iter().all(|&b| b == 2));
    }

    #[test]
    fn peek_char_matches_peek_all() {
        let mut rb = filled(b"abcdef");
        let all = rb.peek_all();
        for (i, &b) in all.iter().enumerate() {
            assert_eq!(rb.peek_char(i), b);
        }
    }

    #[test]
    fn slice_spanning_wrap_is_contiguous() {
        let mut rb = RingBuffer::new(0);
        rb.write(&vec![0xAAu8; DEFAULT_CAPACITY]);
        let mut drop_buf = vec![0u8; DEFAULT_CAPACITY - 4];
        rb.read_into(&mut drop_buf); // leaves 4 bytes in the right block, cursor at the physical end
        rb.write(b"0123456789"); // wraps 10 bytes into the left block
        let got = rb.slice_with(0, 14, <[u8]>::to_vec);
        assert_eq!(&got[..4], &[0xAA; 4]);
        assert_eq!(&got[4..], b"0123456789");
    }

    #[test]
    fn set_capacity_zero_removes_cap() {
        let mut rb = RingBuffer::new(16);
        assert!(rb.set_capacity(0));
        assert_eq!(rb.hard_cap(), 0);
    }

    #[test]
    fn set_capacity_below_size_fails() {
        let mut rb = filled(b"0123456789");
        assert!(!rb.set_capacity(5));
        assert_eq!(rb.size(), 10);
    }

    #[test]
    fn reset_only_succeeds_when_empty() {
        let mut rb = filled(b"x");
        assert!(!rb.reset());
        let mut sink = [0u8; 1];
        rb.read_into(&mut sink);
        assert!(rb.reset());
        assert_eq!(rb.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn write_truncates_at_hard_cap() {
        let mut rb = RingBuffer::new(8);
        let written = rb.write(b"0123456789");
        assert_eq!(written, 8);
        assert!(rb.is_full());
    }

    #[test]
    fn load32_overreads_into_mirrored_left_block() {
        let mut rb = RingBuffer::new(0);
        // Force the right block to reach the physical end, then wrap a
        // small amount into the left block.
        rb.write(&vec![0xAAu8; DEFAULT_CAPACITY]);
        let mut drop_buf = vec![0u8; DEFAULT_CAPACITY - 4];
        rb.read_into(&mut drop_buf);
        rb.write(b"ZZZZ"); // wraps into the left block
        let window = rb.load32(rb.size() - 4);
        assert_eq!(&window[..4], b"ZZZZ");
    }
}
