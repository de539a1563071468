//! 32-byte wide vectorized classification over a ring buffer's read
//! window, hiding wrap-around from callers.
//!
//! Classification runs through a runtime-dispatched AVX2 path on x86_64
//! when the host supports it, falling back to a scalar loop everywhere
//! else — the same dispatch shape `memchr` and friends use, since this
//! crate stack has no precedent for raw intrinsics of its own.

use crate::channel::{DataSink, DataSource, IOChannel, NotificationSink};
use crate::ring_buffer::RingBuffer;

/// Anything that can hand back 32 consecutive logical bytes starting at an
/// arbitrary offset, with overread past `size()` defined up to `size()`
/// itself (see [`RingBuffer::load32`]).
pub trait Window32Source {
    fn window_len(&self) -> usize;
    fn load32(&self, index: usize) -> [u8; 32];
}

impl Window32Source for RingBuffer {
    fn window_len(&self) -> usize {
        self.size()
    }
    fn load32(&self, index: usize) -> [u8; 32] {
        RingBuffer::load32(self, index)
    }
}

impl<D: DataSource, K: DataSink, N: NotificationSink> Window32Source for IOChannel<D, K, N> {
    fn window_len(&self) -> usize {
        self.data_available()
    }
    fn load32(&self, index: usize) -> [u8; 32] {
        IOChannel::load32(self, index)
    }
}

/// Lets an already-extracted slice (e.g. a request-target copied out of
/// the channel) be scanned through the same windowed classifiers as a
/// live ring buffer or channel, zero-padding past its end.
impl Window32Source for [u8] {
    fn window_len(&self) -> usize {
        self.len()
    }
    fn load32(&self, index: usize) -> [u8; 32] {
        let mut out = [0u8; 32];
        let n = 32.min(self.len().saturating_sub(index));
        if n > 0 {
            out[..n].copy_from_slice(&self[index..index + n]);
        }
        out
    }
}

/// A non-owning 32-byte wide view over a [`Window32Source`]. This is the
/// one path every delimiter search in this workspace goes through —
/// chunk metadata, request-line, and field-line scanning all call
/// [`SimdIterator::scan`] rather than touching `load32` directly.
pub struct SimdIterator<'a, T: Window32Source + ?Sized> {
    source: &'a T,
}

impl<'a, T: Window32Source + ?Sized> SimdIterator<'a, T> {
    pub fn new(source: &'a T) -> Self {
        Self { source }
    }

    /// Loads the 32 bytes of the logical stream starting at `index`.
    /// Legal for any `index <= source.window_len()`.
    pub fn next_at(&self, index: usize) -> [u8; 32] {
        debug_assert!(index <= self.source.window_len());
        self.source.load32(index)
    }

    /// Walks 32-byte windows starting at `start`, applying `classify` to
    /// each and returning the first absolute offset it reports. Advances
    /// a full window at a time when a window comes back clean, so a
    /// match past the first 32 bytes still gets found. Returns `None`
    /// when the data currently backing the source runs out before
    /// `classify` ever reports a hit — the caller reads that as "come
    /// back once more bytes arrive", not "no such byte exists".
    pub fn scan(&self, start: usize, mut classify: impl FnMut(&[u8; 32]) -> Option<usize>) -> Option<usize> {
        let len = self.source.window_len();
        let mut offset = start;
        loop {
            if offset >= len {
                return None;
            }
            let avail = (len - offset).min(32);
            let window = self.next_at(offset);
            if let Some(p) = classify(&window) {
                if p < avail {
                    return Some(offset + p);
                }
            }
            if avail < 32 {
                return None;
            }
            offset += 32;
        }
    }
}

/// Finds the first byte in `window` that is not an ASCII hex digit
/// (`0-9`, `A-F`, `a-f`), scanning case-insensitively via the same
/// upper-case-folding mask the chunk-metadata grammar relies on.
pub fn find_first_non_hex_digit(window: &[u8; 32]) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            // SAFETY: guarded by the runtime feature check above.
            return unsafe { avx2::find_first_non_hex_digit(window) };
        }
    }
    scalar::find_first_non_hex_digit(window)
}

/// Finds the first byte in `window` that is not a permitted field-value /
/// chunk-extension character: any control character below `0x20` except
/// HTAB, or DEL (`0x7F`). Used to locate the CR that terminates chunk
/// metadata and header/trailer field values.
pub fn find_first_non_field_char(window: &[u8; 32]) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            // SAFETY: guarded by the runtime feature check above.
            return unsafe { avx2::find_first_non_field_char(window) };
        }
    }
    scalar::find_first_non_field_char(window)
}

/// Finds the first occurrence of `needle` in `window`. Used to locate a
/// fixed delimiter byte (`' '`, `':'`, `'?'`) rather than classify a
/// whole alphabet, so unlike the two scans above it takes its target at
/// call time instead of baking it into the dispatch.
pub fn find_first_byte(window: &[u8; 32], needle: u8) -> Option<usize> {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            // SAFETY: guarded by the runtime feature check above.
            return unsafe { avx2::find_first_byte(window, needle) };
        }
    }
    scalar::find_first_byte(window, needle)
}

mod scalar {
    pub fn find_first_non_hex_digit(window: &[u8; 32]) -> Option<usize> {
        window.iter().position(|&b| !b.is_ascii_hexdigit())
    }

    pub fn find_first_non_field_char(window: &[u8; 32]) -> Option<usize> {
        window
            .iter()
            .position(|&b| (b < 0x20 && b != 0x09) || b == 0x7F)
    }

    pub fn find_first_byte(window: &[u8; 32], needle: u8) -> Option<usize> {
        window.iter().position(|&b| b == needle)
    }
}

#[cfg(target_arch = "x86_64")]
mod avx2 {
    use std::arch::x86_64::*;

    /// # Safety
    /// Caller must have confirmed `avx2` is available via
    /// `is_x86_feature_detected!`.
    #[target_feature(enable = "avx2")]
    pub unsafe fn find_first_non_hex_digit(window: &[u8; 32]) -> Option<usize> {
        let data = _mm256_loadu_si256(window.as_ptr().cast());
        let upper = _mm256_and_si256(data, _mm256_set1_epi8(0xDFu8 as i8));
        let is_digit = _mm256_and_si256(
            _mm256_cmpgt_epi8(data, _mm256_set1_epi8(b'0' as i8 - 1)),
            _mm256_cmpgt_epi8(_mm256_set1_epi8(b'9' as i8 + 1), data),
        );
        let is_alpha = _mm256_and_si256(
            _mm256_cmpgt_epi8(upper, _mm256_set1_epi8(b'A' as i8 - 1)),
            _mm256_cmpgt_epi8(_mm256_set1_epi8(b'F' as i8 + 1), upper),
        );
        let is_hex = _mm256_or_si256(is_digit, is_alpha);
        let not_hex_mask = !(_mm256_movemask_epi8(is_hex) as u32);
        if not_hex_mask == 0 {
            None
        } else {
            Some(not_hex_mask.trailing_zeros() as usize)
        }
    }

    /// # Safety
    /// Caller must have confirmed `avx2` is available via
    /// `is_x86_feature_detected!`.
    #[target_feature(enable = "avx2")]
    pub unsafe fn find_first_non_field_char(window: &[u8; 32]) -> Option<usize> {
        let data = _mm256_loadu_si256(window.as_ptr().cast());
        let is_htab = _mm256_cmpeq_epi8(data, _mm256_set1_epi8(0x09));
        let is_del = _mm256_cmpeq_epi8(data, _mm256_set1_epi8(0x7Fu8 as i8));
        let is_control = _mm256_cmpgt_epi8(_mm256_set1_epi8(0x20), data);
        let is_bad = _mm256_or_si256(is_del, _mm256_andnot_si256(is_htab, is_control));
        let mask = _mm256_movemask_epi8(is_bad) as u32;
        if mask == 0 {
            None
        } else {
            Some(mask.trailing_zeros() as usize)
        }
    }

    /// # Safety
    /// Caller must have confirmed `avx2` is available via
    /// `is_x86_feature_detected!`.
    #[target_feature(enable = "avx2")]
    pub unsafe fn find_first_byte(window: &[u8; 32], needle: u8) -> Option<usize> {
        let data = _mm256_loadu_si256(window.as_ptr().cast());
        let eq = _mm256_cmpeq_epi8(data, _mm256_set1_epi8(needle as i8));
        let mask = _mm256_movemask_epi8(eq) as u32;
        if mask == 0 {
            None
        } else {
            Some(mask.trailing_zeros() as usize)
        }
    }
}
