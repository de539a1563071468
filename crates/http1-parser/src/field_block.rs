//! Compact index of header/trailer lines lifted out of the read buffer.
//!
//! Lines are copied once into an owned backing buffer at the point the
//! parser recognizes them (header/trailer values don't need to outlive a
//! single linearized read), so lookups never re-touch the ring buffer.

use crate::invariants::debug_assert_field_name_size_bounds;

pub const MAX_FIELDS: usize = 128;

#[derive(Clone, Copy, Debug)]
struct FieldEntry {
    name_start: usize,
    name_size: u16,
    value_start: usize,
    value_size: u16,
}

/// A field block: at most [`MAX_FIELDS`] "Name: Value" lines, looked up
/// case-insensitively by name.
#[derive(Default)]
pub struct HttpFieldBlock {
    raw: Vec<u8>,
    entries: Vec<FieldEntry>,
}

impl HttpFieldBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one field line. Caller guarantees `entries.len() < MAX_FIELDS`
    /// and that `name` is non-empty and fits in 16 bits (the parser checks
    /// both against `HttpRequestLimits` before calling this).
    pub fn add_line(&mut self, name: &[u8], value: &[u8]) {
        debug_assert!(self.entries.len() < MAX_FIELDS);
        debug_assert_field_name_size_bounds!(name.len());

        let name_start = self.raw.len();
        self.raw.extend_from_slice(name);
        let value_start = self.raw.len();
        self.raw.extend_from_slice(value);
        self.entries.push(FieldEntry {
            name_start,
            name_size: name.len() as u16,
            value_start,
            value_size: value.len() as u16,
        });
    }

    /// Clears all entries and rebases the backing storage for a new block.
    pub fn reset(&mut self) {
        self.raw.clear();
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn name_at(&self, i: usize) -> &[u8] {
        let e = self.entries[i];
        &self.raw[e.name_start..e.name_start + e.name_size as usize]
    }

    fn raw_value_at(&self, i: usize) -> &[u8] {
        let e = self.entries[i];
        &self.raw[e.value_start..e.value_start + e.value_size as usize]
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_count(name) > 0
    }

    pub fn field_count(&self, name: &str) -> usize {
        (0..self.entries.len())
            .filter(|&i| names_equal_case_insensitive(self.name_at(i), name.as_bytes()))
            .count()
    }

    /// `occurrence` is 1-based, matching the order lines were added in.
    pub fn field_value(&self, name: &str, occurrence: usize) -> Option<&[u8]> {
        if occurrence == 0 {
            return None;
        }
        (0..self.entries.len())
            .filter(|&i| names_equal_case_insensitive(self.name_at(i), name.as_bytes()))
            .nth(occurrence - 1)
            .map(|i| trim_sp_htab(self.raw_value_at(i)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        (0..self.entries.len()).map(move |i| (self.name_at(i), trim_sp_htab(self.raw_value_at(i))))
    }
}

fn names_equal_case_insensitive(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// Trims leading/trailing SP/HTAB. A value consisting solely of SP/HTAB
/// trims to empty, not to a single leftover boundary byte.
pub(crate) fn trim_sp_htab(value: &[u8]) -> &[u8] {
    let is_ows = |b: &u8| *b == b' ' || *b == b'\t';
    let start = value.iter().position(|b| !is_ows(b));
    match start {
        None => &value[0..0],
        Some(start) => {
            let end = value.iter().rposition(|b| !is_ows(b)).unwrap();
            &value[start..=end]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut fb = HttpFieldBlock::new();
        fb.add_line(b"Host", b"example.com");
        assert!(fb.has_field("host"));
        assert!(fb.has_field("HOST"));
        assert_eq!(fb.field_value("hOsT", 1), Some(&b"example.com"[..]));
    }

    #[test]
    fn value_trims_leading_and_trailing_whitespace() {
        let mut fb = HttpFieldBlock::new();
        fb.add_line(b"X-Test", b"  \t value \t ");
        assert_eq!(fb.field_value("X-Test", 1), Some(&b"value"[..]));
    }

    #[test]
    fn whitespace_only_value_trims_to_empty() {
        let mut fb = HttpFieldBlock::new();
        fb.add_line(b"X-Empty", b"   \t\t  ");
        assert_eq!(fb.field_value("X-Empty", 1), Some(&b""[..]));
    }

    #[test]
    fn repeated_fields_addressed_by_occurrence() {
        let mut fb = HttpFieldBlock::new();
        fb.add_line(b"Content-Length", b"22");
        fb.add_line(b"Content-Length", b"25");
        assert_eq!(fb.field_count("Content-Length"), 2);
        assert_eq!(fb.field_value("Content-Length", 1), Some(&b"22"[..]));
        assert_eq!(fb.field_value("Content-Length", 2), Some(&b"25"[..]));
        assert_eq!(fb.field_value("Content-Length", 3), None);
    }

    #[test]
    fn reset_clears_entries_and_storage() {
        let mut fb = HttpFieldBlock::new();
        fb.add_line(b"Host", b"example.com");
        fb.reset();
        assert!(fb.is_empty());
        assert!(!fb.has_field("Host"));
    }
}
