//! Debug-only invariant checks for field blocks and the request parser.

/// INV-PARSE-01: requestSize only ever grows.
macro_rules! debug_assert_request_size_monotonic {
    ($before:expr, $after:expr) => {
        debug_assert!(
            $after >= $before,
            "INV-PARSE-01 violated: requestSize went from {} to {}",
            $before,
            $after
        );
    };
}

/// INV-PARSE-02: a field entry's name is never empty and fits in 16 bits.
macro_rules! debug_assert_field_name_size_bounds {
    ($name_size:expr) => {
        debug_assert!(
            $name_size >= 1 && $name_size <= u16::MAX as usize,
            "INV-PARSE-02 violated: field name size {} out of bounds",
            $name_size
        );
    };
}

/// INV-PARSE-03: pendingBodySize never underflows past zero.
macro_rules! debug_assert_pending_body_no_underflow {
    ($pending:expr, $delivered:expr) => {
        debug_assert!(
            $delivered <= $pending,
            "INV-PARSE-03 violated: delivered {} exceeds pendingBodySize {}",
            $delivered,
            $pending
        );
    };
}

pub(crate) use debug_assert_field_name_size_bounds;
pub(crate) use debug_assert_pending_body_no_underflow;
pub(crate) use debug_assert_request_size_monotonic;
