//! Debug-only invariant checks for the ring buffer and channel.
//!
//! Each macro documents exactly one named invariant and compiles to nothing
//! in release builds. They exist so violations fail loudly in tests and
//! debug runs instead of producing silently wrong output.

/// INV-RING-01: size never exceeds the current capacity.
macro_rules! debug_assert_size_within_capacity {
    ($size:expr, $capacity:expr) => {
        debug_assert!(
            $size <= $capacity,
            "INV-RING-01 violated: size {} exceeds capacity {}",
            $size,
            $capacity
        );
    };
}

/// INV-RING-02: the left block is only ever nonzero once the right block
/// has reached the physical end of the allocation.
macro_rules! debug_assert_left_block_only_after_wrap {
    ($left_len:expr, $cursor:expr, $right_len:expr, $capacity:expr) => {
        debug_assert!(
            $left_len == 0 || $cursor + $right_len == $capacity,
            "INV-RING-02 violated: left_len {} nonzero but right block ends at {} (capacity {})",
            $left_len,
            $cursor + $right_len,
            $capacity
        );
    };
}

/// INV-RING-03: an empty buffer always has its cursor at the physical start.
macro_rules! debug_assert_empty_cursor_reset {
    ($size:expr, $cursor:expr) => {
        debug_assert!(
            $size != 0 || $cursor == 0,
            "INV-RING-03 violated: empty buffer has cursor at {}",
            $cursor
        );
    };
}

/// INV-RING-04: current capacity never exceeds the configured hard cap
/// (0 means unbounded).
macro_rules! debug_assert_within_hard_cap {
    ($capacity:expr, $hard_cap:expr) => {
        debug_assert!(
            $hard_cap == 0 || $capacity <= $hard_cap,
            "INV-RING-04 violated: capacity {} exceeds hard cap {}",
            $capacity,
            $hard_cap
        );
    };
}

/// INV-CHAN-01: read notification is enabled iff the read buffer is not full.
macro_rules! debug_assert_read_notification_matches_fullness {
    ($enabled:expr, $is_full:expr) => {
        debug_assert!(
            $enabled != $is_full,
            "INV-CHAN-01 violated: read notification {} while full={}",
            $enabled,
            $is_full
        );
    };
}

/// INV-CHAN-02: write notification is enabled iff the write buffer is not empty.
macro_rules! debug_assert_write_notification_matches_emptiness {
    ($enabled:expr, $is_empty:expr) => {
        debug_assert!(
            $enabled != $is_empty,
            "INV-CHAN-02 violated: write notification {} while empty={}",
            $enabled,
            $is_empty
        );
    };
}

pub(crate) use debug_assert_empty_cursor_reset;
pub(crate) use debug_assert_left_block_only_after_wrap;
pub(crate) use debug_assert_read_notification_matches_fullness;
pub(crate) use debug_assert_size_within_capacity;
pub(crate) use debug_assert_within_hard_cap;
pub(crate) use debug_assert_write_notification_matches_emptiness;
