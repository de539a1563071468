//! Debug-only invariant checks for the worker-net crate.

/// INV-NET-01: a host entry being actively drained is never removed from
/// the table mid-drain, even if the drain empties its receiver list.
macro_rules! debug_assert_entry_survives_drain {
    ($is_informing:expr, $entry_present:expr) => {
        debug_assert!(
            !$is_informing || $entry_present,
            "INV-NET-01 violated: host entry vanished while isInformingReceivers was set"
        );
    };
}

/// INV-NET-02: at most one `UnixSignalListener` exists per process.
macro_rules! debug_assert_singleton_not_duplicated {
    ($already_constructed:expr) => {
        debug_assert!(!$already_constructed, "INV-NET-02 violated: a second UnixSignalListener was constructed");
    };
}

pub(crate) use debug_assert_entry_survives_drain;
pub(crate) use debug_assert_singleton_not_duplicated;
