//! Per-worker DNS lookup coalescing.
//!
//! One [`HostAddressFetcher`] lives on each worker thread, installed via
//! [`install`], and merges concurrent lookups for the same hostname into
//! a single in-flight resolution, fanning the result back out to every
//! registrant.

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::invariants::debug_assert_entry_survives_drain;

/// Identifies one registered receiver so it can be individually removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverId(u64);

/// Whether the caller must itself kick off a new DNS lookup for `host`,
/// or whether one is already outstanding and the registration was just
/// appended to its receiver list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    AlreadyPending,
    NeedsResolution,
}

struct Receiver {
    id: ReceiverId,
    callback: Box<dyn FnOnce(&[IpAddr])>,
}

struct HostEntry {
    receivers: Vec<Receiver>,
    is_informing_receivers: bool,
}

/// Coalesces concurrent lookups for the same hostname. Owns no actual
/// resolver: starting and completing a lookup are the caller's
/// responsibility (typically the reactor's getaddrinfo thread pool);
/// this type only tracks who is waiting and fans out [`on_host_resolved`].
#[derive(Default)]
pub struct HostAddressFetcher {
    entries: HashMap<String, HostEntry>,
    next_id: u64,
}

impl HostAddressFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_receiver_id(&mut self) -> ReceiverId {
        self.next_id += 1;
        ReceiverId(self.next_id)
    }

    /// Registers `callback` for `host`. Returns the outcome the caller
    /// must act on: start a new lookup, or do nothing because one is
    /// already in flight.
    pub fn add_host_lookup(&mut self, host: &str, callback: impl FnOnce(&[IpAddr]) + 'static) -> (ReceiverId, LookupOutcome) {
        let id = self.next_receiver_id();
        let receiver = Receiver { id, callback: Box::new(callback) };
        match self.entries.get_mut(host) {
            Some(entry) => {
                entry.receivers.push(receiver);
                (id, LookupOutcome::AlreadyPending)
            }
            None => {
                self.entries.insert(host.to_string(), HostEntry { receivers: vec![receiver], is_informing_receivers: false });
                (id, LookupOutcome::NeedsResolution)
            }
        }
    }

    /// Removes one pending receiver. Safe to call from within a callback
    /// invoked by [`on_host_resolved`] for a sibling receiver on the same
    /// host: the entry is not destroyed mid-drain even if this empties
    /// its receiver list.
    pub fn remove_host_lookup(&mut self, host: &str, id: ReceiverId) -> bool {
        let is_informing = match self.entries.get_mut(host) {
            Some(entry) => {
                let before = entry.receivers.len();
                entry.receivers.retain(|r| r.id != id);
                if entry.receivers.len() == before {
                    return false;
                }
                entry.is_informing_receivers
            }
            None => return false,
        };
        if !is_informing && self.entries.get(host).is_some_and(|e| e.receivers.is_empty()) {
            self.entries.remove(host);
        }
        debug_assert_entry_survives_drain!(is_informing, self.entries.contains_key(host));
        true
    }

    /// Delivers a completed resolution to every receiver registered for
    /// `host`, draining them one at a time so a receiver removed
    /// mid-drain never runs. No-op if nothing is waiting on `host`.
    ///
    /// Holds `&mut self` for the whole drain, so a callback cannot call
    /// back into this same fetcher through this method. The thread-local
    /// wrapper [`on_host_resolved`] (this module's free function) drains
    /// one receiver at a time instead, releasing its borrow between
    /// callbacks so reentrant calls are safe.
    pub fn on_host_resolved(&mut self, host: &str, addresses: &[IpAddr]) {
        if !self.begin_informing(host) {
            return;
        }
        tracing::debug!(host, addresses = addresses.len(), "host resolution completed");
        while let Some(receiver) = self.take_next_receiver(host) {
            (receiver.callback)(addresses);
        }
        self.end_informing(host);
    }

    /// Marks `host`'s entry as being drained. Returns `false` if nothing
    /// is waiting on `host`.
    fn begin_informing(&mut self, host: &str) -> bool {
        match self.entries.get_mut(host) {
            Some(entry) => {
                entry.is_informing_receivers = true;
                true
            }
            None => false,
        }
    }

    /// Pops the next pending receiver for `host`, or `None` once the
    /// list is exhausted. Safe to interleave with [`remove_host_lookup`](Self::remove_host_lookup)
    /// calls for the same host, including from a previously popped
    /// receiver's own callback.
    fn take_next_receiver(&mut self, host: &str) -> Option<Receiver> {
        match self.entries.get_mut(host) {
            Some(entry) if !entry.receivers.is_empty() => Some(entry.receivers.remove(0)),
            _ => None,
        }
    }

    /// Clears the draining flag for `host` and removes its entry if the
    /// receiver list ended up empty.
    fn end_informing(&mut self, host: &str) {
        if let Some(entry) = self.entries.get_mut(host) {
            entry.is_informing_receivers = false;
        }
        if self.entries.get(host).is_some_and(|e| e.receivers.is_empty()) {
            self.entries.remove(host);
        }
    }

    pub fn has_pending_lookup(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    pub fn pending_receiver_count(&self, host: &str) -> usize {
        self.entries.get(host).map_or(0, |e| e.receivers.len())
    }
}

thread_local! {
    static FETCHER: RefCell<Option<HostAddressFetcher>> = const { RefCell::new(None) };
}

/// Installs a fresh [`HostAddressFetcher`] as this thread's instance,
/// replacing any existing one.
pub fn install() {
    FETCHER.with(|cell| *cell.borrow_mut() = Some(HostAddressFetcher::new()));
}

/// Registers `callback` for `host` on this thread's fetcher. If no
/// instance has been [`install`]ed, `callback` runs synchronously with
/// an empty address list, matching the "never created" case.
pub fn add_host_lookup(host: &str, callback: impl FnOnce(&[IpAddr]) + 'static) -> Option<(ReceiverId, LookupOutcome)> {
    FETCHER.with(|cell| match cell.borrow_mut().as_mut() {
        Some(fetcher) => Some(fetcher.add_host_lookup(host, callback)),
        None => {
            callback(&[]);
            None
        }
    })
}

/// Removes a pending receiver on this thread's fetcher. `false` if no
/// instance is installed or the receiver wasn't found.
pub fn remove_host_lookup(host: &str, id: ReceiverId) -> bool {
    FETCHER.with(|cell| cell.borrow_mut().as_mut().is_some_and(|fetcher| fetcher.remove_host_lookup(host, id)))
}

/// Delivers a completed resolution on this thread's fetcher, draining
/// receivers one at a time and releasing the thread-local borrow between
/// each callback. Unlike [`HostAddressFetcher::on_host_resolved`], this
/// makes it safe for a callback to reentrantly call [`remove_host_lookup`]
/// or [`add_host_lookup`] for the same host.
pub fn on_host_resolved(host: &str, addresses: &[IpAddr]) {
    let began = FETCHER.with(|cell| cell.borrow_mut().as_mut().is_some_and(|f| f.begin_informing(host)));
    if !began {
        return;
    }
    loop {
        let next = FETCHER.with(|cell| cell.borrow_mut().as_mut().and_then(|f| f.take_next_receiver(host)));
        let Some(receiver) = next else { break };
        (receiver.callback)(addresses);
    }
    FETCHER.with(|cell| {
        if let Some(fetcher) = cell.borrow_mut().as_mut() {
            fetcher.end_informing(host);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;

    fn addr(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, n))
    }

    #[test]
    fn first_registration_requests_resolution() {
        let mut fetcher = HostAddressFetcher::new();
        let (_, outcome) = fetcher.add_host_lookup("example.com", |_| {});
        assert_eq!(outcome, LookupOutcome::NeedsResolution);
    }

    #[test]
    fn second_registration_for_same_host_coalesces() {
        let mut fetcher = HostAddressFetcher::new();
        fetcher.add_host_lookup("example.com", |_| {});
        let (_, outcome) = fetcher.add_host_lookup("example.com", |_| {});
        assert_eq!(outcome, LookupOutcome::AlreadyPending);
        assert_eq!(fetcher.pending_receiver_count("example.com"), 2);
    }

    #[test]
    fn each_callback_invoked_exactly_once_on_resolution() {
        let mut fetcher = HostAddressFetcher::new();
        let calls = Rc::new(StdRefCell::new(Vec::new()));
        for _ in 0..3 {
            let calls = calls.clone();
            fetcher.add_host_lookup("example.com", move |addrs| calls.borrow_mut().push(addrs.to_vec()));
        }
        fetcher.on_host_resolved("example.com", &[addr(1)]);
        assert_eq!(calls.borrow().len(), 3);
        assert!(calls.borrow().iter().all(|a| a == &[addr(1)]));
        assert!(!fetcher.has_pending_lookup("example.com"));
    }

    #[test]
    fn removed_receiver_is_not_invoked() {
        let mut fetcher = HostAddressFetcher::new();
        let calls = Rc::new(StdRefCell::new(0));
        let (_, _) = fetcher.add_host_lookup("example.com", {
            let calls = calls.clone();
            move |_| *calls.borrow_mut() += 1
        });
        let (id2, _) = fetcher.add_host_lookup("example.com", {
            let calls = calls.clone();
            move |_| *calls.borrow_mut() += 1
        });
        fetcher.remove_host_lookup("example.com", id2);
        fetcher.on_host_resolved("example.com", &[addr(1)]);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn removing_a_not_yet_drained_sibling_prevents_its_invocation() {
        // Only the thread-local free functions release their borrow
        // between callbacks, so reentrant removal of a receiver that
        // hasn't been popped yet is exercised through them rather than
        // through a direct `HostAddressFetcher` call.
        install();
        let target_ran = Rc::new(StdRefCell::new(false));
        let target_ran_clone = target_ran.clone();

        // Registered first, so it drains before `target` and can still
        // observe the host entry while `target` is pending.
        let observed_pending = Rc::new(StdRefCell::new(None));
        let observed_pending_clone = observed_pending.clone();
        let target_id_cell = Rc::new(StdRefCell::new(None));
        let target_id_for_remover = target_id_cell.clone();
        add_host_lookup("example.com", move |_| {
            let target_id = target_id_for_remover.borrow().unwrap();
            remove_host_lookup("example.com", target_id);
            *observed_pending_clone.borrow_mut() =
                Some(FETCHER.with(|cell| cell.borrow().as_ref().unwrap().has_pending_lookup("example.com")));
        });

        let (target_id, _) = add_host_lookup("example.com", move |_| *target_ran_clone.borrow_mut() = true).unwrap();
        *target_id_cell.borrow_mut() = Some(target_id);

        on_host_resolved("example.com", &[addr(7)]);

        assert_eq!(*observed_pending.borrow(), Some(true));
        assert!(!*target_ran.borrow());
        assert!(!FETCHER.with(|cell| cell.borrow().as_ref().unwrap().has_pending_lookup("example.com")));
    }

    #[test]
    fn resolving_unknown_host_is_a_no_op() {
        let mut fetcher = HostAddressFetcher::new();
        fetcher.on_host_resolved("nowhere.invalid", &[addr(1)]);
        assert!(!fetcher.has_pending_lookup("nowhere.invalid"));
    }

    #[test]
    fn uninstalled_thread_local_invokes_callback_synchronously_with_empty_list() {
        let calls = Rc::new(StdRefCell::new(None));
        let calls_clone = calls.clone();
        let outcome = add_host_lookup("example.com", move |addrs| *calls_clone.borrow_mut() = Some(addrs.to_vec()));
        assert!(outcome.is_none());
        assert_eq!(*calls.borrow(), Some(Vec::new()));
    }
}
