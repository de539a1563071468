//! Process-wide Unix signal delivery via `signalfd`.
//!
//! At most one [`UnixSignalListener`] exists per process. Constructing it
//! blocks the requested signals on the calling thread (and, since the
//! mask is inherited, every thread spawned afterward) so delivery happens
//! exclusively through reads of the signalfd, never as an asynchronous
//! interrupt.

use std::io::Error;
use std::mem;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::NetError;
use crate::invariants::debug_assert_singleton_not_duplicated;

static SINGLETON_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

#[cfg(any(target_os = "linux", target_os = "android"))]
pub struct UnixSignalListener {
    fd: RawFd,
    signals: Vec<i32>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl UnixSignalListener {
    /// Blocks every signal in `signals` on the calling thread and opens a
    /// signalfd that reports `signals`. Blocks *every* signal on the
    /// calling thread, not just the watched subset, so nothing in
    /// `signals` can ever be delivered asynchronously even if a future
    /// caller asks for a broader signalfd set than this instance reports.
    /// Fails if an instance already exists in this process.
    pub fn new(signals: &[i32]) -> Result<Self, NetError> {
        let already = SINGLETON_CONSTRUCTED.swap(true, Ordering::AcqRel);
        debug_assert_singleton_not_duplicated!(already);
        if already {
            return Err(NetError::SingletonAlreadyConstructed);
        }

        let mut all_signals: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            libc::sigfillset(&mut all_signals);
        }
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &all_signals, std::ptr::null_mut()) };
        if rc != 0 {
            SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
            return Err(NetError::SigprocmaskFailed(Error::from_raw_os_error(rc)));
        }

        let mut watched: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut watched);
            for &sig in signals {
                libc::sigaddset(&mut watched, sig);
            }
        }

        let fd = unsafe { libc::signalfd(-1, &watched, libc::SFD_CLOEXEC | libc::SFD_NONBLOCK) };
        if fd < 0 {
            SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
            return Err(NetError::SignalFdCreationFailed(Error::last_os_error()));
        }

        tracing::info!(?signals, "signal listener constructed");
        Ok(Self { fd, signals: signals.to_vec() })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_registered(&self, signal: i32) -> bool {
        self.signals.contains(&signal)
    }

    /// Drains every signalfd record currently pending, calling `on_signal`
    /// once per delivered signal number. Call this when the reactor
    /// reports `raw_fd()` readable.
    pub fn drain_pending<F: FnMut(i32)>(&self, mut on_signal: F) -> Result<usize, NetError> {
        let rec_size = mem::size_of::<libc::signalfd_siginfo>();
        let mut buf = vec![0u8; rec_size * 8];
        let mut delivered = 0usize;
        loop {
            let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n < 0 {
                let err = Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    break;
                }
                return Err(NetError::SignalReadFailed(err));
            }
            if n == 0 {
                break;
            }
            let n = n as usize;
            let count = n / rec_size;
            for i in 0..count {
                let offset = i * rec_size;
                let info: libc::signalfd_siginfo =
                    unsafe { std::ptr::read_unaligned(buf[offset..].as_ptr().cast::<libc::signalfd_siginfo>()) };
                tracing::debug!(signal = info.ssi_signo, "signal delivered via signalfd");
                on_signal(info.ssi_signo as i32);
                delivered += 1;
            }
            if n < buf.len() {
                break;
            }
        }
        Ok(delivered)
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
impl Drop for UnixSignalListener {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
        SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub struct UnixSignalListener {
    signals: Vec<i32>,
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
impl UnixSignalListener {
    pub fn new(_signals: &[i32]) -> Result<Self, NetError> {
        Err(NetError::UnsupportedPlatform)
    }

    pub fn raw_fd(&self) -> RawFd {
        -1
    }

    pub fn is_registered(&self, signal: i32) -> bool {
        self.signals.contains(&signal)
    }

    pub fn drain_pending<F: FnMut(i32)>(&self, _on_signal: F) -> Result<usize, NetError> {
        Ok(0)
    }
}

#[cfg(all(test, any(target_os = "linux", target_os = "android")))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `UnixSignalListener` is a process-wide singleton, so tests that
    // construct one must not run concurrently with each other.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn second_construction_in_process_fails() {
        let _guard = TEST_LOCK.lock().unwrap();
        SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
        let first = UnixSignalListener::new(&[libc::SIGUSR1]).expect("first construction succeeds");
        let second = UnixSignalListener::new(&[libc::SIGUSR2]);
        assert!(matches!(second, Err(NetError::SingletonAlreadyConstructed)));
        drop(first);
        SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
    }

    #[test]
    fn registered_signal_is_delivered_and_drained() {
        let _guard = TEST_LOCK.lock().unwrap();
        SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
        let listener = UnixSignalListener::new(&[libc::SIGUSR1]).expect("construction succeeds");
        assert!(listener.is_registered(libc::SIGUSR1));
        unsafe {
            libc::raise(libc::SIGUSR1);
        }
        let mut seen = Vec::new();
        listener.drain_pending(|sig| seen.push(sig)).unwrap();
        assert_eq!(seen, vec![libc::SIGUSR1]);
        drop(listener);
        SINGLETON_CONSTRUCTED.store(false, Ordering::Release);
    }
}
