//! TLS record-transport contract.
//!
//! A TLS-enabled channel adds two ring buffers beyond the plain read/write
//! pair a channel already owns: encrypted-in (fed by transport reads,
//! consumed by the TLS engine as a custom BIO source) and encrypted-out
//! (populated by the TLS engine, drained to transport writes). Plaintext
//! still flows through the channel's ordinary read/write buffers —
//! [`TlsSocketDataSource`] is what the channel's `DataSource`/`DataSink`
//! slots hold so that the parser never has to know TLS is involved.
//!
//! The actual cryptographic handshake and record framing are out of
//! scope; [`TlsEngine`] models only the shape the channel layer depends
//! on, so any TLS library can be adapted behind it.

use std::cell::RefCell;

use ring_channel::{ChannelError, DataSink, DataSource, RingBuffer};

/// The cryptographic engine a [`TlsSocketDataSource`] drives. Consuming
/// less than the full input is always legal — the source re-queues the
/// remainder — which is what lets an engine wait for a complete record
/// before producing output.
pub trait TlsEngine {
    /// Consumes as much of `ciphertext` as forms complete records right
    /// now, writing any resulting plaintext into `plaintext_out`.
    /// Returns `(ciphertext_consumed, plaintext_produced)`.
    fn decrypt(&mut self, ciphertext: &[u8], plaintext_out: &mut [u8]) -> (usize, usize);

    /// Encrypts all of `plaintext` into one or more records appended to
    /// `ciphertext_out`.
    fn encrypt(&mut self, plaintext: &[u8], ciphertext_out: &mut Vec<u8>);
}

/// Adapts a [`TlsEngine`] to the channel's plain `DataSource`/`DataSink`
/// contract. Never reports a short read as an error: an empty
/// encrypted-in buffer just yields zero plaintext bytes, signaling
/// "retry" the way a BIO read callback would.
pub struct TlsSocketDataSource<E> {
    engine: RefCell<E>,
    encrypted_in: RefCell<RingBuffer>,
    encrypted_out: RingBuffer,
    plaintext_in: RefCell<Vec<u8>>,
}

impl<E: TlsEngine> TlsSocketDataSource<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine: RefCell::new(engine),
            encrypted_in: RefCell::new(RingBuffer::new(0)),
            encrypted_out: RingBuffer::new(0),
            plaintext_in: RefCell::new(Vec::new()),
        }
    }

    /// Transport-facing write side: raw bytes read off the socket land
    /// here before the engine ever sees them.
    pub fn feed_ciphertext(&mut self, data: &[u8]) {
        self.encrypted_in.borrow_mut().write(data);
    }

    /// Transport-facing read side: drains ciphertext the engine has
    /// already staged, for the transport to send. An empty buffer
    /// yields `0`, not an error.
    pub fn drain_ciphertext(&mut self, buf: &mut [u8]) -> usize {
        self.encrypted_out.read_into(buf)
    }

    /// `BIO_CTRL_PENDING` equivalent for the encrypted-in side.
    pub fn pending_ciphertext_in(&self) -> usize {
        self.encrypted_in.borrow().size()
    }

    /// `BIO_CTRL_PENDING` equivalent for the encrypted-out side.
    pub fn pending_ciphertext_out(&self) -> usize {
        self.encrypted_out.size()
    }

    /// `BIO_CTRL_EOF` equivalent: this contract never reports
    /// end-of-file, matching OpenSSL's convention for a custom BIO that
    /// doesn't implement it.
    pub fn eof(&self) -> bool {
        false
    }

    /// Runs whatever ciphertext is queued through the engine, staging
    /// any plaintext it produces. Idempotent if there is nothing new.
    fn pump_decrypt(&self) {
        let queued = {
            let mut encrypted_in = self.encrypted_in.borrow_mut();
            if encrypted_in.is_empty() {
                return;
            }
            encrypted_in.read_all()
        };
        let mut produced = vec![0u8; queued.len().max(1) * 4];
        let (consumed, produced_len) = self.engine.borrow_mut().decrypt(&queued, &mut produced);
        if consumed < queued.len() {
            self.encrypted_in.borrow_mut().write(&queued[consumed..]);
        }
        self.plaintext_in.borrow_mut().extend_from_slice(&produced[..produced_len]);
    }
}

impl<E: TlsEngine> DataSource for TlsSocketDataSource<E> {
    fn data_available(&self) -> usize {
        self.pump_decrypt();
        self.plaintext_in.borrow().len()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        self.pump_decrypt();
        let mut staged = self.plaintext_in.borrow_mut();
        let n = buf.len().min(staged.len());
        buf[..n].copy_from_slice(&staged[..n]);
        staged.drain(..n);
        Ok(n)
    }
}

impl<E: TlsEngine> DataSink for TlsSocketDataSource<E> {
    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let mut ciphertext = Vec::new();
        self.engine.borrow_mut().encrypt(data, &mut ciphertext);
        self.encrypted_out.write(&ciphertext);
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// XORs every byte with a fixed key and frames each call's input as
    /// one "record" — enough to exercise the BIO-shaped contract without
    /// a real TLS stack.
    #[derive(Default)]
    struct XorEngine {
        key: u8,
    }

    impl TlsEngine for XorEngine {
        fn decrypt(&mut self, ciphertext: &[u8], plaintext_out: &mut [u8]) -> (usize, usize) {
            let n = ciphertext.len().min(plaintext_out.len());
            for i in 0..n {
                plaintext_out[i] = ciphertext[i] ^ self.key;
            }
            (n, n)
        }

        fn encrypt(&mut self, plaintext: &[u8], ciphertext_out: &mut Vec<u8>) {
            ciphertext_out.extend(plaintext.iter().map(|b| b ^ self.key));
        }
    }

    #[test]
    fn empty_encrypted_in_reports_no_data_available() {
        let source = TlsSocketDataSource::new(XorEngine { key: 0x42 });
        assert_eq!(source.data_available(), 0);
        assert!(!source.eof());
    }

    #[test]
    fn fed_ciphertext_decrypts_to_plaintext_on_read() {
        let mut source = TlsSocketDataSource::new(XorEngine { key: 0x42 });
        let plaintext = b"hello tls";
        let ciphertext: Vec<u8> = plaintext.iter().map(|b| b ^ 0x42).collect();
        source.feed_ciphertext(&ciphertext);
        assert_eq!(source.data_available(), plaintext.len());
        let mut out = [0u8; 32];
        let n = source.read(&mut out).unwrap();
        assert_eq!(&out[..n], plaintext);
    }

    #[test]
    fn short_read_from_empty_buffer_is_zero_not_an_error() {
        let mut source = TlsSocketDataSource::new(XorEngine { key: 0x7 });
        let mut out = [0u8; 16];
        assert_eq!(source.read(&mut out).unwrap(), 0);
    }

    #[test]
    fn written_plaintext_is_staged_as_ciphertext_for_transport() {
        let mut source = TlsSocketDataSource::new(XorEngine { key: 0x55 });
        let plaintext = b"response body";
        source.write(plaintext).unwrap();
        assert_eq!(source.pending_ciphertext_out(), plaintext.len());
        let mut out = [0u8; 32];
        let n = source.drain_ciphertext(&mut out);
        let decrypted: Vec<u8> = out[..n].iter().map(|b| b ^ 0x55).collect();
        assert_eq!(decrypted, plaintext);
    }
}
