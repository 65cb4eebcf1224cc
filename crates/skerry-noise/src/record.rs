//! The encrypted record layer.
//!
//! Turns a raw ordered byte stream plus a pair of session keys into a duplex
//! stream of authenticated records:
//!
//! ```text
//! [length: u16 big-endian][ciphertext || 16-byte tag]
//! ```
//!
//! Each direction has its own key and its own strictly increasing u64 nonce
//! counter, private to the half that owns it. The counter is the nonce: the
//! receiver derives it from record order rather than the wire, so a record
//! that is replayed, reordered, dropped, or injected fails authentication.
//! A counter about to wrap ends the session instead of reusing a nonce.
//!
//! [`SecureSession`] requires `&mut self` for both directions; callers that
//! want a concurrent reader and writer use [`SecureSession::split`], which
//! moves each direction's cipher into its own exclusively owned half.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use skerry_core::TAG_LEN;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::SessionError;
use crate::framing::{read_frame, write_frame};
use crate::identity::PeerId;
use crate::keys::SessionKeys;

/// One direction's cipher state: AEAD key plus the next nonce.
///
/// The counter can only move forward, one step per successful operation,
/// and is never exposed; nonce reuse is structurally impossible.
struct RecordCipher {
    cipher: ChaCha20Poly1305,
    nonce: u64,
}

impl RecordCipher {
    fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            nonce: 0,
        }
    }

    fn nonce_bytes(&self) -> Nonce {
        let mut bytes = [0u8; 12];
        bytes[4..].copy_from_slice(&self.nonce.to_le_bytes());
        Nonce::from(bytes)
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        if self.nonce == u64::MAX {
            return Err(SessionError::NonceExhausted);
        }
        let ciphertext = self
            .cipher
            .encrypt(&self.nonce_bytes(), plaintext)
            .map_err(|_| SessionError::Encryption)?;
        self.nonce += 1;
        Ok(ciphertext)
    }

    fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, SessionError> {
        if self.nonce == u64::MAX {
            return Err(SessionError::NonceExhausted);
        }
        if ciphertext.len() < TAG_LEN {
            return Err(SessionError::Decryption);
        }
        let plaintext = self
            .cipher
            .decrypt(&self.nonce_bytes(), ciphertext)
            .map_err(|_| SessionError::Decryption)?;
        self.nonce += 1;
        Ok(plaintext)
    }
}

async fn read_record_from<R>(
    io: &mut R,
    cipher: &mut RecordCipher,
    max_record_len: usize,
) -> Result<Vec<u8>, SessionError>
where
    R: AsyncRead + Unpin,
{
    let ciphertext = read_frame(io, max_record_len).await?;
    cipher.open(&ciphertext)
}

async fn write_record_to<W>(
    io: &mut W,
    cipher: &mut RecordCipher,
    plaintext: &[u8],
    max_record_len: usize,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let max_chunk = max_record_len - TAG_LEN;

    if plaintext.is_empty() {
        let ciphertext = cipher.seal(&[])?;
        write_frame(io, &ciphertext).await?;
    } else {
        // Oversized writes are chunked transparently; the peer reassembles
        // by reading successive records.
        for chunk in plaintext.chunks(max_chunk) {
            let ciphertext = cipher.seal(chunk)?;
            write_frame(io, &ciphertext).await?;
        }
    }

    io.flush().await?;
    Ok(())
}

struct SessionInner<S> {
    io: S,
    send: RecordCipher,
    recv: RecordCipher,
}

/// An established secure session.
///
/// Only produced by a successfully finalized handshake; owns the raw stream
/// and the session keys for its whole life.
pub struct SecureSession<S> {
    inner: Option<SessionInner<S>>,
    remote: PeerId,
    max_record_len: usize,
}

impl<S> SecureSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(io: S, keys: SessionKeys, remote: PeerId, max_record_len: usize) -> Self {
        // `keys` is consumed and zeroized on drop; the ciphers hold the
        // only remaining copies of the key material.
        Self {
            inner: Some(SessionInner {
                io,
                send: RecordCipher::new(&keys.send),
                recv: RecordCipher::new(&keys.recv),
            }),
            remote,
            max_record_len,
        }
    }

    /// The verified identity of the remote peer.
    pub fn remote_identity(&self) -> &PeerId {
        &self.remote
    }

    /// Encrypt and send `plaintext`, chunking if it exceeds the maximum
    /// record size. Either every produced record is written or an error is
    /// returned and the session must be considered broken.
    pub async fn write_record(&mut self, plaintext: &[u8]) -> Result<(), SessionError> {
        let max = self.max_record_len;
        let inner = self.inner.as_mut().ok_or(SessionError::Closed)?;
        write_record_to(&mut inner.io, &mut inner.send, plaintext, max).await
    }

    /// Read and decrypt the next record.
    pub async fn read_record(&mut self) -> Result<Vec<u8>, SessionError> {
        let max = self.max_record_len;
        let inner = self.inner.as_mut().ok_or(SessionError::Closed)?;
        read_record_from(&mut inner.io, &mut inner.recv, max).await
    }

    /// Shut the stream down and drop the session keys. Idempotent; any
    /// later operation fails with [`SessionError::Closed`].
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if let Some(mut inner) = self.inner.take() {
            inner.io.shutdown().await?;
        }
        Ok(())
    }

    /// Split into independently owned read and write halves for concurrent
    /// full-duplex use. Each half takes its direction's cipher state with
    /// it, so there is never more than one writer to a nonce counter.
    pub fn split(mut self) -> Result<(SecureReader<S>, SecureWriter<S>), SessionError> {
        let inner = self.inner.take().ok_or(SessionError::Closed)?;
        let (read_io, write_io) = tokio::io::split(inner.io);
        let reader = SecureReader {
            io: read_io,
            cipher: inner.recv,
            remote: self.remote.clone(),
            max_record_len: self.max_record_len,
        };
        let writer = SecureWriter {
            io: write_io,
            cipher: inner.send,
            remote: self.remote,
            max_record_len: self.max_record_len,
        };
        Ok((reader, writer))
    }
}

impl<S> std::fmt::Debug for SecureSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureSession")
            .field("remote", &self.remote)
            .field("max_record_len", &self.max_record_len)
            .field("open", &self.inner.is_some())
            .finish()
    }
}

/// The inbound half of a split session.
pub struct SecureReader<S> {
    io: ReadHalf<S>,
    cipher: RecordCipher,
    remote: PeerId,
    max_record_len: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureReader<S> {
    /// Read and decrypt the next record.
    pub async fn read_record(&mut self) -> Result<Vec<u8>, SessionError> {
        read_record_from(&mut self.io, &mut self.cipher, self.max_record_len).await
    }

    /// The verified identity of the remote peer.
    pub fn remote_identity(&self) -> &PeerId {
        &self.remote
    }
}

/// The outbound half of a split session.
pub struct SecureWriter<S> {
    io: WriteHalf<S>,
    cipher: RecordCipher,
    remote: PeerId,
    max_record_len: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureWriter<S> {
    /// Encrypt and send `plaintext`, chunking as needed.
    pub async fn write_record(&mut self, plaintext: &[u8]) -> Result<(), SessionError> {
        write_record_to(&mut self.io, &mut self.cipher, plaintext, self.max_record_len).await
    }

    /// Shut the outbound stream down.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        self.io.shutdown().await?;
        Ok(())
    }

    /// The verified identity of the remote peer.
    pub fn remote_identity(&self) -> &PeerId {
        &self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skerry_core::MAX_FRAME_LEN;

    fn test_keys() -> (SessionKeys, SessionKeys) {
        let a = SessionKeys { send: [0x11; 32], recv: [0x22; 32] };
        let b = SessionKeys { send: [0x22; 32], recv: [0x11; 32] };
        (a, b)
    }

    fn session_pair(
        max_record_len: usize,
    ) -> (SecureSession<tokio::io::DuplexStream>, SecureSession<tokio::io::DuplexStream>) {
        let (left, right) = tokio::io::duplex(1 << 20);
        let (keys_a, keys_b) = test_keys();
        let remote = PeerId::from_bytes(&[0u8; 32]);
        (
            SecureSession::new(left, keys_a, remote.clone(), max_record_len),
            SecureSession::new(right, keys_b, remote, max_record_len),
        )
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let (mut a, mut b) = session_pair(MAX_FRAME_LEN);

        a.write_record(b"hello record layer").await.unwrap();
        assert_eq!(b.read_record().await.unwrap(), b"hello record layer");

        b.write_record(b"right back at you").await.unwrap();
        assert_eq!(a.read_record().await.unwrap(), b"right back at you");
    }

    #[tokio::test]
    async fn test_empty_record_roundtrip() {
        let (mut a, mut b) = session_pair(MAX_FRAME_LEN);

        a.write_record(b"").await.unwrap();
        assert_eq!(b.read_record().await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_max_size_record_roundtrip() {
        let (mut a, mut b) = session_pair(MAX_FRAME_LEN);

        let payload = vec![0xa5u8; MAX_FRAME_LEN - TAG_LEN];
        a.write_record(&payload).await.unwrap();
        assert_eq!(b.read_record().await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_oversized_write_is_chunked() {
        let (mut a, mut b) = session_pair(256);

        let payload: Vec<u8> = (0..2048u32).map(|i| i as u8).collect();
        a.write_record(&payload).await.unwrap();

        let mut reassembled = Vec::new();
        while reassembled.len() < payload.len() {
            let chunk = b.read_record().await.unwrap();
            assert!(chunk.len() <= 256 - TAG_LEN);
            reassembled.extend_from_slice(&chunk);
        }
        assert_eq!(reassembled, payload);
    }

    #[tokio::test]
    async fn test_tampered_record_rejected() {
        let (mut raw, right) = tokio::io::duplex(1 << 16);

        // Seal a record with the peer's key, corrupt one ciphertext byte,
        // and deliver the raw frame.
        let mut send = RecordCipher::new(&[0x11; 32]);
        let mut ciphertext = send.seal(b"sensitive data").unwrap();
        ciphertext[0] ^= 0xff;
        write_frame(&mut raw, &ciphertext).await.unwrap();
        raw.flush().await.unwrap();

        let (_, keys_b) = test_keys();
        let remote = PeerId::from_bytes(&[0u8; 32]);
        let mut receiver = SecureSession::new(right, keys_b, remote, MAX_FRAME_LEN);
        assert!(matches!(
            receiver.read_record().await,
            Err(SessionError::Decryption)
        ));
    }

    #[tokio::test]
    async fn test_replayed_record_rejected() {
        let (mut raw, right) = tokio::io::duplex(1 << 16);

        // Capture one valid record and deliver it twice.
        let mut send = RecordCipher::new(&[0x11; 32]);
        let ciphertext = send.seal(b"important message").unwrap();
        write_frame(&mut raw, &ciphertext).await.unwrap();
        write_frame(&mut raw, &ciphertext).await.unwrap();
        raw.flush().await.unwrap();

        let (_, keys_b) = test_keys();
        let remote = PeerId::from_bytes(&[0u8; 32]);
        let mut receiver = SecureSession::new(right, keys_b, remote, MAX_FRAME_LEN);

        assert_eq!(receiver.read_record().await.unwrap(), b"important message");
        // The replay authenticates against nonce 1, not 0, and fails.
        assert!(matches!(
            receiver.read_record().await,
            Err(SessionError::Decryption)
        ));
    }

    #[tokio::test]
    async fn test_oversize_claim_rejected_before_read() {
        let (mut raw, right) = tokio::io::duplex(1 << 16);

        // A forged prefix claiming 4096 bytes; no payload follows.
        raw.write_all(&4096u16.to_be_bytes()).await.unwrap();
        raw.flush().await.unwrap();

        let (_, keys_b) = test_keys();
        let remote = PeerId::from_bytes(&[0u8; 32]);
        let mut receiver = SecureSession::new(right, keys_b, remote, 1024);
        assert!(matches!(
            receiver.read_record().await,
            Err(SessionError::RecordTooLarge { len: 4096, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_counter_rejected() {
        let (mut a, mut b) = session_pair(MAX_FRAME_LEN);

        // Writer encrypts two records but the reader only sees the second:
        // its counter no longer matches and the record fails to open.
        a.write_record(b"first").await.unwrap();
        a.write_record(b"second").await.unwrap();

        let first = b.read_record().await.unwrap();
        assert_eq!(first, b"first");

        // Simulate a skipped record by advancing the reader's counter.
        if let Some(inner) = b.inner.as_mut() {
            inner.recv.nonce += 1;
        }
        assert!(matches!(
            b.read_record().await,
            Err(SessionError::Decryption)
        ));
    }

    #[tokio::test]
    async fn test_nonce_exhaustion_rejected() {
        let (mut a, _b) = session_pair(MAX_FRAME_LEN);

        if let Some(inner) = a.inner.as_mut() {
            inner.send.nonce = u64::MAX;
        }
        assert!(matches!(
            a.write_record(b"one too many").await,
            Err(SessionError::NonceExhausted)
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut a, _b) = session_pair(MAX_FRAME_LEN);

        a.close().await.unwrap();
        a.close().await.unwrap();

        assert!(matches!(
            a.write_record(b"after close").await,
            Err(SessionError::Closed)
        ));
        assert!(matches!(a.read_record().await, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_split_duplex() {
        let (a, b) = session_pair(MAX_FRAME_LEN);
        let (mut a_read, mut a_write) = a.split().unwrap();
        let (mut b_read, mut b_write) = b.split().unwrap();

        a_write.write_record(b"ping").await.unwrap();
        b_write.write_record(b"pong").await.unwrap();

        assert_eq!(b_read.read_record().await.unwrap(), b"ping");
        assert_eq!(a_read.read_record().await.unwrap(), b"pong");
    }
}
