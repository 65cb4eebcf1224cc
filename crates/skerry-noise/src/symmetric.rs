//! Transcript hashing and the handshake key schedule.
//!
//! [`SymmetricState`] is the shared heart of both handshake roles: a running
//! SHA-256 hash of every byte exchanged so far, plus an HKDF chaining key
//! that absorbs each DH result. Payloads are encrypted with the current
//! transcript hash as associated data, so a message only authenticates
//! against the exact exchange that preceded it. Splicing messages across
//! handshakes cannot produce a verifiable transcript.
//!
//! Both sides must perform identical mix operations in identical order or
//! their states diverge and the next AEAD operation fails.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::HandshakeError;
use crate::keys::SessionKeys;
use crate::Role;

/// Hash output and key length.
const HASH_LEN: usize = 32;

/// An AEAD key mixed from the transcript, with its nonce counter.
///
/// The counter resets whenever a new key is mixed and increments on every
/// operation, mirroring on both sides: the n-th encryption under a key on
/// one side pairs with the n-th decryption under that key on the other.
struct TranscriptCipher {
    key: Zeroizing<[u8; HASH_LEN]>,
    nonce: u64,
}

impl TranscriptCipher {
    fn aead(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
    }

    fn next_nonce(&mut self) -> Nonce {
        let mut bytes = [0u8; 12];
        bytes[4..].copy_from_slice(&self.nonce.to_le_bytes());
        self.nonce += 1;
        Nonce::from(bytes)
    }
}

/// Transcript hash + chaining key + current handshake AEAD key.
pub(crate) struct SymmetricState {
    ck: Zeroizing<[u8; HASH_LEN]>,
    h: [u8; HASH_LEN],
    cipher: Option<TranscriptCipher>,
}

impl SymmetricState {
    /// Initialize from the protocol name. Both sides start from the same
    /// constant, so incompatible protocol revisions diverge immediately.
    pub(crate) fn new(protocol_name: &[u8]) -> Self {
        let h: [u8; HASH_LEN] = Sha256::digest(protocol_name).into();
        Self {
            ck: Zeroizing::new(h),
            h,
            cipher: None,
        }
    }

    /// Absorb public data (raw keys, ciphertexts) into the transcript.
    pub(crate) fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }

    /// Absorb a DH result: advances the chaining key and installs a fresh
    /// handshake AEAD key with its nonce counter reset.
    pub(crate) fn mix_key(&mut self, ikm: &[u8]) {
        let hk = Hkdf::<Sha256>::new(Some(&self.ck[..]), ikm);
        let mut okm = Zeroizing::new([0u8; 2 * HASH_LEN]);
        hk.expand(&[], &mut okm[..])
            .expect("64 bytes is a valid HKDF-SHA256 output length");

        self.ck.copy_from_slice(&okm[..HASH_LEN]);
        let mut key = Zeroizing::new([0u8; HASH_LEN]);
        key.copy_from_slice(&okm[HASH_LEN..]);
        self.cipher = Some(TranscriptCipher { key, nonce: 0 });
    }

    /// Encrypt under the current handshake key, binding the transcript so
    /// far as associated data, then absorb the ciphertext.
    pub(crate) fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let ad = self.h;
        let cipher = self.cipher.as_mut().ok_or(HandshakeError::Encryption)?;
        let nonce = cipher.next_nonce();
        let ciphertext = cipher
            .aead()
            .encrypt(&nonce, Payload { msg: plaintext, aad: &ad })
            .map_err(|_| HandshakeError::Encryption)?;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    /// Decrypt and verify under the current handshake key, then absorb the
    /// ciphertext. A wrong key, a diverged transcript, or tampered bytes
    /// all fail authentication.
    pub(crate) fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let ad = self.h;
        let cipher = self.cipher.as_mut().ok_or(HandshakeError::Authentication)?;
        let nonce = cipher.next_nonce();
        let plaintext = cipher
            .aead()
            .decrypt(&nonce, Payload { msg: ciphertext, aad: &ad })
            .map_err(|_| HandshakeError::Authentication)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Derive the directional session keys from the final chaining key,
    /// oriented for `role`. Consumes the state; the transcript is frozen.
    pub(crate) fn split(self, role: Role) -> SessionKeys {
        let hk = Hkdf::<Sha256>::new(Some(&self.ck[..]), &[]);
        let mut okm = Zeroizing::new([0u8; 2 * HASH_LEN]);
        hk.expand(&[], &mut okm[..])
            .expect("64 bytes is a valid HKDF-SHA256 output length");

        let mut initiator_to_responder = [0u8; HASH_LEN];
        initiator_to_responder.copy_from_slice(&okm[..HASH_LEN]);
        let mut responder_to_initiator = [0u8; HASH_LEN];
        responder_to_initiator.copy_from_slice(&okm[HASH_LEN..]);

        match role {
            Role::Initiator => SessionKeys {
                send: initiator_to_responder,
                recv: responder_to_initiator,
            },
            Role::Responder => SessionKeys {
                send: responder_to_initiator,
                recv: initiator_to_responder,
            },
        }
    }

    /// The current transcript hash.
    #[cfg(test)]
    pub(crate) fn handshake_hash(&self) -> [u8; HASH_LEN] {
        self.h
    }
}
