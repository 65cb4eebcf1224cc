//! Identity-proof payload layout.
//!
//! The second and third handshake messages carry a proof that binds the
//! sender's long-term Ed25519 identity to the X25519 static key used in the
//! exchange. On the wire the proof is a fixed 96-byte layout, AEAD-encrypted
//! by the handshake:
//!
//! ```text
//! [identity public key: 32 bytes][signature: 64 bytes]
//! ```
//!
//! The signature covers `PROOF_DOMAIN || x25519_static_public`; verification
//! happens in the handshake layer, which holds the keys. This module only
//! deals in bytes.

use crate::DH_LEN;

/// Ed25519 public key length.
pub const IDENTITY_KEY_LEN: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Total payload length.
pub const PROOF_LEN: usize = IDENTITY_KEY_LEN + SIGNATURE_LEN;

/// Payload decode errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProofError {
    /// The payload is not exactly [`PROOF_LEN`] bytes.
    #[error("identity proof must be {PROOF_LEN} bytes, got {0}")]
    BadLength(usize),
}

/// Decoded identity-proof payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProof {
    /// The sender's long-term Ed25519 public key.
    pub identity_key: [u8; IDENTITY_KEY_LEN],
    /// Signature over the domain-separated X25519 static public key.
    pub signature: [u8; SIGNATURE_LEN],
}

impl IdentityProof {
    /// Serialize to the fixed wire layout.
    pub fn encode(&self) -> [u8; PROOF_LEN] {
        let mut out = [0u8; PROOF_LEN];
        out[..IDENTITY_KEY_LEN].copy_from_slice(&self.identity_key);
        out[IDENTITY_KEY_LEN..].copy_from_slice(&self.signature);
        out
    }

    /// Parse from the wire. Strict: the payload must be exactly [`PROOF_LEN`]
    /// bytes, trailing data is a protocol violation.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        if bytes.len() != PROOF_LEN {
            return Err(ProofError::BadLength(bytes.len()));
        }
        let mut identity_key = [0u8; IDENTITY_KEY_LEN];
        identity_key.copy_from_slice(&bytes[..IDENTITY_KEY_LEN]);
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[IDENTITY_KEY_LEN..]);
        Ok(Self { identity_key, signature })
    }
}

/// Bytes the identity key signs: `PROOF_DOMAIN || static_public`.
pub fn signed_bytes(static_public: &[u8; DH_LEN]) -> Vec<u8> {
    let mut out = Vec::with_capacity(crate::PROOF_DOMAIN.len() + DH_LEN);
    out.extend_from_slice(crate::PROOF_DOMAIN);
    out.extend_from_slice(static_public);
    out
}
