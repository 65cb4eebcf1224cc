//! Error types for the secure channel.
//!
//! Every failure is surfaced to the caller as a typed result; nothing
//! security-relevant is swallowed. All handshake and session errors are
//! fatal for the connection they occurred on: callers must tear the
//! connection down rather than retry on the same stream.

use skerry_core::frame::FrameError;
use skerry_core::proof::ProofError;
use thiserror::Error;

use crate::identity::PeerId;

/// Errors during session establishment.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Bad local key material or configuration. Retrying with the same
    /// input cannot succeed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed message framing.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A handshake message does not have the structure required by the
    /// current state.
    #[error("malformed handshake message: {0}")]
    Malformed(&'static str),

    /// AEAD verification of a handshake message failed. Strongly suggests
    /// an adversarial or incompatible peer.
    #[error("handshake message failed authentication")]
    Authentication,

    /// Encrypting a handshake payload failed.
    #[error("handshake encryption failed")]
    Encryption,

    /// The identity-proof payload could not be parsed.
    #[error("invalid identity proof: {0}")]
    InvalidProof(#[from] ProofError),

    /// The identity-proof signature did not verify against the presented
    /// identity key.
    #[error("identity signature verification failed")]
    InvalidSignature,

    /// The handshake cryptography succeeded but the peer is not the one
    /// the caller asked for.
    #[error("remote identity {actual} does not match expected {expected}")]
    IdentityMismatch {
        /// The identity the caller required.
        expected: PeerId,
        /// The identity the peer actually proved.
        actual: PeerId,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("cannot {op} while handshake is in state {state}")]
    InvalidState {
        /// Operation that was attempted.
        op: &'static str,
        /// State the machine was in.
        state: &'static str,
    },

    /// The handshake did not complete within the configured timeout.
    #[error("handshake timed out")]
    TimedOut,

    /// Underlying stream failure.
    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors on an established session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A record failed AEAD verification: corruption, tampering, or a
    /// replayed/reordered record. The session must be closed.
    #[error("record failed authentication")]
    Decryption,

    /// The peer claimed a record larger than the configured maximum.
    #[error("record length {len} exceeds maximum {max}")]
    RecordTooLarge {
        /// Claimed length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The outbound nonce counter would wrap. The session has reached the
    /// end of its usable life.
    #[error("nonce space exhausted")]
    NonceExhausted,

    /// Encrypting a record failed.
    #[error("record encryption failed")]
    Encryption,

    /// The session was already closed.
    #[error("session is closed")]
    Closed,

    /// Underlying stream failure.
    #[error("I/O error on secure session: {0}")]
    Io(#[from] std::io::Error),
}
