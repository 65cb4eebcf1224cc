//! Secure channel establishment for skerry.
//!
//! This crate provides:
//! - Ed25519 identity keys and peer IDs
//! - A Noise-XX-style mutually authenticated handshake
//! - An encrypted, length-framed record layer over any ordered byte stream
//! - A transport facade that upgrades a raw connection to a verified session
//!
//! # Design
//!
//! Peers are identified by long-term Ed25519 keys. Each handshake attempt
//! uses fresh X25519 keypairs for the DH exchange; the long-term key signs
//! the per-handshake static key inside an encrypted payload, so identities
//! are proven without ever entering the DH and are hidden from passive
//! observers. Session keys are derived from a transcript-bound key schedule,
//! which ties them to every byte of the exchange that produced them.
//!
//! After the handshake the connection becomes a [`record::SecureSession`]:
//! a duplex stream of AEAD-protected records with strictly increasing,
//! session-private nonce counters per direction.

#![forbid(unsafe_code)]

pub mod error;
pub mod handshake;
pub mod identity;
pub mod keys;
pub mod observer;
pub mod record;
pub mod transport;

mod framing;
mod symmetric;

pub use skerry_core::PROTOCOL_ID;

pub use error::{HandshakeError, SessionError};
pub use handshake::{Handshake, Role};
pub use identity::{IdentityKeypair, PeerId, PublicIdentity};
pub use keys::SessionKeys;
pub use observer::{MisbehaviorObserver, NoopObserver, TracingObserver};
pub use record::{SecureReader, SecureSession, SecureWriter};
pub use transport::{SecureTransport, SecureUpgrader, TransportConfig};
