//! Core skerry protocol constants, wire framing, and payload layout.
//!
//! This crate provides:
//! - Length-prefixed frame encoding shared by handshake messages and records
//! - The fixed byte layout of the identity-proof handshake payload
//! - Protocol constants (identifiers, size bounds, message sizes)
//!
//! Everything here is pure byte manipulation: no I/O, no cryptography. The
//! decode paths must never panic on arbitrary input.

#![forbid(unsafe_code)]

pub mod frame;
pub mod proof;

/// Protocol identifier advertised during higher-level protocol negotiation,
/// before any handshake bytes are exchanged.
pub const PROTOCOL_ID: &str = "/skerry/noise/1";

/// Full protocol name. Seeds the handshake transcript hash; changing it is a
/// wire-compatibility break.
pub const PROTOCOL_NAME: &[u8] = b"skerry/noise-xx/25519-chacha-sha256/1";

/// Domain separator prepended to the X25519 static public key before it is
/// signed by the long-term identity key.
pub const PROOF_DOMAIN: &[u8] = b"skerry-noise-static-key:";

/// X25519 public key length.
pub const DH_LEN: usize = 32;

/// Poly1305 authentication tag length.
pub const TAG_LEN: usize = 16;

/// Largest payload a single frame can carry (u16 length prefix).
pub const MAX_FRAME_LEN: usize = 65535;

/// Handshake message 1 (initiator -> responder): raw ephemeral key.
pub const MSG1_LEN: usize = DH_LEN;

/// Handshake message 2 (responder -> initiator): raw ephemeral key,
/// encrypted static key, encrypted identity proof.
pub const MSG2_LEN: usize = DH_LEN + (DH_LEN + TAG_LEN) + (proof::PROOF_LEN + TAG_LEN);

/// Handshake message 3 (initiator -> responder): encrypted static key,
/// encrypted identity proof.
pub const MSG3_LEN: usize = (DH_LEN + TAG_LEN) + (proof::PROOF_LEN + TAG_LEN);
