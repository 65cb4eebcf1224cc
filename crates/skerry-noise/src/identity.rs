//! Ed25519 identity keys and peer IDs.
//!
//! A **peer ID** is the base64url-encoded Ed25519 public key (32 bytes → 43
//! characters). It is the stable identity a peer keeps across connections;
//! everything else about a connection (addresses, ephemeral keys, session
//! keys) is throwaway.
//!
//! The identity key's only protocol duty is signing the domain-separated
//! X25519 static key of a handshake attempt (see [`crate::handshake`]). It
//! never participates in the DH exchange itself.
//!
//! # Example
//!
//! ```
//! use skerry_noise::identity::{IdentityKeypair, PeerId};
//!
//! // Generate a new keypair
//! let keypair = IdentityKeypair::generate();
//!
//! // The peer ID is the base64url-encoded public key
//! let peer_id = keypair.peer_id();
//! assert_eq!(PeerId::parse(peer_id.as_str()).unwrap(), peer_id);
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use skerry_core::proof::{signed_bytes, SIGNATURE_LEN};
use skerry_core::DH_LEN;
use thiserror::Error;
use zeroize::Zeroize;

/// The presented identity key bytes do not form a valid Ed25519 public key.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid identity key bytes")]
pub struct InvalidIdentityKey;

/// Peer ID: base64url-encoded Ed25519 public key.
///
/// 32 bytes encoded as 43 characters (no padding).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer ID from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a peer ID from its string representation.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .context("invalid base64url encoding")?;

        if bytes.len() != 32 {
            anyhow::bail!("invalid peer ID length: expected 32 bytes, got {}", bytes.len());
        }

        Ok(Self(s.to_string()))
    }

    /// Get the raw public key bytes.
    pub fn to_bytes(&self) -> Result<[u8; 32]> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .context("invalid base64url encoding")?;

        bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("invalid key length"))
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// Ed25519 identity keypair.
///
/// The signing key is zeroized on drop.
pub struct IdentityKeypair {
    signing_key: SigningKey,
}

impl IdentityKeypair {
    /// Generate a new random keypair using the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from raw signing key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        Self { signing_key }
    }

    /// The peer ID bound to this keypair.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_bytes(self.signing_key.verifying_key().as_bytes())
    }

    /// Get the public key bytes.
    pub fn public_key_bytes(&self) -> [u8; 32] {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Sign a handshake static key: the signature covers the
    /// domain-separated X25519 public key and binds it to this identity.
    pub fn sign_static_key(&self, static_public: &[u8; DH_LEN]) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(&signed_bytes(static_public)).to_bytes()
    }

    /// Save the private key to a file.
    ///
    /// Written with restricted permissions (0600 on Unix).
    pub fn save(&self, private_path: &Path) -> Result<()> {
        let mut private_bytes = self.signing_key.to_bytes();
        fs::write(private_path, private_bytes.as_slice()).context("failed to write private key")?;
        private_bytes.zeroize();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        Ok(())
    }

    /// Load a keypair from a private key file.
    pub fn load(private_path: &Path) -> Result<Self> {
        let bytes = fs::read(private_path).context("failed to read private key")?;

        if bytes.len() != 32 {
            anyhow::bail!("invalid private key length: expected 32 bytes, got {}", bytes.len());
        }

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes);

        let keypair = Self::from_bytes(&key_bytes);
        key_bytes.zeroize();

        Ok(keypair)
    }
}

/// Public identity (verifying key only).
///
/// What the handshake learns about the remote peer from a verified
/// identity proof.
pub struct PublicIdentity {
    verifying_key: VerifyingKey,
}

impl PublicIdentity {
    /// Create from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, InvalidIdentityKey> {
        let verifying_key = VerifyingKey::from_bytes(bytes).map_err(|_| InvalidIdentityKey)?;
        Ok(Self { verifying_key })
    }

    /// The peer ID for this identity.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_bytes(self.verifying_key.as_bytes())
    }

    /// Verify a static-key proof signature.
    pub fn verify_static_key(
        &self,
        static_public: &[u8; DH_LEN],
        signature: &[u8; SIGNATURE_LEN],
    ) -> bool {
        let sig = Signature::from_bytes(signature);
        self.verifying_key
            .verify(&signed_bytes(static_public), &sig)
            .is_ok()
    }
}
