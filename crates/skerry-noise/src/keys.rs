//! X25519 keypairs and derived session keys.
//!
//! Every handshake attempt generates two fresh X25519 keypairs: an ephemeral
//! one (forward secrecy) and a static one (authenticated by the long-term
//! identity key). Neither outlives the attempt; secrets are zeroized on drop.

use rand::rngs::OsRng;
use skerry_core::DH_LEN;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An X25519 keypair owned by a single handshake attempt.
///
/// Backed by [`StaticSecret`] rather than `EphemeralSecret` because the XX
/// message pattern performs two DH operations with the same ephemeral key;
/// the secret still zeroizes on drop.
pub(crate) struct DhKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl DhKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub(crate) fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public key bytes as sent on the wire.
    pub(crate) fn public_bytes(&self) -> [u8; DH_LEN] {
        *self.public.as_bytes()
    }

    /// Diffie-Hellman with a remote public key.
    pub(crate) fn diffie_hellman(&self, their_public: &PublicKey) -> SharedSecret {
        self.secret.diffie_hellman(their_public)
    }
}

/// Directional symmetric keys for an established session.
///
/// Produced exactly once, by [`crate::Handshake::finalize`], already oriented
/// for the local role: `send` protects outbound records, `recv` verifies
/// inbound ones. Both keys are zeroized on drop; the record layer consumes
/// this value when the session is constructed, so the raw bytes never
/// outlive session setup.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub(crate) send: [u8; 32],
    pub(crate) recv: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material.
        f.debug_struct("SessionKeys")
            .field("send", &"[redacted]")
            .field("recv", &"[redacted]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_agreement() {
        let a = DhKeypair::generate();
        let b = DhKeypair::generate();

        let ab = a.diffie_hellman(&PublicKey::from(b.public_bytes()));
        let ba = b.diffie_hellman(&PublicKey::from(a.public_bytes()));
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn keypairs_are_unique() {
        let a = DhKeypair::generate();
        let b = DhKeypair::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }
}
