//! The authenticated handshake state machine.
//!
//! Pattern: XX-style three-message exchange over X25519, ChaCha20-Poly1305,
//! and SHA-256, carrying an Ed25519 identity proof in each encrypted payload.
//!
//! # Message Flow
//!
//! ```text
//! Initiator                                Responder
//!     |                                        |
//!     |  -> e                                  |  raw ephemeral key
//!     |--------------------------------------->|
//!     |                                        |
//!     |  <- e, ee, s, es, proof                |  ephemeral, static, identity
//!     |<---------------------------------------|
//!     |                                        |
//!     |  -> s, se, proof                       |  static, identity
//!     |--------------------------------------->|
//!     |                                        |
//!     [        session keys established        ]
//! ```
//!
//! Static keys travel encrypted, so identities are hidden from passive
//! observers. The proof payload carries the long-term Ed25519 key and its
//! signature over the X25519 static key; verifying it is what authenticates
//! the remote identity.
//!
//! The machine is single-use. Every validation failure moves it to `Failed`
//! permanently; the caller must tear down the connection and start over on a
//! fresh one.

use skerry_core::proof::IdentityProof;
use skerry_core::{DH_LEN, MSG1_LEN, MSG2_LEN, MSG3_LEN, PROTOCOL_NAME, TAG_LEN};
use x25519_dalek::PublicKey;

use crate::error::HandshakeError;
use crate::identity::{IdentityKeypair, PeerId, PublicIdentity};
use crate::keys::{DhKeypair, SessionKeys};
use crate::symmetric::SymmetricState;

/// Which side of the exchange this machine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the first message.
    Initiator,
    /// Waits for the first message.
    Responder,
}

/// Handshake progress.
///
/// Each role walks its own path through these states:
///
/// - Initiator: `Init -> SentEphemeral -> ReceivedStaticProof -> Complete`
/// - Responder: `Init -> ReceivedEphemeral -> SentStaticProof -> Complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    SentEphemeral,
    ReceivedEphemeral,
    SentStaticProof,
    ReceivedStaticProof,
    Complete,
    Failed,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Init => "Init",
            State::SentEphemeral => "SentEphemeral",
            State::ReceivedEphemeral => "ReceivedEphemeral",
            State::SentStaticProof => "SentStaticProof",
            State::ReceivedStaticProof => "ReceivedStaticProof",
            State::Complete => "Complete",
            State::Failed => "Failed",
        }
    }
}

/// A single handshake attempt.
///
/// Owns all key material for the attempt: a fresh X25519 ephemeral and
/// static keypair, the running transcript, and (once complete) the inputs
/// to session key derivation. Dropping the machine at any point zeroizes
/// its secrets.
pub struct Handshake {
    role: Role,
    state: State,
    symmetric: SymmetricState,
    local_static: DhKeypair,
    local_ephemeral: DhKeypair,
    /// Pre-signed identity proof for the local static key.
    local_proof: [u8; skerry_core::proof::PROOF_LEN],
    remote_ephemeral: Option<PublicKey>,
    remote_identity: Option<PublicIdentity>,
    expected_remote: Option<PeerId>,
}

impl Handshake {
    /// Start a handshake attempt.
    ///
    /// Generates the per-attempt X25519 keypairs and signs the static key
    /// with the long-term identity. If `expected_remote` is given, the peer
    /// must prove exactly that identity or [`Handshake::finalize`] fails.
    pub fn new(role: Role, identity: &IdentityKeypair, expected_remote: Option<PeerId>) -> Self {
        let local_static = DhKeypair::generate();
        let local_ephemeral = DhKeypair::generate();

        let proof = IdentityProof {
            identity_key: identity.public_key_bytes(),
            signature: identity.sign_static_key(&local_static.public_bytes()),
        };

        Self {
            role,
            state: State::Init,
            symmetric: SymmetricState::new(PROTOCOL_NAME),
            local_static,
            local_ephemeral,
            local_proof: proof.encode(),
            remote_ephemeral: None,
            remote_identity: None,
            expected_remote,
        }
    }

    /// Whether both the local message obligations and the remote proofs are
    /// done and [`Handshake::finalize`] may be called.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Serialize the next outbound handshake message, if one is owed.
    ///
    /// Returns `Ok(None)` while waiting for the remote side or once the
    /// exchange is complete.
    pub fn produce_next_message(&mut self) -> Result<Option<Vec<u8>>, HandshakeError> {
        match (self.role, self.state) {
            (Role::Initiator, State::Init) => self.write_msg1().map(Some),
            (Role::Initiator, State::ReceivedStaticProof) => self.write_msg3().map(Some),
            (Role::Responder, State::ReceivedEphemeral) => self.write_msg2().map(Some),
            (_, State::Failed) => Err(HandshakeError::InvalidState {
                op: "produce message",
                state: self.state.name(),
            }),
            // Waiting on the remote side, or already complete.
            _ => Ok(None),
        }
    }

    /// Parse and validate an inbound handshake message.
    ///
    /// Performs, in order: format validation, DH mixing, transcript update,
    /// and (for static-key messages) proof decryption and identity
    /// verification. Any failure is terminal for this attempt.
    pub fn consume_message(&mut self, message: &[u8]) -> Result<(), HandshakeError> {
        let result = match (self.role, self.state) {
            (Role::Responder, State::Init) => self.read_msg1(message),
            (Role::Initiator, State::SentEphemeral) => self.read_msg2(message),
            (Role::Responder, State::SentStaticProof) => self.read_msg3(message),
            _ => Err(HandshakeError::InvalidState {
                op: "consume message",
                state: self.state.name(),
            }),
        };
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    /// Derive session keys and return the verified remote identity.
    ///
    /// Only valid once the machine is `Complete`. Consumes the attempt;
    /// the transcript is frozen and all intermediate secrets are dropped.
    pub fn finalize(self) -> Result<(SessionKeys, PeerId), HandshakeError> {
        if self.state != State::Complete {
            return Err(HandshakeError::InvalidState {
                op: "finalize",
                state: self.state.name(),
            });
        }

        let remote = self
            .remote_identity
            .as_ref()
            .ok_or(HandshakeError::InvalidSignature)?
            .peer_id();

        // Cryptographic authentication proved which key the peer holds; this
        // checks it is also the key the caller asked for.
        if let Some(expected) = &self.expected_remote {
            if *expected != remote {
                return Err(HandshakeError::IdentityMismatch {
                    expected: expected.clone(),
                    actual: remote,
                });
            }
        }

        let keys = self.symmetric.split(self.role);
        Ok((keys, remote))
    }

    // msg1: -> e
    fn write_msg1(&mut self) -> Result<Vec<u8>, HandshakeError> {
        let e = self.local_ephemeral.public_bytes();
        self.symmetric.mix_hash(&e);
        self.state = State::SentEphemeral;
        Ok(e.to_vec())
    }

    // msg1: <- e
    fn read_msg1(&mut self, message: &[u8]) -> Result<(), HandshakeError> {
        if message.len() != MSG1_LEN {
            return Err(HandshakeError::Malformed("first message must be a raw ephemeral key"));
        }
        let mut e = [0u8; DH_LEN];
        e.copy_from_slice(message);
        self.symmetric.mix_hash(&e);
        self.remote_ephemeral = Some(PublicKey::from(e));
        self.state = State::ReceivedEphemeral;
        Ok(())
    }

    // msg2: -> e, ee, s, es, proof
    fn write_msg2(&mut self) -> Result<Vec<u8>, HandshakeError> {
        let re = self.remote_ephemeral()?;

        let mut out = Vec::with_capacity(MSG2_LEN);

        let e = self.local_ephemeral.public_bytes();
        self.symmetric.mix_hash(&e);
        out.extend_from_slice(&e);

        // ee
        let dh = self.local_ephemeral.diffie_hellman(&re);
        self.symmetric.mix_key(dh.as_bytes());

        let encrypted_static = self
            .symmetric
            .encrypt_and_hash(&self.local_static.public_bytes())?;
        out.extend_from_slice(&encrypted_static);

        // es
        let dh = self.local_static.diffie_hellman(&re);
        self.symmetric.mix_key(dh.as_bytes());

        let encrypted_proof = self.symmetric.encrypt_and_hash(&self.local_proof)?;
        out.extend_from_slice(&encrypted_proof);

        self.state = State::SentStaticProof;
        Ok(out)
    }

    // msg2: <- e, ee, s, es, proof
    fn read_msg2(&mut self, message: &[u8]) -> Result<(), HandshakeError> {
        if message.len() != MSG2_LEN {
            return Err(HandshakeError::Malformed("second message has wrong length"));
        }
        let (e_bytes, rest) = message.split_at(DH_LEN);
        let (encrypted_static, encrypted_proof) = rest.split_at(DH_LEN + TAG_LEN);

        let mut e = [0u8; DH_LEN];
        e.copy_from_slice(e_bytes);
        self.symmetric.mix_hash(&e);
        let re = PublicKey::from(e);
        self.remote_ephemeral = Some(re);

        // ee
        let dh = self.local_ephemeral.diffie_hellman(&re);
        self.symmetric.mix_key(dh.as_bytes());

        let rs = self.decrypt_remote_static(encrypted_static)?;

        // es
        let dh = self.local_ephemeral.diffie_hellman(&rs);
        self.symmetric.mix_key(dh.as_bytes());

        self.verify_remote_proof(encrypted_proof, &rs)?;
        self.state = State::ReceivedStaticProof;
        Ok(())
    }

    // msg3: -> s, se, proof
    fn write_msg3(&mut self) -> Result<Vec<u8>, HandshakeError> {
        let re = self.remote_ephemeral()?;

        let mut out = Vec::with_capacity(MSG3_LEN);

        let encrypted_static = self
            .symmetric
            .encrypt_and_hash(&self.local_static.public_bytes())?;
        out.extend_from_slice(&encrypted_static);

        // se
        let dh = self.local_static.diffie_hellman(&re);
        self.symmetric.mix_key(dh.as_bytes());

        let encrypted_proof = self.symmetric.encrypt_and_hash(&self.local_proof)?;
        out.extend_from_slice(&encrypted_proof);

        self.state = State::Complete;
        Ok(out)
    }

    // msg3: <- s, se, proof
    fn read_msg3(&mut self, message: &[u8]) -> Result<(), HandshakeError> {
        if message.len() != MSG3_LEN {
            return Err(HandshakeError::Malformed("third message has wrong length"));
        }
        let (encrypted_static, encrypted_proof) = message.split_at(DH_LEN + TAG_LEN);

        let rs = self.decrypt_remote_static(encrypted_static)?;

        // se
        let dh = self.local_ephemeral.diffie_hellman(&rs);
        self.symmetric.mix_key(dh.as_bytes());

        self.verify_remote_proof(encrypted_proof, &rs)?;
        self.state = State::Complete;
        Ok(())
    }

    fn remote_ephemeral(&self) -> Result<PublicKey, HandshakeError> {
        self.remote_ephemeral
            .ok_or(HandshakeError::Malformed("remote ephemeral key not yet received"))
    }

    fn decrypt_remote_static(&mut self, ciphertext: &[u8]) -> Result<PublicKey, HandshakeError> {
        let plaintext = self.symmetric.decrypt_and_hash(ciphertext)?;
        let bytes: [u8; DH_LEN] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| HandshakeError::Malformed("static key has wrong length"))?;
        Ok(PublicKey::from(bytes))
    }

    fn verify_remote_proof(
        &mut self,
        ciphertext: &[u8],
        remote_static: &PublicKey,
    ) -> Result<(), HandshakeError> {
        let plaintext = self.symmetric.decrypt_and_hash(ciphertext)?;
        let proof = IdentityProof::decode(&plaintext)?;

        let identity = PublicIdentity::from_bytes(&proof.identity_key)
            .map_err(|_| HandshakeError::InvalidSignature)?;
        if !identity.verify_static_key(remote_static.as_bytes(), &proof.signature) {
            return Err(HandshakeError::InvalidSignature);
        }

        self.remote_identity = Some(identity);
        Ok(())
    }
}
