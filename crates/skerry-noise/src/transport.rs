//! The secure transport facade.
//!
//! [`SecureTransport`] is the entry point callers use: constructed once
//! around the local long-term identity, it upgrades raw connections into
//! [`SecureSession`]s by driving the handshake as initiator
//! ([`SecureUpgrader::secure_outbound`]) or responder
//! ([`SecureUpgrader::secure_inbound`]).
//!
//! Both operations are plain `async fn`s: dropping the future (for example
//! from a `tokio::select!` arm) aborts the handshake, and the owning types
//! zeroize any partially derived secrets. Independently of the caller, a
//! configured handshake timeout is always enforced.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skerry_core::{MAX_FRAME_LEN, TAG_LEN};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::error::HandshakeError;
use crate::framing::{read_frame, write_frame};
use crate::handshake::{Handshake, Role};
use crate::identity::{IdentityKeypair, PeerId};
use crate::observer::{MisbehaviorObserver, HANDSHAKE_PROTOCOL_TAG};
use crate::record::SecureSession;

/// Configuration for a [`SecureTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on a whole handshake attempt.
    pub handshake_timeout: Duration,
    /// Largest record (ciphertext including tag) accepted or produced.
    pub max_record_len: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            max_record_len: MAX_FRAME_LEN,
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<(), HandshakeError> {
        if self.max_record_len <= TAG_LEN {
            return Err(HandshakeError::Configuration(format!(
                "max_record_len {} leaves no room for the {TAG_LEN}-byte tag",
                self.max_record_len
            )));
        }
        if self.max_record_len > MAX_FRAME_LEN {
            return Err(HandshakeError::Configuration(format!(
                "max_record_len {} exceeds the framing limit {MAX_FRAME_LEN}",
                self.max_record_len
            )));
        }
        if self.handshake_timeout.is_zero() {
            return Err(HandshakeError::Configuration(
                "handshake_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Capability interface for securing raw connections.
///
/// Concrete handshake protocols live behind this seam; [`SecureTransport`]
/// is the implementation provided by this crate.
#[allow(async_fn_in_trait)]
pub trait SecureUpgrader {
    /// Run the handshake as initiator and return the secured session.
    ///
    /// If `expected_remote` is given, the connection is rejected unless the
    /// peer proves exactly that identity.
    async fn secure_outbound<S>(
        &self,
        io: S,
        remote_addr: SocketAddr,
        expected_remote: Option<PeerId>,
    ) -> Result<SecureSession<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;

    /// Run the handshake as responder. `expected_remote` of `None` accepts
    /// any identity, the usual mode for a public-facing listener.
    async fn secure_inbound<S>(
        &self,
        io: S,
        remote_addr: SocketAddr,
        expected_remote: Option<PeerId>,
    ) -> Result<SecureSession<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// Secure channel factory bound to a local identity.
pub struct SecureTransport {
    identity: IdentityKeypair,
    local_peer: PeerId,
    config: TransportConfig,
    observer: Arc<dyn MisbehaviorObserver>,
}

impl SecureTransport {
    /// Create a transport around the local identity keypair.
    pub fn new(
        identity: IdentityKeypair,
        config: TransportConfig,
        observer: Arc<dyn MisbehaviorObserver>,
    ) -> Result<Self, HandshakeError> {
        config.validate()?;
        let local_peer = identity.peer_id();
        Ok(Self { identity, local_peer, config, observer })
    }

    /// The local peer ID this transport authenticates as.
    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    async fn upgrade<S>(
        &self,
        mut io: S,
        role: Role,
        expected_remote: Option<PeerId>,
    ) -> Result<SecureSession<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut handshake = Handshake::new(role, &self.identity, expected_remote);

        timeout(self.config.handshake_timeout, drive(&mut io, &mut handshake))
            .await
            .map_err(|_| HandshakeError::TimedOut)??;

        let (keys, remote) = handshake.finalize()?;
        tracing::debug!(
            protocol = skerry_core::PROTOCOL_ID,
            local = %self.local_peer,
            %remote,
            ?role,
            "secure channel established"
        );

        Ok(SecureSession::new(io, keys, remote, self.config.max_record_len))
    }
}

impl SecureUpgrader for SecureTransport {
    async fn secure_outbound<S>(
        &self,
        io: S,
        _remote_addr: SocketAddr,
        expected_remote: Option<PeerId>,
    ) -> Result<SecureSession<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.upgrade(io, Role::Initiator, expected_remote).await
    }

    async fn secure_inbound<S>(
        &self,
        io: S,
        remote_addr: SocketAddr,
        expected_remote: Option<PeerId>,
    ) -> Result<SecureSession<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self.upgrade(io, Role::Responder, expected_remote).await {
            Ok(session) => Ok(session),
            Err(err) => {
                self.observer.on_misbehavior(
                    remote_addr,
                    HANDSHAKE_PROTOCOL_TAG,
                    &err,
                    "failed security handshake",
                );
                Err(err)
            }
        }
    }
}

/// Run the strictly alternating message exchange to completion.
async fn drive<S>(io: &mut S, handshake: &mut Handshake) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    loop {
        if let Some(message) = handshake.produce_next_message()? {
            write_frame(io, &message).await?;
            io.flush().await?;
        }
        if handshake.is_complete() {
            return Ok(());
        }
        let message = read_frame(io, MAX_FRAME_LEN).await?;
        handshake.consume_message(&message)?;
    }
}
