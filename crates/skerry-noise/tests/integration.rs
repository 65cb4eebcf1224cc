//! End-to-end tests for secure channel establishment over in-memory streams.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::DuplexStream;

use skerry_noise::{
    HandshakeError, IdentityKeypair, MisbehaviorObserver, NoopObserver, PeerId, SecureSession,
    SecureTransport, SecureUpgrader, SessionError, TransportConfig,
};

fn test_addr() -> SocketAddr {
    "127.0.0.1:4433".parse().unwrap()
}

fn transport(identity: IdentityKeypair, config: TransportConfig) -> SecureTransport {
    SecureTransport::new(identity, config, Arc::new(NoopObserver)).unwrap()
}

/// Run a full outbound/inbound handshake pair over a duplex stream.
async fn establish(
    client_expects: Option<PeerId>,
    server_expects: Option<PeerId>,
) -> (
    Result<SecureSession<DuplexStream>, HandshakeError>,
    Result<SecureSession<DuplexStream>, HandshakeError>,
    PeerId,
    PeerId,
) {
    let client_identity = IdentityKeypair::generate();
    let server_identity = IdentityKeypair::generate();
    let client_id = client_identity.peer_id();
    let server_id = server_identity.peer_id();

    let client = transport(client_identity, TransportConfig::default());
    let server = transport(server_identity, TransportConfig::default());

    let (left, right) = tokio::io::duplex(64 * 1024);

    let server_task = tokio::spawn(async move {
        server.secure_inbound(right, test_addr(), server_expects).await
    });

    let client_result = client.secure_outbound(left, test_addr(), client_expects).await;
    let server_result = server_task.await.unwrap();

    (client_result, server_result, client_id, server_id)
}

#[tokio::test]
async fn test_ping_pong_end_to_end() {
    let (client, server, client_id, server_id) = establish(None, None).await;
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    // Both sides report the other's identity correctly
    assert_eq!(*client.remote_identity(), server_id);
    assert_eq!(*server.remote_identity(), client_id);

    client.write_record(b"ping").await.unwrap();
    assert_eq!(server.read_record().await.unwrap(), b"ping");

    server.write_record(b"pong").await.unwrap();
    assert_eq!(client.read_record().await.unwrap(), b"pong");
}

#[tokio::test]
async fn test_expected_identity_accepted_both_ways() {
    let client_identity = IdentityKeypair::generate();
    let server_identity = IdentityKeypair::generate();
    let client_id = client_identity.peer_id();
    let server_id = server_identity.peer_id();

    let client = transport(client_identity, TransportConfig::default());
    let server = transport(server_identity, TransportConfig::default());

    let (left, right) = tokio::io::duplex(64 * 1024);
    let server_task =
        tokio::spawn(async move { server.secure_inbound(right, test_addr(), Some(client_id)).await });

    let client_session = client.secure_outbound(left, test_addr(), Some(server_id)).await;
    assert!(client_session.is_ok());
    assert!(server_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_identity_mismatch_on_initiator() {
    let stranger = IdentityKeypair::generate().peer_id();
    let (client, _server, _, server_id) = establish(Some(stranger.clone()), None).await;

    // The handshake mathematics succeed; the policy check fails.
    match client.unwrap_err() {
        HandshakeError::IdentityMismatch { expected, actual } => {
            assert_eq!(expected, stranger);
            assert_eq!(actual, server_id);
        }
        other => panic!("expected IdentityMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_split_session_full_duplex() {
    let (client, server, _, _) = establish(None, None).await;
    let (mut client_read, mut client_write) = client.unwrap().split().unwrap();
    let (mut server_read, mut server_write) = server.unwrap().split().unwrap();

    // Reader and writer run concurrently in each direction.
    let echo = tokio::spawn(async move {
        for _ in 0..10 {
            let message = server_read.read_record().await.unwrap();
            server_write.write_record(&message).await.unwrap();
        }
    });

    for i in 0..10u32 {
        let message = format!("message {i}");
        client_write.write_record(message.as_bytes()).await.unwrap();
        assert_eq!(client_read.read_record().await.unwrap(), message.as_bytes());
    }

    echo.await.unwrap();
}

#[tokio::test]
async fn test_large_write_chunked_across_records() {
    let (client, server, _, _) = establish(None, None).await;
    let mut client = client.unwrap();
    let mut server = server.unwrap();

    // Four times the maximum record size round-trips via chunking.
    let payload: Vec<u8> = (0..4 * 65536u32).map(|i| (i % 251) as u8).collect();

    let writer = tokio::spawn(async move {
        client.write_record(&payload).await.unwrap();
        payload
    });

    let mut reassembled = Vec::new();
    while reassembled.len() < 4 * 65536 {
        reassembled.extend_from_slice(&server.read_record().await.unwrap());
    }

    assert_eq!(reassembled, writer.await.unwrap());
}

#[tokio::test]
async fn test_record_over_receiver_limit_rejected() {
    let client_identity = IdentityKeypair::generate();
    let server_identity = IdentityKeypair::generate();

    let client = transport(client_identity, TransportConfig::default());
    // The server only accepts records up to 1 KiB.
    let server_config = TransportConfig { max_record_len: 1024, ..Default::default() };
    let server = transport(server_identity, server_config);

    let (left, right) = tokio::io::duplex(256 * 1024);
    let server_task =
        tokio::spawn(async move { server.secure_inbound(right, test_addr(), None).await });

    let mut client_session = client.secure_outbound(left, test_addr(), None).await.unwrap();
    let mut server_session = server_task.await.unwrap().unwrap();

    // One 32 KiB record from the client exceeds the server's limit.
    let oversized = vec![0x5au8; 32 * 1024];
    client_session.write_record(&oversized).await.unwrap();

    match server_session.read_record().await.unwrap_err() {
        SessionError::RecordTooLarge { len, max } => {
            assert_eq!(max, 1024);
            assert!(len > 1024);
        }
        other => panic!("expected RecordTooLarge, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let identity = IdentityKeypair::generate();
    let config = TransportConfig {
        handshake_timeout: Duration::from_millis(250),
        ..Default::default()
    };
    let client = transport(identity, config);

    // Nobody ever answers on the other end.
    let (left, _right) = tokio::io::duplex(64 * 1024);

    let err = client.secure_outbound(left, test_addr(), None).await.unwrap_err();
    assert!(matches!(err, HandshakeError::TimedOut));
}

/// Observer that records every report, for assertions.
struct RecordingObserver {
    reports: Mutex<Vec<(SocketAddr, String)>>,
}

impl MisbehaviorObserver for RecordingObserver {
    fn on_misbehavior(
        &self,
        remote: SocketAddr,
        protocol: &str,
        _error: &HandshakeError,
        _message: &str,
    ) {
        self.reports.lock().unwrap().push((remote, protocol.to_string()));
    }
}

#[tokio::test]
async fn test_inbound_failure_reported_to_observer() {
    use tokio::io::AsyncWriteExt;

    let identity = IdentityKeypair::generate();
    let observer = Arc::new(RecordingObserver { reports: Mutex::new(Vec::new()) });
    let server =
        SecureTransport::new(identity, TransportConfig::default(), observer.clone()).unwrap();

    let (mut left, right) = tokio::io::duplex(64 * 1024);

    let server_task =
        tokio::spawn(async move { server.secure_inbound(right, test_addr(), None).await });

    // A framed message that is not a valid first handshake message.
    left.write_all(&7u16.to_be_bytes()).await.unwrap();
    left.write_all(b"garbage").await.unwrap();
    left.flush().await.unwrap();

    let result = server_task.await.unwrap();
    assert!(result.is_err());

    let reports = observer.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, test_addr());
    assert_eq!(reports[0].1, "skerry-security-handshake");
}

#[tokio::test]
async fn test_outbound_failure_not_reported() {
    use tokio::io::AsyncWriteExt;

    let identity = IdentityKeypair::generate();
    let observer = Arc::new(RecordingObserver { reports: Mutex::new(Vec::new()) });
    let client =
        SecureTransport::new(identity, TransportConfig::default(), observer.clone()).unwrap();

    let (left, mut right) = tokio::io::duplex(64 * 1024);

    let client_task =
        tokio::spawn(async move { client.secure_outbound(left, test_addr(), None).await });

    // Answer msg1 with a framed garbage msg2.
    right.write_all(&5u16.to_be_bytes()).await.unwrap();
    right.write_all(b"bogus").await.unwrap();
    right.flush().await.unwrap();

    let result = client_task.await.unwrap();
    assert!(result.is_err());
    assert!(observer.reports.lock().unwrap().is_empty());
}
