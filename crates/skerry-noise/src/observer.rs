//! Misbehavior reporting for inbound handshake failures.
//!
//! A listener that accepts connections from unknown peers wants a record of
//! who failed the security handshake and why, without the security core
//! depending on any particular logging setup. The observer is injected into
//! [`crate::SecureTransport`] and invoked only for inbound failures; its
//! method is infallible by signature, so a broken observer can never change
//! a handshake result.

use std::net::SocketAddr;

use crate::error::HandshakeError;

/// Protocol tag passed to observers for handshake failures.
pub const HANDSHAKE_PROTOCOL_TAG: &str = "skerry-security-handshake";

/// Sink for reports about peers that failed the handshake.
pub trait MisbehaviorObserver: Send + Sync {
    /// Called once per failed inbound handshake, before the error is
    /// returned to the caller.
    fn on_misbehavior(
        &self,
        remote: SocketAddr,
        protocol: &str,
        error: &HandshakeError,
        message: &str,
    );
}

/// Observer that discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MisbehaviorObserver for NoopObserver {
    fn on_misbehavior(&self, _: SocketAddr, _: &str, _: &HandshakeError, _: &str) {}
}

/// Observer that emits a `tracing` warning per report.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MisbehaviorObserver for TracingObserver {
    fn on_misbehavior(
        &self,
        remote: SocketAddr,
        protocol: &str,
        error: &HandshakeError,
        message: &str,
    ) {
        tracing::warn!(%remote, protocol, %error, "{message}");
    }
}
