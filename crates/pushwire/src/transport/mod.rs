//! Secure stream abstraction.
//!
//! The TLS handshake, certificate handling and socket plumbing live behind
//! [`Connector`] and [`SecureStream`]. The clients in this crate only ever
//! see bytes, timeouts, and the error taxonomy.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use pushwire_core::{Endpoint, Result};

pub mod memory;

/// Result of one bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// At least one byte, at most the requested length.
    Data(Bytes),
    /// Nothing arrived before the timeout. Not an error.
    WouldBlock,
    /// The peer closed the stream cleanly.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// An established, authenticated byte stream.
pub trait SecureStream: Send {
    /// Read up to `max_len` bytes, waiting at most `timeout`.
    fn read(
        &mut self,
        max_len: usize,
        timeout: Duration,
    ) -> impl Future<Output = Result<ReadOutcome>> + Send;

    /// Write `bytes`, returning how many were accepted. Fewer than
    /// `bytes.len()` means the stream is no longer usable.
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Tear the stream down. Must not block and must be safe to call twice.
    fn disconnect(&mut self);
}

/// Opens secure streams with a client identity.
///
/// The identity is opaque here. It is stored by the clients so that a
/// reconnect can hand the exact same value back.
pub trait Connector: Send + Sync {
    type Identity: Clone + Send + Sync;
    type Stream: SecureStream;

    fn connect(
        &self,
        endpoint: &Endpoint,
        identity: &Self::Identity,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}
