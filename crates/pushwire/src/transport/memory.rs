//! In-process loopback transport.
//!
//! [`MemoryConnector`] plays the server side of a push or feedback
//! connection: it records every byte the client writes, replays bytes the
//! test queues with [`MemoryConnector::respond`], and injects connect and
//! write failures on demand. Clones share state, so a test keeps one clone
//! and hands the other to the client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;
use tokio::time::Instant;

use pushwire_core::wire::{apn_status, ErrorFrame};
use pushwire_core::{ApnError, Endpoint, Error, FeedbackRecord, IoError, Result};

use super::{Connector, ReadOutcome, SecureStream};

/// Identity accepted by the memory transport. Only its label is kept.
pub type MemoryIdentity = String;

#[derive(Default)]
struct Shared {
    /// Bumped on every successful connect. Streams from older generations are dead.
    generation: u64,
    connected: bool,

    connect_attempts: usize,
    disconnects: usize,
    last_endpoint: Option<Endpoint>,
    last_identity: Option<MemoryIdentity>,
    fail_connects: VecDeque<Error>,

    inbound: VecDeque<u8>,
    closing: bool,
    next_inbound: VecDeque<u8>,
    next_closing: bool,

    writes: Vec<Bytes>,
    write_limit: Option<usize>,
    fail_writes: VecDeque<Error>,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ────────────────────────────────────────────────────────────

    /// Queue bytes for the client to read. Goes to the open connection, or to
    /// the next one if none is open.
    pub fn respond(&self, bytes: &[u8]) {
        {
            let mut shared = self.lock();
            if shared.connected {
                shared.inbound.extend(bytes);
            } else {
                shared.next_inbound.extend(bytes);
            }
        }
        self.notify.notify_one();
    }

    /// Queue an error response for `identifier`.
    pub fn respond_error(&self, error: ApnError, identifier: u32) {
        let frame = ErrorFrame {
            status: apn_status(error),
            identifier,
        };
        self.respond(&frame.encode());
    }

    /// Queue feedback records, as the feedback service would send them.
    pub fn respond_feedback(&self, records: &[FeedbackRecord]) -> Result<()> {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend(record.encode()?);
        }
        self.respond(&bytes);
        Ok(())
    }

    /// Close the connection cleanly once queued bytes have been read.
    pub fn close(&self) {
        {
            let mut shared = self.lock();
            if shared.connected {
                shared.closing = true;
            } else {
                shared.next_closing = true;
            }
        }
        self.notify.notify_one();
    }

    /// Abort the open connection immediately. Unread bytes are lost.
    pub fn drop_connection(&self) {
        {
            let mut shared = self.lock();
            shared.generation += 1;
            shared.connected = false;
            shared.inbound.clear();
            shared.closing = false;
        }
        self.notify.notify_one();
    }

    /// The next connect attempt fails with `error`.
    pub fn fail_next_connect(&self, error: Error) {
        self.lock().fail_connects.push_back(error);
    }

    /// The next write fails with `error` without accepting any byte.
    pub fn fail_next_write(&self, error: Error) {
        self.lock().fail_writes.push_back(error);
    }

    /// The next write accepts at most `limit` bytes.
    pub fn short_write_next(&self, limit: usize) {
        self.lock().write_limit = Some(limit);
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }

    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.lock().last_endpoint.clone()
    }

    pub fn last_identity(&self) -> Option<MemoryIdentity> {
        self.lock().last_identity.clone()
    }

    /// Every accepted write, in order, across all connections.
    pub fn writes(&self) -> Vec<Bytes> {
        self.lock().writes.clone()
    }

    /// All accepted bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.lock().writes.iter().flat_map(|w| w.iter().copied()).collect()
    }
}

impl Connector for MemoryConnector {
    type Identity = MemoryIdentity;
    type Stream = MemoryStream;

    async fn connect(&self, endpoint: &Endpoint, identity: &MemoryIdentity) -> Result<MemoryStream> {
        let generation = {
            let mut guard = self.lock();
            let shared = &mut *guard;
            shared.connect_attempts += 1;
            shared.last_endpoint = Some(endpoint.clone());
            shared.last_identity = Some(identity.clone());
            if let Some(error) = shared.fail_connects.pop_front() {
                return Err(error);
            }
            shared.generation += 1;
            shared.connected = true;
            shared.inbound = std::mem::take(&mut shared.next_inbound);
            shared.closing = std::mem::take(&mut shared.next_closing);
            shared.generation
        };
        Ok(MemoryStream {
            connector: self.clone(),
            generation,
            open: true,
        })
    }
}

/// Client end of a memory connection.
pub struct MemoryStream {
    connector: MemoryConnector,
    generation: u64,
    open: bool,
}

impl MemoryStream {
    fn is_current(&self, shared: &Shared) -> bool {
        self.open && shared.connected && shared.generation == self.generation
    }
}

impl SecureStream for MemoryStream {
    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<ReadOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut shared = self.connector.lock();
                if !self.is_current(&shared) {
                    return Err(IoError::ReadClosedAbort.into());
                }
                if !shared.inbound.is_empty() {
                    let n = max_len.min(shared.inbound.len());
                    let data: Vec<u8> = shared.inbound.drain(..n).collect();
                    return Ok(ReadOutcome::Data(Bytes::from(data)));
                }
                if shared.closing {
                    return Ok(ReadOutcome::Closed);
                }
            }
            let notified = self.connector.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(ReadOutcome::WouldBlock);
            }
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut shared = self.connector.lock();
        if !self.is_current(&shared) {
            return Err(IoError::WriteClosedAbort.into());
        }
        if shared.closing {
            return Err(IoError::WriteClosedGraceful.into());
        }
        if let Some(error) = shared.fail_writes.pop_front() {
            return Err(error);
        }
        let accepted = shared
            .write_limit
            .take()
            .map_or(bytes.len(), |limit| limit.min(bytes.len()));
        shared.writes.push(Bytes::copy_from_slice(&bytes[..accepted]));
        Ok(accepted)
    }

    fn disconnect(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut shared = self.connector.lock();
        if shared.connected && shared.generation == self.generation {
            shared.connected = false;
            shared.inbound.clear();
            shared.closing = false;
        }
        shared.disconnects += 1;
    }
}
