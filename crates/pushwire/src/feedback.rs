//! Feedback client: drains the list of tokens the service stopped
//! delivering to.
//!
//! The feedback server writes every record it has and then closes the
//! connection. There is nothing to send and nothing to retry: end of stream
//! is the normal way a session ends.

use std::time::Duration;

use bytes::{Buf, BytesMut};

use pushwire_core::config::FeedbackConfig;
use pushwire_core::wire::{WireError, FEEDBACK_HEADER_LEN};
use pushwire_core::{Endpoint, Environment, Error, FeedbackRecord, Result};

use crate::transport::{ConnectionState, Connector, ReadOutcome, SecureStream};

/// Default bound on one read from the feedback server.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 4096;

/// Outcome of [`FeedbackClient::read_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackRead {
    Record(FeedbackRecord),
    /// Part of a record arrived, then nothing for a whole read timeout.
    Pending,
    /// The server has nothing more to send.
    Eof,
}

pub struct FeedbackClient<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    /// Received bytes not yet decoded into a record.
    inbox: BytesMut,
    read_timeout: Duration,
    /// Cap used by [`FeedbackClient::drain`]. 0 = no cap.
    max_records: usize,
    span: tracing::Span,
}

impl<C: Connector> FeedbackClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
            inbox: BytesMut::with_capacity(READ_CHUNK),
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_records: 0,
            span: tracing::info_span!("feedback_client"),
        }
    }

    pub fn from_config(connector: C, config: &FeedbackConfig) -> Self {
        Self::new(connector)
            .with_read_timeout(config.read_timeout())
            .with_max_records(config.max_records)
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// Log under the caller's span instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub async fn connect(&mut self, identity: &C::Identity, endpoint: &Endpoint) -> Result<()> {
        self.disconnect();
        match self.connector.connect(endpoint, identity).await {
            Ok(stream) => {
                self.stream = Some(stream);
                tracing::info!(parent: &self.span, %endpoint, "connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, %endpoint, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Connect to the well-known feedback server for `environment`.
    pub async fn connect_environment(
        &mut self,
        identity: &C::Identity,
        environment: Environment,
    ) -> Result<()> {
        self.connect(identity, &Endpoint::feedback(environment)).await
    }

    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.disconnect();
            tracing::debug!(parent: &self.span, "disconnected");
        }
        self.inbox.clear();
    }

    /// Read the next record.
    ///
    /// [`FeedbackRead::Eof`] means the server closed cleanly, or stayed
    /// silent for the whole read timeout with nothing buffered; the stream
    /// is dropped either way. [`FeedbackRead::Pending`] means the timeout
    /// hit in the middle of a record: the connection and the partial bytes
    /// are kept, and calling again continues the record.
    pub async fn read_next(&mut self) -> Result<FeedbackRead> {
        loop {
            if let Some(record) = self.decode_buffered()? {
                return Ok(FeedbackRead::Record(record));
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            match stream.read(READ_CHUNK, self.read_timeout).await {
                Ok(ReadOutcome::Data(bytes)) => self.inbox.extend_from_slice(&bytes),
                Ok(ReadOutcome::WouldBlock) if self.inbox.is_empty() => {
                    tracing::debug!(parent: &self.span, "idle, treating as end of stream");
                    self.disconnect();
                    return Ok(FeedbackRead::Eof);
                }
                Ok(ReadOutcome::WouldBlock) => {
                    tracing::trace!(parent: &self.span, buffered = self.inbox.len(), "partial record");
                    return Ok(FeedbackRead::Pending);
                }
                Ok(ReadOutcome::Closed) => {
                    let buffered = self.inbox.len();
                    let needed = self.needed();
                    self.disconnect();
                    if buffered == 0 {
                        tracing::debug!(parent: &self.span, "end of stream");
                        return Ok(FeedbackRead::Eof);
                    }
                    return Err(WireError::Truncated {
                        expected: needed,
                        found: buffered,
                    }
                    .into());
                }
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, "read failed");
                    self.disconnect();
                    return Err(e);
                }
            }
        }
    }

    /// Read records until end of stream or until `max` were read.
    /// `max == 0` means no limit.
    ///
    /// A server that goes quiet in the middle of a record for a whole read
    /// timeout has stalled: the stream is dropped and the partial record is
    /// reported as truncated.
    pub async fn read_all(&mut self, max: usize) -> Result<Vec<FeedbackRecord>> {
        let mut records = Vec::new();
        while max == 0 || records.len() < max {
            match self.read_next().await? {
                FeedbackRead::Record(record) => records.push(record),
                FeedbackRead::Eof => break,
                FeedbackRead::Pending => {
                    let buffered = self.inbox.len();
                    let needed = self.needed();
                    tracing::warn!(
                        parent: &self.span,
                        read = records.len(),
                        buffered,
                        "stalled mid-record"
                    );
                    self.disconnect();
                    return Err(WireError::Truncated {
                        expected: needed,
                        found: buffered,
                    }
                    .into());
                }
            }
        }
        tracing::info!(parent: &self.span, count = records.len(), "feedback read");
        Ok(records)
    }

    /// [`FeedbackClient::read_all`] with the configured cap.
    pub async fn drain(&mut self) -> Result<Vec<FeedbackRecord>> {
        let max = self.max_records;
        self.read_all(max).await
    }

    fn decode_buffered(&mut self) -> Result<Option<FeedbackRecord>> {
        match FeedbackRecord::decode(&self.inbox) {
            Ok((record, used)) => {
                self.inbox.advance(used);
                Ok(Some(record))
            }
            Err(WireError::Truncated { .. }) => Ok(None),
            Err(e) => {
                self.disconnect();
                Err(e.into())
            }
        }
    }

    /// Bytes the record at the front of the buffer occupies, as far as known.
    fn needed(&self) -> usize {
        match FeedbackRecord::decode(&self.inbox) {
            Err(WireError::Truncated { expected, .. }) => expected,
            _ => FEEDBACK_HEADER_LEN,
        }
    }
}
