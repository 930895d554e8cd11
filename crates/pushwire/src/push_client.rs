//! Push client: one secure stream to the push gateway.
//!
//! The protocol is asymmetric: an accepted notification gets no answer, a
//! rejected one gets a 6-byte error response and, usually, a closed
//! connection. Pushes therefore never wait for an outcome; callers poll
//! [`PushClient::read_failure`] between or after bursts of pushes.

use std::time::Duration;

use bytes::BytesMut;
use tokio::time::Instant;

use pushwire_core::config::PushConfig;
use pushwire_core::wire::{ErrorFrame, WireError, ERROR_FRAME_LEN};
use pushwire_core::{Endpoint, Environment, Error, Format, IoError, Notification, Result};

use crate::transport::{ConnectionState, Connector, ReadOutcome, SecureStream};

/// Default bound on one error-response poll.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct PushClient<C: Connector> {
    connector: C,
    identity: Option<C::Identity>,
    endpoint: Option<Endpoint>,
    stream: Option<C::Stream>,
    /// Bytes of an error response that has not fully arrived yet.
    inbox: BytesMut,
    read_timeout: Duration,
    span: tracing::Span,
}

impl<C: Connector> PushClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            identity: None,
            endpoint: None,
            stream: None,
            inbox: BytesMut::with_capacity(ERROR_FRAME_LEN),
            read_timeout: DEFAULT_READ_TIMEOUT,
            span: tracing::info_span!("push_client"),
        }
    }

    pub fn from_config(connector: C, config: &PushConfig) -> Self {
        Self::new(connector).with_read_timeout(config.read_timeout())
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Log under the caller's span instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn state(&self) -> ConnectionState {
        if self.stream.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    // ── Connection ───────────────────────────────────────────────────────────

    /// Open a stream to `endpoint`. An existing stream is closed first.
    /// The identity and endpoint are kept for [`PushClient::reconnect`].
    pub async fn connect(&mut self, identity: C::Identity, endpoint: Endpoint) -> Result<()> {
        self.disconnect();
        self.identity = Some(identity);
        self.endpoint = Some(endpoint);
        self.open().await
    }

    /// Connect to the well-known gateway for `environment`.
    pub async fn connect_environment(
        &mut self,
        identity: C::Identity,
        environment: Environment,
    ) -> Result<()> {
        self.connect(identity, Endpoint::push(environment)).await
    }

    /// Replace the stream with a fresh one to the same endpoint.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.open().await
    }

    /// Drop the stream if there is one.
    pub fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.disconnect();
            tracing::debug!(parent: &self.span, "disconnected");
        }
        self.inbox.clear();
    }

    async fn open(&mut self) -> Result<()> {
        let (Some(identity), Some(endpoint)) = (self.identity.as_ref(), self.endpoint.as_ref())
        else {
            return Err(Error::NotConnected);
        };
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

    // ── Push ─────────────────────────────────────────────────────────────────

    /// Encode and send one notification. Invalid notifications are rejected
    /// before anything is written.
    pub async fn push(&mut self, notification: &Notification, format: Format) -> Result<()> {
        let frame = notification.encode(format)?;
        self.write_frame(&frame).await?;
        tracing::trace!(
            parent: &self.span,
            identifier = notification.identifier,
            format = u8::from(format),
            len = frame.len(),
            "notification sent"
        );
        Ok(())
    }

    /// Send one pre-encoded frame.
    ///
    /// Any failure, including a partial write, drops the stream: the server
    /// may hold half a frame, so the connection cannot be trusted again.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let result = stream.write(frame).await;
        match result {
            Ok(written) if written == frame.len() => Ok(()),
            Ok(written) => {
                tracing::warn!(parent: &self.span, written, expected = frame.len(), "short write");
                self.disconnect();
                Err(IoError::ShortWrite {
                    written,
                    expected: frame.len(),
                }
                .into())
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "write failed");
                self.disconnect();
                Err(e)
            }
        }
    }

    // ── Failures ─────────────────────────────────────────────────────────────

    /// Poll for an error response.
    ///
    /// `Ok(None)` means nothing complete arrived within the read timeout,
    /// which is the normal outcome after successful pushes. A partial
    /// response is kept for the next call.
    pub async fn read_failure(&mut self) -> Result<Option<ErrorFrame>> {
        let deadline = Instant::now() + self.read_timeout;
        while self.inbox.len() < ERROR_FRAME_LEN {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            let want = ERROR_FRAME_LEN - self.inbox.len();
            match stream.read(want, remaining).await {
                Ok(ReadOutcome::Data(bytes)) if !bytes.is_empty() => {
                    self.inbox.extend_from_slice(&bytes);
                }
                Ok(ReadOutcome::Data(_)) | Ok(ReadOutcome::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                Ok(ReadOutcome::Closed) => {
                    let buffered = self.inbox.len();
                    self.disconnect();
                    tracing::debug!(parent: &self.span, buffered, "closed by server");
                    return Err(if buffered == 0 {
                        IoError::ReadClosedGraceful.into()
                    } else {
                        WireError::Truncated {
                            expected: ERROR_FRAME_LEN,
                            found: buffered,
                        }
                        .into()
                    });
                }
                Err(e) => {
                    self.disconnect();
                    return Err(e);
                }
            }
        }

        let decoded = ErrorFrame::decode(&self.inbox);
        self.inbox.clear();
        match decoded {
            Ok(frame) => {
                tracing::debug!(
                    parent: &self.span,
                    identifier = frame.identifier,
                    status = frame.status,
                    "error response"
                );
                Ok(Some(frame))
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "unreadable response");
                self.disconnect();
                Err(e.into())
            }
        }
    }
}
