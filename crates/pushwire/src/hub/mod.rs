//! Hub: notification tracking on top of a [`PushClient`].
//!
//! The hub gives every notification an identifier, remembers what it sent
//! for `feedback_span`, and turns the server's asynchronous error responses
//! back into the notification that caused them.
//!
//! Correlation is by identifier only. Identifiers are 32-bit and wrap, so a
//! response that arrives very late in a very busy session could in theory
//! land on a newer notification that reuses the identifier. Trimming after
//! `feedback_span` keeps that window small; it does not close it.

mod delegate;
mod pending;

pub use delegate::{Failure, FailureLog, HubDelegate};
pub use pending::{PendingEntry, PendingSet};

use std::time::Duration;

use tokio::time::Instant;

use pushwire_core::config::PushConfig;
use pushwire_core::{Endpoint, Environment, Error, Format, Notification, Result};

use crate::push_client::PushClient;
use crate::transport::{ConnectionState, Connector};

/// How long sent notifications are kept by default.
pub const DEFAULT_FEEDBACK_SPAN: Duration = Duration::from_secs(30);

/// Upper bound on responses drained by one [`Hub::read_failed_all`].
const MAX_DRAIN: usize = 1000;

pub struct Hub<C: Connector> {
    client: PushClient<C>,
    pending: PendingSet,
    format: Format,
    feedback_span: Duration,
    auto_reconnect: bool,
    span: tracing::Span,
}

impl<C: Connector> Hub<C> {
    pub fn new(client: PushClient<C>) -> Self {
        Self {
            client,
            pending: PendingSet::new(),
            format: Format::Item,
            feedback_span: DEFAULT_FEEDBACK_SPAN,
            auto_reconnect: true,
            span: tracing::info_span!("hub"),
        }
    }

    pub fn from_config(client: PushClient<C>, config: &PushConfig) -> Self {
        Self::new(client)
            .with_format(config.format)
            .with_feedback_span(config.feedback_span())
            .with_auto_reconnect(config.auto_reconnect)
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_feedback_span(mut self, span: Duration) -> Self {
        self.feedback_span = span;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Log under the caller's span instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn feedback_span(&self) -> Duration {
        self.feedback_span
    }

    pub fn client(&self) -> &PushClient<C> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut PushClient<C> {
        &mut self.client
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    // ── Connection ───────────────────────────────────────────────────────────

    pub async fn connect(&mut self, identity: C::Identity, endpoint: Endpoint) -> Result<()> {
        self.client.connect(identity, endpoint).await
    }

    pub async fn connect_environment(
        &mut self,
        identity: C::Identity,
        environment: Environment,
    ) -> Result<()> {
        self.client.connect_environment(identity, environment).await
    }

    pub async fn reconnect(&mut self) -> Result<()> {
        self.client.reconnect().await
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    // ── Pending ──────────────────────────────────────────────────────────────

    pub fn pending(&self, identifier: u32) -> Option<&PendingEntry> {
        self.pending.get(identifier)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget notifications sent at least `feedback_span` ago.
    ///
    /// Call this after draining failures, never before: an entry trimmed
    /// before its error response is read can no longer be matched.
    pub fn trim_pending(&mut self) -> usize {
        self.trim_pending_at(Instant::now())
    }

    pub fn trim_pending_at(&mut self, now: Instant) -> usize {
        let trimmed = self.pending.trim(now, self.feedback_span);
        if trimmed > 0 {
            tracing::debug!(
                parent: &self.span,
                trimmed,
                remaining = self.pending.len(),
                "trimmed pending notifications"
            );
        }
        trimmed
    }

    // ── Push ─────────────────────────────────────────────────────────────────

    /// Push one notification with the hub's format and reconnect policy.
    ///
    /// Returns the identifier it went out with. Failures are returned and
    /// also reported to `delegate`.
    pub async fn push(
        &mut self,
        notification: Notification,
        delegate: &mut impl HubDelegate,
    ) -> Result<u32> {
        let auto_reconnect = self.auto_reconnect;
        self.push_with(notification, auto_reconnect, delegate).await
    }

    async fn push_with(
        &mut self,
        notification: Notification,
        auto_reconnect: bool,
        delegate: &mut impl HubDelegate,
    ) -> Result<u32> {
        let (notification, frame) = match self.prepare(notification) {
            Ok(prepared) => prepared,
            Err((notification, e)) => {
                tracing::warn!(parent: &self.span, error = %e, "notification rejected locally");
                delegate.notification_failed(Some(&notification), &e);
                return Err(e);
            }
        };
        let identifier = notification.identifier;

        let mut result = self.client.write_frame(&frame).await;
        if let Err(e) = &result {
            if auto_reconnect && e.requires_reconnect() {
                tracing::info!(parent: &self.span, identifier, error = %e, "push failed, reconnecting");
                result = match self.client.reconnect().await {
                    Ok(()) => self.client.write_frame(&frame).await,
                    Err(reconnect_error) => Err(reconnect_error),
                };
            }
        }

        match result {
            Ok(()) => {
                if self.format.carries_identifier() {
                    self.pending.insert(notification, Instant::now());
                }
                tracing::trace!(parent: &self.span, identifier, "pushed");
                Ok(identifier)
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, identifier, error = %e, "push failed");
                delegate.notification_failed(Some(&notification), &e);
                Err(e)
            }
        }
    }

    /// Assign an identifier and encode. Nothing is consumed on failure.
    fn prepare(
        &mut self,
        notification: Notification,
    ) -> std::result::Result<(Notification, bytes::Bytes), (Notification, Error)> {
        let auto_assigned = notification.identifier == 0;
        let identifier = if auto_assigned {
            match self.pending.peek_identifier() {
                Some(identifier) => identifier,
                None => return Err((notification, Error::IdentifierOutOfSync(0))),
            }
        } else if self.pending.contains(notification.identifier) {
            let identifier = notification.identifier;
            return Err((notification, Error::IdentifierOutOfSync(identifier)));
        } else {
            notification.identifier
        };

        let notification = notification.with_identifier(identifier);
        match notification.encode(self.format) {
            Ok(frame) => {
                if auto_assigned {
                    self.pending.advance_past(identifier);
                }
                Ok((notification, frame))
            }
            Err(e) => {
                // hand back the caller's value untouched
                let notification = if auto_assigned {
                    notification.with_identifier(0)
                } else {
                    notification
                };
                Err((notification, e.into()))
            }
        }
    }

    /// Push one JSON payload string to one hex token.
    pub async fn push_payload(
        &mut self,
        payload: &str,
        token: &str,
        delegate: &mut impl HubDelegate,
    ) -> Result<u32> {
        let notification = match Notification::from_hex(payload, token) {
            Ok(notification) => notification,
            Err(e) => {
                let error = Error::from(e);
                delegate.notification_failed(None, &error);
                return Err(error);
            }
        };
        self.push(notification, delegate).await
    }

    /// Push the same payload to many tokens. Returns how many failed.
    pub async fn push_payload_to_tokens<S: AsRef<str>>(
        &mut self,
        payload: &str,
        tokens: &[S],
        delegate: &mut impl HubDelegate,
    ) -> usize {
        let mut failed = 0;
        for token in tokens {
            if self.push_payload(payload, token.as_ref(), delegate).await.is_err() {
                failed += 1;
            }
        }
        failed
    }

    /// Push many payloads to one token. Returns how many failed.
    pub async fn push_payloads_to_token<S: AsRef<str>>(
        &mut self,
        payloads: &[S],
        token: &str,
        delegate: &mut impl HubDelegate,
    ) -> usize {
        let mut failed = 0;
        for payload in payloads {
            if self.push_payload(payload.as_ref(), token, delegate).await.is_err() {
                failed += 1;
            }
        }
        failed
    }

    /// Push a batch in order. Best effort: a failure is counted and reported,
    /// and the rest of the batch still goes out (after a reconnect, if
    /// `auto_reconnect`). Returns how many failed.
    pub async fn push_notifications(
        &mut self,
        notifications: impl IntoIterator<Item = Notification>,
        auto_reconnect: bool,
        delegate: &mut impl HubDelegate,
    ) -> usize {
        let mut failed = 0;
        for notification in notifications {
            if self.push_with(notification, auto_reconnect, delegate).await.is_err() {
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::info!(parent: &self.span, failed, "batch finished with failures");
        }
        failed
    }

    // ── Failures ─────────────────────────────────────────────────────────────

    /// Read at most one error response and match it to what was sent.
    ///
    /// `Ok(None)` when nothing arrived within the read timeout. When a
    /// response is read and `auto_reconnect` is set, the connection is
    /// replaced once, since the server closes it after rejecting.
    pub async fn read_failed(
        &mut self,
        auto_reconnect: bool,
        delegate: &mut impl HubDelegate,
    ) -> Result<Option<Failure>> {
        let Some(frame) = self.client.read_failure().await? else {
            return Ok(None);
        };

        let error = Error::Apn(frame.error());
        let notification = self
            .pending
            .take(frame.identifier)
            .map(|entry| entry.notification);
        tracing::warn!(
            parent: &self.span,
            identifier = frame.identifier,
            matched = notification.is_some(),
            error = %error,
            "notification failed"
        );
        delegate.notification_failed(notification.as_ref(), &error);

        if auto_reconnect {
            if let Err(e) = self.client.reconnect().await {
                tracing::warn!(parent: &self.span, error = %e, "reconnect after failure failed");
                delegate.notification_failed(None, &e);
            }
        }

        Ok(Some(Failure {
            notification,
            error,
        }))
    }

    /// Drain every available error response, then trim.
    ///
    /// Uses the hub's reconnect policy. Returns how many failures were
    /// reported to `delegate`. A connection closed by the server after its
    /// last response ends the drain instead of failing it.
    pub async fn read_failed_all(&mut self, delegate: &mut impl HubDelegate) -> Result<usize> {
        let auto_reconnect = self.auto_reconnect;
        let mut count = 0;
        for _ in 0..MAX_DRAIN {
            match self.read_failed(auto_reconnect, delegate).await {
                Ok(Some(_)) => count += 1,
                Ok(None) => break,
                Err(e) if count > 0 && e.requires_reconnect() => {
                    tracing::debug!(parent: &self.span, error = %e, "connection ended after failures");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        self.trim_pending();
        Ok(count)
    }
}
