//! Sent notifications kept around for error correlation.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use pushwire_core::Notification;

/// A notification that was written and may still be rejected.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub identifier: u32,
    pub notification: Notification,
    pub sent_at: Instant,
}

/// Pending notifications keyed by identifier, plus the identifier counter.
///
/// Entries leave only through [`PendingSet::take`] or [`PendingSet::trim`];
/// nothing expires on its own.
#[derive(Debug)]
pub struct PendingSet {
    entries: HashMap<u32, PendingEntry>,
    /// Next identifier to try. 0 is never handed out.
    next: u32,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            entries: HashMap::new(),
            next: first,
        }
    }

    /// The identifier the next auto-assigned notification gets.
    ///
    /// Skips 0 and every identifier still pending. Wraps after `u32::MAX`.
    /// `None` only if every non-zero identifier is pending.
    pub fn peek_identifier(&self) -> Option<u32> {
        let mut candidate = self.next;
        for _ in 0..self.entries.len() + 2 {
            if candidate != 0 && !self.entries.contains_key(&candidate) {
                return Some(candidate);
            }
            candidate = candidate.wrapping_add(1);
        }
        None
    }

    /// Consume `identifier` so the counter moves past it.
    pub fn advance_past(&mut self, identifier: u32) {
        self.next = identifier.wrapping_add(1);
    }

    pub fn insert(&mut self, notification: Notification, sent_at: Instant) {
        let identifier = notification.identifier;
        self.entries.insert(
            identifier,
            PendingEntry {
                identifier,
                notification,
                sent_at,
            },
        );
    }

    pub fn take(&mut self, identifier: u32) -> Option<PendingEntry> {
        self.entries.remove(&identifier)
    }

    pub fn get(&self, identifier: u32) -> Option<&PendingEntry> {
        self.entries.get(&identifier)
    }

    pub fn contains(&self, identifier: u32) -> bool {
        self.entries.contains_key(&identifier)
    }

    /// Drop every entry at least `span` old. Returns how many were dropped.
    pub fn trim(&mut self, now: Instant, span: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.sent_at) < span);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
