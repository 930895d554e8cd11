//! Failure reporting.

use pushwire_core::{Error, Notification};

/// Receives every notification the hub gives up on.
///
/// Called synchronously from inside the hub operation that observed the
/// failure. The hub never keeps the delegate beyond that call.
///
/// Closures work too, as long as their parameter types are spelled out:
/// `&mut |n: Option<&Notification>, e: &Error| { ... }`.
pub trait HubDelegate {
    /// `notification` is `None` when the failure cannot be traced back,
    /// for example because the entry was already trimmed.
    fn notification_failed(&mut self, notification: Option<&Notification>, error: &Error);
}

impl<F> HubDelegate for F
where
    F: FnMut(Option<&Notification>, &Error),
{
    fn notification_failed(&mut self, notification: Option<&Notification>, error: &Error) {
        self(notification, error)
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub notification: Option<Notification>,
    pub error: Error,
}

/// Delegate that keeps everything it is told.
#[derive(Debug, Default)]
pub struct FailureLog {
    pub failures: Vec<Failure>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn take(&mut self) -> Vec<Failure> {
        std::mem::take(&mut self.failures)
    }
}

impl HubDelegate for FailureLog {
    fn notification_failed(&mut self, notification: Option<&Notification>, error: &Error) {
        self.failures.push(Failure {
            notification: notification.cloned(),
            error: error.clone(),
        });
    }
}
