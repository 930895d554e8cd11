//! pushwire-core: notification model, legacy wire format, error taxonomy
//! and configuration. No I/O happens in this crate.

pub mod config;
pub mod error;
pub mod notification;
pub mod wire;

pub use config::{Endpoint, Environment, PushwireConfig};
pub use error::{ApnError, CredentialError, Error, IoError, Result, TransportError, ValidationError};
pub use notification::{Format, Notification};
pub use wire::{ErrorFrame, FeedbackRecord, WireError};
