//! pushwire: push gateway and feedback clients, plus the [`Hub`] that
//! tracks sent notifications and matches server errors back to them.
//!
//! Everything here is async and runs on the caller's task. The secure
//! transport is supplied through [`transport::Connector`].

pub mod feedback;
pub mod hub;
pub mod push_client;
pub mod transport;

pub use feedback::{FeedbackClient, FeedbackRead};
pub use hub::{Failure, FailureLog, Hub, HubDelegate};
pub use push_client::PushClient;
pub use transport::{ConnectionState, Connector, ReadOutcome, SecureStream};

pub use pushwire_core::{
    ApnError, Endpoint, Environment, Error, FeedbackRecord, Format, Notification, Result,
};
