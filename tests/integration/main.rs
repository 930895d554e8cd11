//! pushwire integration test harness.
//!
//! Every test drives the public API end to end over the in-process memory
//! transport, which plays the push gateway or the feedback server:
//!
//!   cargo test --test integration
//!
//! Nothing here touches the network, so tests run in parallel freely.

use std::time::Duration;

use anyhow::{Context, Result};

use pushwire::transport::memory::MemoryConnector;
use pushwire::{FeedbackClient, Hub, PushClient};
use pushwire_core::{Endpoint, Format};

mod config;
mod feedback;
mod hub;
mod scenario;

// ── Harness ───────────────────────────────────────────────────────────────────

/// The token used throughout: 64 hex characters, 32 bytes of 0xaa.
pub const TOKEN_HEX: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const PAYLOAD: &str = r#"{"aps":{"alert":"hi"}}"#;

/// Short enough that quiet polls don't slow the suite down.
pub const READ_TIMEOUT: Duration = Duration::from_millis(25);

pub fn gateway() -> Endpoint {
    Endpoint::new("gateway.test", 2195)
}

pub fn feedback_server() -> Endpoint {
    Endpoint::new("feedback.test", 2196)
}

/// A connected hub and the memory server behind it.
pub async fn connected_hub(
    format: Format,
    auto_reconnect: bool,
) -> Result<(MemoryConnector, Hub<MemoryConnector>)> {
    let server = MemoryConnector::new();
    let client = PushClient::new(server.clone()).with_read_timeout(READ_TIMEOUT);
    let mut hub = Hub::new(client)
        .with_format(format)
        .with_auto_reconnect(auto_reconnect);
    hub.connect("push-identity".to_string(), gateway())
        .await
        .context("hub connect")?;
    Ok((server, hub))
}

/// A connected feedback client and the memory server behind it.
pub async fn connected_feedback(
    server: &MemoryConnector,
) -> Result<FeedbackClient<MemoryConnector>> {
    let mut client = FeedbackClient::new(server.clone()).with_read_timeout(READ_TIMEOUT);
    client
        .connect(&"feedback-identity".to_string(), &feedback_server())
        .await
        .context("feedback connect")?;
    Ok(client)
}
