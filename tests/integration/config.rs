use crate::*;

use pushwire::transport::ConnectionState;
use pushwire_core::config::PushConfig;
use pushwire_core::{Environment, PushwireConfig};

// ══════════════════════════════════════════════════════════════════════════════
//  Configuration
// ══════════════════════════════════════════════════════════════════════════════

/// A config file drives the hub's format, span and reconnect policy.
#[tokio::test]
async fn test_hub_from_config() -> Result<()> {
    let config = PushwireConfig::from_toml(
        r#"
        [push]
        environment = "production"
        format = 1
        feedback_span_secs = 2.5
        read_timeout_ms = 40
        auto_reconnect = false
        "#,
    )?;
    assert_eq!(config.push.environment, Environment::Production);
    assert_eq!(
        config.push.endpoint(),
        Endpoint::new("gateway.push.apple.com", 2195)
    );

    let server = MemoryConnector::new();
    let client = PushClient::from_config(server.clone(), &config.push);
    assert_eq!(client.read_timeout(), Duration::from_millis(40));

    let mut hub = Hub::from_config(client, &config.push);
    assert_eq!(hub.format(), Format::Enhanced);
    assert_eq!(hub.feedback_span(), Duration::from_millis(2500));

    hub.connect("identity".to_string(), config.push.endpoint()).await?;
    assert_eq!(hub.state(), ConnectionState::Connected);
    assert_eq!(server.last_endpoint(), Some(config.push.endpoint()));
    Ok(())
}

/// Defaults point at the sandbox endpoints.
#[test]
fn test_default_endpoints() {
    let config = PushwireConfig::default();
    assert_eq!(
        config.push.endpoint(),
        Endpoint::new("gateway.sandbox.push.apple.com", 2195)
    );
    assert_eq!(
        config.feedback.endpoint(),
        Endpoint::new("feedback.sandbox.push.apple.com", 2196)
    );
    assert_eq!(PushConfig::default().format, Format::Item);
}

/// Explicit host and port win over the environment.
#[test]
fn test_endpoint_override() -> Result<()> {
    let config = PushwireConfig::from_toml(
        r#"
        [feedback]
        host = "127.0.0.1"
        port = 12196
        "#,
    )?;
    assert_eq!(config.feedback.endpoint(), Endpoint::new("127.0.0.1", 12196));
    Ok(())
}
