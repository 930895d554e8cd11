use crate::*;

use pushwire::{ConnectionState, FailureLog, Notification};
use pushwire_core::{ApnError, Error};

// ══════════════════════════════════════════════════════════════════════════════
//  Reference exchange
// ══════════════════════════════════════════════════════════════════════════════

/// Enhanced push with an auto-assigned identifier, then a rejection for it.
#[tokio::test]
async fn test_enhanced_push_and_rejection() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Enhanced, false).await?;
    let mut log = FailureLog::new();

    let notification = Notification::from_hex(PAYLOAD, TOKEN_HEX)?;
    let identifier = hub.push(notification, &mut log).await?;
    assert_eq!(identifier, 1);

    let mut expected = vec![0x01];
    expected.extend_from_slice(&1u32.to_be_bytes());
    expected.extend_from_slice(&0u32.to_be_bytes());
    expected.extend_from_slice(&[0x00, 0x20]);
    expected.extend_from_slice(&[0xaa; 32]);
    expected.extend_from_slice(&[0x00, 0x16]);
    expected.extend_from_slice(PAYLOAD.as_bytes());
    assert_eq!(server.written(), expected);
    assert_eq!(hex::encode(&expected[..11]), "0100000001000000000020");

    server.respond(&[0x08, 0x08, 0x00, 0x00, 0x00, 0x01]);
    let failure = hub
        .read_failed(false, &mut log)
        .await?
        .context("no failure read")?;

    let original = failure.notification.context("failure not correlated")?;
    assert_eq!(original.identifier, 1);
    assert_eq!(original.token_hex(), TOKEN_HEX);
    assert_eq!(original.payload_str(), Some(PAYLOAD));
    // status 8 is the legacy "invalid token" code
    assert_eq!(failure.error, Error::Apn(ApnError::InvalidTokenContent));
    assert_eq!(log.len(), 1);
    assert_eq!(hub.pending_len(), 0);
    Ok(())
}

/// A full session: burst, one rejection, server close, reconnect, more pushes.
#[tokio::test]
async fn test_session_survives_rejection() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();

    let bb = "bb".repeat(32);
    let cc = "cc".repeat(32);
    let tokens = [TOKEN_HEX, bb.as_str(), cc.as_str()];
    assert_eq!(hub.push_payload_to_tokens(PAYLOAD, &tokens, &mut log).await, 0);
    assert_eq!(hub.pending_len(), 3);

    // The gateway rejects the second notification and hangs up.
    server.respond_error(ApnError::InvalidTokenContent, 2);
    server.close();

    let reported = hub.read_failed_all(&mut log).await?;
    assert_eq!(reported, 1);
    let failure = &log.failures[0];
    assert_eq!(
        failure.notification.as_ref().map(Notification::token_hex),
        Some(bb)
    );

    // auto-reconnect replaced the connection after the rejection
    assert_eq!(server.connect_attempts(), 2);
    assert_eq!(hub.state(), ConnectionState::Connected);

    let next = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await?;
    assert_eq!(next, 4);
    assert_eq!(server.writes().len(), 4);
    Ok(())
}

/// JSON payloads built with serde_json go out byte for byte.
#[tokio::test]
async fn test_json_payload() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();

    let payload = serde_json::json!({ "aps": { "alert": "hello", "badge": 3 } });
    let notification = Notification::from_json(&payload, TOKEN_HEX)?
        .with_expiration(1_900_000_000)
        .with_priority(5);
    hub.push(notification, &mut log).await?;

    let frame = server.writes().remove(0);
    let decoded = Notification::decode(&frame, Format::Item)?;
    let body: serde_json::Value = serde_json::from_slice(&decoded.payload)?;
    assert_eq!(body, payload);
    assert_eq!(decoded.expiration, Some(1_900_000_000));
    assert_eq!(decoded.priority, 5);
    assert_eq!(decoded.identifier, 1);
    Ok(())
}
