use crate::*;

use std::collections::HashSet;

use pushwire::{FailureLog, Notification};
use pushwire_core::{ApnError, Error, IoError, TransportError, ValidationError};

// ══════════════════════════════════════════════════════════════════════════════
//  Identifiers
// ══════════════════════════════════════════════════════════════════════════════

/// Auto-assigned identifiers never repeat while their entries are pending.
#[tokio::test]
async fn test_identifiers_are_unique() -> Result<()> {
    let (_server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();

    let mut seen = HashSet::new();
    for _ in 0..500 {
        let id = hub.push(Notification::from_hex(PAYLOAD, TOKEN_HEX)?, &mut log).await?;
        assert_ne!(id, 0);
        assert!(seen.insert(id), "identifier {id} handed out twice");
    }
    assert_eq!(hub.pending_len(), 500);
    Ok(())
}

/// Every format round-trips the fields it can carry.
#[tokio::test]
async fn test_all_formats_on_the_wire() -> Result<()> {
    for format in [Format::Simple, Format::Enhanced, Format::Item] {
        let (server, mut hub) = connected_hub(format, true).await?;
        let mut log = FailureLog::new();
        let notification = Notification::from_hex(PAYLOAD, TOKEN_HEX)?
            .with_expiration(1_800_000_000)
            .with_priority(10);
        hub.push(notification, &mut log).await?;

        let frame = server.writes().remove(0);
        let decoded = Notification::decode(&frame, format)?;
        assert_eq!(decoded.token_hex(), TOKEN_HEX);
        assert_eq!(decoded.payload_str(), Some(PAYLOAD));
        match format {
            Format::Simple => {
                assert_eq!(decoded.identifier, 0);
                assert_eq!(decoded.expiration, None);
            }
            Format::Enhanced => {
                assert_eq!(decoded.identifier, 1);
                assert_eq!(decoded.expiration, Some(1_800_000_000));
            }
            Format::Item => {
                assert_eq!(decoded.identifier, 1);
                assert_eq!(decoded.expiration, Some(1_800_000_000));
                assert_eq!(decoded.priority, 10);
            }
        }
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Validation
// ══════════════════════════════════════════════════════════════════════════════

/// Oversized payloads fail before any byte is written, at each format's limit.
#[tokio::test]
async fn test_payload_limits_per_format() -> Result<()> {
    for (format, max) in [
        (Format::Simple, 2048),
        (Format::Enhanced, 2048),
        (Format::Item, 4096),
    ] {
        let (server, mut hub) = connected_hub(format, true).await?;
        let mut log = FailureLog::new();
        let token = hex::decode(TOKEN_HEX)?;

        hub.push(Notification::new(vec![b'x'; max], token.clone()), &mut log)
            .await?;
        let err = hub
            .push(Notification::new(vec![b'x'; max + 1], token), &mut log)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidNotification(ValidationError::PayloadTooLarge { len: max + 1, max })
        );
        assert_eq!(server.writes().len(), 1);
        assert_eq!(log.len(), 1);
    }
    Ok(())
}

/// A malformed token is rejected with nothing to correlate.
#[tokio::test]
async fn test_bad_token_text() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();

    let err = hub.push_payload(PAYLOAD, "not hex", &mut log).await.unwrap_err();
    assert!(matches!(err, Error::InvalidNotification(_)));
    assert!(server.writes().is_empty());
    assert_eq!(log.failures[0].notification, None);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Reconnect
// ══════════════════════════════════════════════════════════════════════════════

/// Auto-reconnect: exactly one new connection, then the retried push lands.
#[tokio::test]
async fn test_write_failure_with_auto_reconnect() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();
    server.fail_next_write(IoError::WriteClosedAbort.into());

    hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await?;
    assert_eq!(server.connect_attempts(), 2);
    assert_eq!(server.writes().len(), 1);
    assert!(log.is_empty());
    Ok(())
}

/// Without auto-reconnect the failure is reported and nothing reconnects.
#[tokio::test]
async fn test_write_failure_without_auto_reconnect() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, false).await?;
    let mut log = FailureLog::new();
    server.fail_next_write(IoError::WriteClosedAbort.into());

    let err = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await.unwrap_err();
    assert_eq!(err, Error::Io(IoError::WriteClosedAbort));
    assert_eq!(server.connect_attempts(), 1);
    assert_eq!(log.len(), 1);

    let err = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await.unwrap_err();
    assert_eq!(err, Error::NotConnected);

    hub.reconnect().await?;
    hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await?;
    Ok(())
}

/// A reconnect that cannot reach the server is surfaced, not retried.
#[tokio::test]
async fn test_reconnect_failure_is_surfaced() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, true).await?;
    let mut log = FailureLog::new();
    server.fail_next_write(IoError::WriteClosedAbort.into());
    server.fail_next_connect(TransportError::CertificateRejected.into());

    let err = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await.unwrap_err();
    assert_eq!(err, Error::Transport(TransportError::CertificateRejected));
    assert_eq!(server.connect_attempts(), 2);
    assert_eq!(log.len(), 1);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
//  Failures and trimming
// ══════════════════════════════════════════════════════════════════════════════

/// Responses for trimmed or unknown identifiers still reach the delegate.
#[tokio::test(start_paused = true)]
async fn test_failure_after_trim_is_uncorrelated() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Enhanced, false).await?;
    let mut log = FailureLog::new();
    let id = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut log).await?;

    tokio::time::advance(hub.feedback_span() + Duration::from_millis(1)).await;
    assert_eq!(hub.trim_pending(), 1);

    server.respond_error(ApnError::MissingTopic, id);
    let failure = hub
        .read_failed(false, &mut log)
        .await?
        .context("no failure read")?;
    assert_eq!(failure.notification, None);
    assert_eq!(failure.error, Error::Apn(ApnError::MissingTopic));
    Ok(())
}

/// Closure delegates see the same reports as a FailureLog.
#[tokio::test]
async fn test_closure_delegate() -> Result<()> {
    let (server, mut hub) = connected_hub(Format::Item, false).await?;
    let mut seen: Vec<(Option<u32>, Error)> = Vec::new();
    let mut delegate = |n: Option<&Notification>, e: &Error| {
        seen.push((n.map(|n| n.identifier), e.clone()));
    };

    let id = hub.push_payload(PAYLOAD, TOKEN_HEX, &mut delegate).await?;
    server.respond_error(ApnError::InvalidPayloadSize, id);
    server.respond_error(ApnError::UnknownStatus(42), 777);
    assert_eq!(hub.read_failed_all(&mut delegate).await?, 2);

    assert_eq!(
        seen,
        vec![
            (Some(id), Error::Apn(ApnError::InvalidPayloadSize)),
            (None, Error::Apn(ApnError::UnknownStatus(42))),
        ]
    );
    Ok(())
}
