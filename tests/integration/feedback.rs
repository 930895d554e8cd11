use crate::*;

use std::time::UNIX_EPOCH;

use bytes::Bytes;
use pushwire::{ConnectionState, FeedbackRead};
use pushwire_core::{Error, FeedbackRecord, WireError};

// ══════════════════════════════════════════════════════════════════════════════
//  Feedback service
// ══════════════════════════════════════════════════════════════════════════════

fn record(timestamp: u32, token_hex: &str) -> Result<FeedbackRecord> {
    Ok(FeedbackRecord {
        timestamp,
        token: Bytes::from(hex::decode(token_hex)?),
    })
}

/// The server sends its list and hangs up; the client reads it all.
#[tokio::test]
async fn test_read_all_until_server_closes() -> Result<()> {
    let server = MemoryConnector::new();
    let records = vec![
        record(1_600_000_000, TOKEN_HEX)?,
        record(1_600_000_060, &"bb".repeat(32))?,
        record(1_600_000_120, &"cc".repeat(32))?,
    ];
    server.respond_feedback(&records)?;
    server.close();

    let mut client = connected_feedback(&server).await?;
    let got = client.read_all(0).await?;
    assert_eq!(got, records);
    assert_eq!(got[0].token_hex(), TOKEN_HEX);
    assert_eq!(
        got[1].time(),
        UNIX_EPOCH + Duration::from_secs(1_600_000_060)
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.last_endpoint(), Some(feedback_server()));
    assert!(server.writes().is_empty(), "feedback client must not write");
    Ok(())
}

/// An empty list is a clean, immediate end of stream.
#[tokio::test]
async fn test_empty_feedback() -> Result<()> {
    let server = MemoryConnector::new();
    server.close();
    let mut client = connected_feedback(&server).await?;
    assert!(client.read_all(0).await?.is_empty());
    Ok(())
}

/// `max` stops early; the rest stays readable on the same connection.
#[tokio::test]
async fn test_read_all_with_limit() -> Result<()> {
    let server = MemoryConnector::new();
    let records: Vec<_> = (0..10u32)
        .map(|i| record(1_600_000_000 + i, TOKEN_HEX))
        .collect::<Result<_>>()?;
    server.respond_feedback(&records)?;
    server.close();

    let mut client = connected_feedback(&server).await?;
    assert_eq!(client.read_all(4).await?.len(), 4);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.read_all(100).await?.len(), 6);
    Ok(())
}

/// A record cut short by the server closing is malformed.
#[tokio::test]
async fn test_truncated_record() -> Result<()> {
    let server = MemoryConnector::new();
    let bytes = record(1, TOKEN_HEX)?.encode()?;
    server.respond(&bytes[..bytes.len() - 1]);
    server.close();

    let mut client = connected_feedback(&server).await?;
    let err = client.read_next().await.unwrap_err();
    assert_eq!(
        err,
        Error::MalformedFrame(WireError::Truncated {
            expected: 38,
            found: 37
        })
    );
    Ok(())
}

/// One and a half records and then silence: the read must not look finished.
#[tokio::test(start_paused = true)]
async fn test_stall_mid_record_is_not_completion() -> Result<()> {
    let server = MemoryConnector::new();
    let first = record(1_600_000_000, TOKEN_HEX)?;
    let second = record(1_600_000_001, &"bb".repeat(32))?.encode()?;
    server.respond(&first.encode()?);
    server.respond(&second[..10]);

    let mut client = connected_feedback(&server).await?;
    assert_eq!(client.read_next().await?, FeedbackRead::Record(first));
    assert_eq!(client.read_next().await?, FeedbackRead::Pending);
    assert_eq!(client.state(), ConnectionState::Connected);

    let err = client.read_all(0).await.unwrap_err();
    assert_eq!(
        err,
        Error::MalformedFrame(WireError::Truncated {
            expected: 38,
            found: 10
        })
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    Ok(())
}

/// A silent server ends the read instead of hanging.
#[tokio::test(start_paused = true)]
async fn test_silent_server() -> Result<()> {
    let server = MemoryConnector::new();
    let mut client = connected_feedback(&server).await?;
    let started = tokio::time::Instant::now();
    assert!(client.read_all(0).await?.is_empty());
    assert!(started.elapsed() >= READ_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(1));
    Ok(())
}
