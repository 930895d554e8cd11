//! Legacy push wire format: on-wire types for the push and feedback services.
//!
//! These layouts ARE the protocol. Every field width and every command byte
//! is a compatibility contract with the server, so nothing here may change.
//!
//! All integers are big-endian. Headers are `#[repr(C)]` structs built from
//! zerocopy's byte-order aware integers, which makes them `Unaligned` and
//! padding-free: `as_bytes()` is the wire encoding and `read_from_prefix()`
//! is the decoding. There is no unsafe code in this module.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::ApnError;

// ── Commands ──────────────────────────────────────────────────────────────────

/// Leading byte of a format 1 notification.
pub const COMMAND_ENHANCED: u8 = 1;

/// Leading byte of a format 2 notification.
pub const COMMAND_ITEM: u8 = 2;

/// Leading byte of every server error response.
pub const COMMAND_ERROR: u8 = 8;

/// Item identifiers inside a format 2 frame.
pub mod item {
    pub const DEVICE_TOKEN: u8 = 1;
    pub const PAYLOAD: u8 = 2;
    pub const IDENTIFIER: u8 = 3;
    pub const EXPIRATION: u8 = 4;
    pub const PRIORITY: u8 = 5;
}

// ── Limits ────────────────────────────────────────────────────────────────────

/// Maximum payload for formats 0 and 1.
pub const MAX_PAYLOAD_LEGACY: usize = 2048;

/// Maximum payload for format 2.
pub const MAX_PAYLOAD_ITEM: usize = 4096;

/// Largest value a 16-bit length prefix can carry.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

// ── Format 1 ──────────────────────────────────────────────────────────────────

/// Fixed prefix of an enhanced (format 1) notification.
///
/// Followed by `tokenLen:u16, token, payloadLen:u16, payload`.
///
/// Wire size: 9 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct EnhancedHeader {
    /// Always [`COMMAND_ENHANCED`].
    pub command: u8,

    /// Echoed back by the server in an error response.
    pub identifier: U32<BigEndian>,

    /// Epoch seconds. 0 = no expiration.
    pub expiration: U32<BigEndian>,
}

assert_eq_size!(EnhancedHeader, [u8; 9]);

/// A 16-bit length prefix, used for token and payload in formats 0 and 1.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FieldLength {
    pub len: U16<BigEndian>,
}

assert_eq_size!(FieldLength, [u8; 2]);

// ── Format 2 ──────────────────────────────────────────────────────────────────

/// Frame prefix of an item-based (format 2) notification.
///
/// Wire size: 5 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ItemFrameHeader {
    /// Always [`COMMAND_ITEM`].
    pub command: u8,

    /// Total length of the items that follow, headers included.
    pub frame_length: U32<BigEndian>,
}

assert_eq_size!(ItemFrameHeader, [u8; 5]);

/// Prefix of one item inside a format 2 frame.
///
/// Wire size: 3 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ItemHeader {
    /// One of the ids in [`item`].
    pub item_id: u8,
    pub item_length: U16<BigEndian>,
}

assert_eq_size!(ItemHeader, [u8; 3]);

// ── Error response ────────────────────────────────────────────────────────────

/// What the push server sends back after rejecting a notification,
/// usually right before it closes the connection.
///
/// Same layout for every notification format.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ErrorResponse {
    /// Always [`COMMAND_ERROR`].
    pub command: u8,
    pub status: u8,
    pub identifier: U32<BigEndian>,
}

assert_eq_size!(ErrorResponse, [u8; 6]);

pub const ERROR_FRAME_LEN: usize = std::mem::size_of::<ErrorResponse>();

/// A decoded error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorFrame {
    pub status: u8,
    pub identifier: u32,
}

impl ErrorFrame {
    /// Decode a 6-byte error response. Trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let raw = ErrorResponse::read_from_prefix(bytes).ok_or(WireError::Truncated {
            expected: ERROR_FRAME_LEN,
            found: bytes.len(),
        })?;
        if raw.command != COMMAND_ERROR {
            return Err(WireError::UnexpectedCommand {
                expected: COMMAND_ERROR,
                found: raw.command,
            });
        }
        Ok(Self {
            status: raw.status,
            identifier: raw.identifier.get(),
        })
    }

    /// Encode as the server would.
    pub fn encode(&self) -> [u8; ERROR_FRAME_LEN] {
        let raw = ErrorResponse {
            command: COMMAND_ERROR,
            status: self.status,
            identifier: U32::new(self.identifier),
        };
        let mut out = [0u8; ERROR_FRAME_LEN];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// The taxonomy kind for this frame's status byte.
    pub fn error(&self) -> ApnError {
        apn_error(self.status)
    }
}

/// Map a server status byte to its error kind.
pub fn apn_error(status: u8) -> ApnError {
    match status {
        1 => ApnError::Processing,
        2 => ApnError::MissingToken,
        3 => ApnError::MissingTopic,
        4 => ApnError::MissingPayload,
        5 => ApnError::InvalidTokenSize,
        6 => ApnError::InvalidTopicSize,
        7 => ApnError::InvalidPayloadSize,
        8 => ApnError::InvalidTokenContent,
        10 => ApnError::Shutdown,
        255 => ApnError::UnknownReason,
        other => ApnError::UnknownStatus(other),
    }
}

/// Inverse of [`apn_error`].
pub fn apn_status(error: ApnError) -> u8 {
    match error {
        ApnError::Processing => 1,
        ApnError::MissingToken => 2,
        ApnError::MissingTopic => 3,
        ApnError::MissingPayload => 4,
        ApnError::InvalidTokenSize => 5,
        ApnError::InvalidTopicSize => 6,
        ApnError::InvalidPayloadSize => 7,
        ApnError::InvalidTokenContent => 8,
        ApnError::Shutdown => 10,
        ApnError::UnknownReason => 255,
        ApnError::UnknownStatus(other) => other,
    }
}

// ── Feedback ──────────────────────────────────────────────────────────────────

/// Prefix of one feedback-service record, followed by the token bytes.
///
/// Wire size: 6 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FeedbackHeader {
    /// Epoch seconds at which the server decided the token is gone.
    pub timestamp: U32<BigEndian>,
    pub token_length: U16<BigEndian>,
}

assert_eq_size!(FeedbackHeader, [u8; 6]);

pub const FEEDBACK_HEADER_LEN: usize = std::mem::size_of::<FeedbackHeader>();

/// One expired device token reported by the feedback service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    /// Epoch seconds.
    pub timestamp: u32,
    pub token: Bytes,
}

impl FeedbackRecord {
    /// Decode one record from the front of `bytes`.
    ///
    /// Returns the record and how many bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), WireError> {
        let header = FeedbackHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
            expected: FEEDBACK_HEADER_LEN,
            found: bytes.len(),
        })?;
        let total = FEEDBACK_HEADER_LEN + header.token_length.get() as usize;
        if bytes.len() < total {
            return Err(WireError::Truncated {
                expected: total,
                found: bytes.len(),
            });
        }
        let record = Self {
            timestamp: header.timestamp.get(),
            token: Bytes::copy_from_slice(&bytes[FEEDBACK_HEADER_LEN..total]),
        };
        Ok((record, total))
    }

    /// Encode as the feedback server would.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let token_length = u16::try_from(self.token.len())
            .map_err(|_| WireError::FieldTooLong(self.token.len()))?;
        let header = FeedbackHeader {
            timestamp: U32::new(self.timestamp),
            token_length: U16::new(token_length),
        };
        let mut out = Vec::with_capacity(FEEDBACK_HEADER_LEN + self.token.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.token);
        Ok(out)
    }

    pub fn time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::from(self.timestamp))
    }

    pub fn token_hex(&self) -> String {
        hex::encode(&self.token)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unexpected command byte 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedCommand { expected: u8, found: u8 },

    #[error("frame truncated: need {expected} bytes, have {found}")]
    Truncated { expected: usize, found: usize },

    #[error("frame length {declared} does not match {actual} bytes of items")]
    FrameLengthMismatch { declared: usize, actual: usize },

    #[error("item 0x{item:02x} has invalid length {len}")]
    ItemLength { item: u8, len: usize },

    #[error("unknown item id 0x{0:02x}")]
    UnknownItem(u8),

    #[error("required item 0x{0:02x} missing")]
    MissingItem(u8),

    #[error("unknown notification format {0}")]
    UnknownFormat(u8),

    #[error("field length {0} exceeds a 16-bit length prefix")]
    FieldTooLong(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
