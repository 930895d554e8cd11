//! Notifications and their three historical wire encodings.
//!
//! A [`Notification`] is a plain value. Encoding never mutates it, so pushing
//! the same notification twice produces the same bytes.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zerocopy::byteorder::{U16, U32};
use zerocopy::{AsBytes, FromBytes};

use crate::error::ValidationError;
use crate::wire::{
    item, EnhancedHeader, FieldLength, ItemFrameHeader, ItemHeader, WireError, COMMAND_ENHANCED,
    COMMAND_ITEM, MAX_FIELD_LEN, MAX_PAYLOAD_ITEM, MAX_PAYLOAD_LEGACY,
};

// ── Format ────────────────────────────────────────────────────────────────────

/// The on-wire notification formats accepted by the legacy push service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Format {
    /// Token and payload only. Failures cannot be traced to a notification.
    Simple = 0,

    /// Adds an identifier and an expiration.
    Enhanced = 1,

    /// Item-based frame, adds priority.
    #[default]
    Item = 2,
}

impl Format {
    /// Largest payload this format accepts.
    pub fn max_payload(self) -> usize {
        match self {
            Format::Simple | Format::Enhanced => MAX_PAYLOAD_LEGACY,
            Format::Item => MAX_PAYLOAD_ITEM,
        }
    }

    /// Whether the server can echo this format's notifications back in an
    /// error response.
    pub fn carries_identifier(self) -> bool {
        !matches!(self, Format::Simple)
    }
}

impl TryFrom<u8> for Format {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Format::Simple),
            1 => Ok(Format::Enhanced),
            2 => Ok(Format::Item),
            other => Err(WireError::UnknownFormat(other)),
        }
    }
}

impl From<Format> for u8 {
    fn from(f: Format) -> u8 {
        f as u8
    }
}

// ── Notification ──────────────────────────────────────────────────────────────

/// A single message for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// UTF-8 JSON, sent as is.
    pub payload: Bytes,

    /// Raw device token. Its length is whatever the caller supplies.
    pub token: Bytes,

    /// 0 = not yet assigned. The hub fills it in.
    pub identifier: u32,

    /// Epoch seconds after which the server may drop the notification.
    pub expiration: Option<u32>,

    /// 0 = not set. Only format 2 carries it.
    pub priority: u8,
}

impl Notification {
    pub fn new(payload: impl Into<Bytes>, token: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            token: token.into(),
            identifier: 0,
            expiration: None,
            priority: 0,
        }
    }

    /// Build from a payload string and a hex token such as `"<aaaa bbbb ...>"`.
    pub fn from_hex(payload: &str, token: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(payload.to_owned(), token_from_hex(token)?))
    }

    /// Build from a JSON payload value and a hex token.
    pub fn from_json(payload: &serde_json::Value, token: &str) -> Result<Self, ValidationError> {
        let payload =
            serde_json::to_vec(payload).map_err(|e| ValidationError::InvalidPayload(e.to_string()))?;
        Ok(Self::new(payload, token_from_hex(token)?))
    }

    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn with_expiration(mut self, epoch_secs: u32) -> Self {
        self.expiration = Some(epoch_secs);
        self
    }

    /// Times before the epoch clamp to 0, times past 2106 clamp to `u32::MAX`.
    pub fn with_expiration_at(self, at: SystemTime) -> Self {
        let secs = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().min(u64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        self.with_expiration(secs)
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn token_hex(&self) -> String {
        hex::encode(&self.token)
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Check the notification fits `format` without encoding it.
    pub fn validate(&self, format: Format) -> Result<(), ValidationError> {
        if self.payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        if self.payload.len() > format.max_payload() {
            return Err(ValidationError::PayloadTooLarge {
                len: self.payload.len(),
                max: format.max_payload(),
            });
        }
        if self.token.is_empty() {
            return Err(ValidationError::EmptyToken);
        }
        if self.token.len() > MAX_FIELD_LEN {
            return Err(ValidationError::TokenTooLong(self.token.len()));
        }
        Ok(())
    }

    /// Encode into one wire frame.
    ///
    /// Format 0 has no room for identifier, expiration or priority; they are
    /// left out. Format 1 has no room for priority.
    pub fn encode(&self, format: Format) -> Result<Bytes, ValidationError> {
        self.validate(format)?;
        let frame = match format {
            Format::Simple => self.encode_simple(),
            Format::Enhanced => self.encode_enhanced(),
            Format::Item => self.encode_item(),
        };
        Ok(Bytes::from(frame))
    }

    fn encode_simple(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.token.len() + self.payload.len());
        push_field(&mut out, &self.token);
        push_field(&mut out, &self.payload);
        out
    }

    fn encode_enhanced(&self) -> Vec<u8> {
        let header = EnhancedHeader {
            command: COMMAND_ENHANCED,
            identifier: U32::new(self.identifier),
            expiration: U32::new(self.expiration.unwrap_or(0)),
        };
        let mut out = Vec::with_capacity(13 + self.token.len() + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        push_field(&mut out, &self.token);
        push_field(&mut out, &self.payload);
        out
    }

    fn encode_item(&self) -> Vec<u8> {
        let mut items = Vec::with_capacity(32 + self.token.len() + self.payload.len());
        push_item(&mut items, item::DEVICE_TOKEN, &self.token);
        push_item(&mut items, item::PAYLOAD, &self.payload);
        push_item(&mut items, item::IDENTIFIER, &self.identifier.to_be_bytes());
        if let Some(expiration) = self.expiration {
            push_item(&mut items, item::EXPIRATION, &expiration.to_be_bytes());
        }
        if self.priority != 0 {
            push_item(&mut items, item::PRIORITY, &[self.priority]);
        }

        let header = ItemFrameHeader {
            command: COMMAND_ITEM,
            frame_length: U32::new(items.len() as u32),
        };
        let mut out = Vec::with_capacity(header.as_bytes().len() + items.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&items);
        out
    }

    /// Decode a frame produced by [`Notification::encode`].
    ///
    /// Only used for diagnostics: the push server never sends notifications
    /// back. Format 2 items are accepted in any order.
    pub fn decode(bytes: &[u8], format: Format) -> Result<Self, WireError> {
        match format {
            Format::Simple => {
                let (token, rest) = read_field(bytes)?;
                let (payload, _) = read_field(rest)?;
                Ok(Self::new(
                    Bytes::copy_from_slice(payload),
                    Bytes::copy_from_slice(token),
                ))
            }
            Format::Enhanced => {
                let header = EnhancedHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
                    expected: std::mem::size_of::<EnhancedHeader>(),
                    found: bytes.len(),
                })?;
                if header.command != COMMAND_ENHANCED {
                    return Err(WireError::UnexpectedCommand {
                        expected: COMMAND_ENHANCED,
                        found: header.command,
                    });
                }
                let rest = &bytes[std::mem::size_of::<EnhancedHeader>()..];
                let (token, rest) = read_field(rest)?;
                let (payload, _) = read_field(rest)?;
                let expiration = header.expiration.get();
                Ok(Self {
                    payload: Bytes::copy_from_slice(payload),
                    token: Bytes::copy_from_slice(token),
                    identifier: header.identifier.get(),
                    expiration: (expiration != 0).then_some(expiration),
                    priority: 0,
                })
            }
            Format::Item => decode_item(bytes),
        }
    }
}

fn decode_item(bytes: &[u8]) -> Result<Notification, WireError> {
    let header_len = std::mem::size_of::<ItemFrameHeader>();
    let header = ItemFrameHeader::read_from_prefix(bytes).ok_or(WireError::Truncated {
        expected: header_len,
        found: bytes.len(),
    })?;
    if header.command != COMMAND_ITEM {
        return Err(WireError::UnexpectedCommand {
            expected: COMMAND_ITEM,
            found: header.command,
        });
    }
    let frame_length = header.frame_length.get() as usize;
    let body = &bytes[header_len..];
    if body.len() < frame_length {
        return Err(WireError::Truncated {
            expected: header_len + frame_length,
            found: bytes.len(),
        });
    }

    let mut rest = &body[..frame_length];
    let mut token = None;
    let mut payload = None;
    let mut identifier = 0;
    let mut expiration = None;
    let mut priority = 0;

    let item_header_len = std::mem::size_of::<ItemHeader>();
    while !rest.is_empty() {
        let item_header = ItemHeader::read_from_prefix(rest).ok_or(WireError::FrameLengthMismatch {
            declared: frame_length,
            actual: frame_length - rest.len(),
        })?;
        let len = item_header.item_length.get() as usize;
        let data = rest
            .get(item_header_len..item_header_len + len)
            .ok_or(WireError::FrameLengthMismatch {
                declared: frame_length,
                actual: frame_length - rest.len() + item_header_len + len,
            })?;
        match item_header.item_id {
            item::DEVICE_TOKEN => token = Some(Bytes::copy_from_slice(data)),
            item::PAYLOAD => payload = Some(Bytes::copy_from_slice(data)),
            item::IDENTIFIER => identifier = u32::from_be_bytes(fixed(item::IDENTIFIER, data)?),
            item::EXPIRATION => {
                expiration = Some(u32::from_be_bytes(fixed(item::EXPIRATION, data)?))
            }
            item::PRIORITY => priority = fixed::<1>(item::PRIORITY, data)?[0],
            other => return Err(WireError::UnknownItem(other)),
        }
        rest = &rest[item_header_len + len..];
    }

    Ok(Notification {
        payload: payload.ok_or(WireError::MissingItem(item::PAYLOAD))?,
        token: token.ok_or(WireError::MissingItem(item::DEVICE_TOKEN))?,
        identifier,
        expiration,
        priority,
    })
}

fn fixed<const N: usize>(item: u8, data: &[u8]) -> Result<[u8; N], WireError> {
    data.try_into().map_err(|_| WireError::ItemLength {
        item,
        len: data.len(),
    })
}

fn push_field(out: &mut Vec<u8>, data: &[u8]) {
    let len = FieldLength {
        len: U16::new(data.len() as u16),
    };
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(data);
}

fn push_item(out: &mut Vec<u8>, item_id: u8, data: &[u8]) {
    let header = ItemHeader {
        item_id,
        item_length: U16::new(data.len() as u16),
    };
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(data);
}

fn read_field(bytes: &[u8]) -> Result<(&[u8], &[u8]), WireError> {
    let len = FieldLength::read_from_prefix(bytes).ok_or(WireError::Truncated {
        expected: 2,
        found: bytes.len(),
    })?;
    let end = 2 + len.len.get() as usize;
    if bytes.len() < end {
        return Err(WireError::Truncated {
            expected: end,
            found: bytes.len(),
        });
    }
    Ok((&bytes[2..end], &bytes[end..]))
}

// ── Hex ───────────────────────────────────────────────────────────────────────

/// Parse a device token from hex. Anything that is not a hex digit (spaces,
/// angle brackets) is skipped, so `"<aabb ccdd>"` and `"aabbccdd"` agree.
pub fn token_from_hex(text: &str) -> Result<Bytes, ValidationError> {
    let digits: String = text.chars().filter(char::is_ascii_hexdigit).collect();
    if digits.is_empty() {
        return Err(ValidationError::EmptyToken);
    }
    hex::decode(&digits)
        .map(Bytes::from)
        .map_err(|e| ValidationError::InvalidToken(e.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
