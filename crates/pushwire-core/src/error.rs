//! Error taxonomy shared by the codec, the clients, and the hub.
//!
//! One enum per layer. The umbrella [`Error`] is what every fallible
//! operation in the workspace returns. Legacy numeric codes never appear
//! here; the server status byte is translated in `wire`.

use crate::wire::WireError;

// ── Credential ───────────────────────────────────────────────────────────────

/// Failures while turning key material into a TLS client identity.
///
/// Produced by identity providers and connectors, never by the codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("PKCS#12 data is empty")]
    Pkcs12Empty,

    #[error("PKCS#12 data cannot be decoded")]
    Pkcs12Invalid,

    #[error("PKCS#12 password rejected")]
    Pkcs12Password,

    #[error("PKCS#12 data contains no identity")]
    Pkcs12NoIdentity,

    #[error("PKCS#12 data contains {0} identities, expected one")]
    Pkcs12MultipleIdentities(usize),

    #[error("identity has no certificate")]
    MissingCertificate,

    #[error("identity has no private key")]
    MissingPrivateKey,

    #[error("keychain lookup failed: {0}")]
    KeychainLookup(String),
}

// ── Transport ────────────────────────────────────────────────────────────────

/// Failures establishing the secure stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("socket cannot be created: {0}")]
    SocketCreate(String),

    #[error("cannot resolve host {0}")]
    ResolveHost(String),

    #[error("socket connect to {0} failed")]
    SocketConnect(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("TLS handshake timed out")]
    HandshakeTimeout,

    #[error("client certificate rejected by server")]
    CertificateRejected,

    #[error("TLS handshake dropped by server")]
    DroppedByServer,
}

// ── I/O ──────────────────────────────────────────────────────────────────────

/// Failures on an established stream. All of them mean the connection is gone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IoError {
    #[error("read: connection closed by server")]
    ReadClosedGraceful,

    #[error("read: connection aborted")]
    ReadClosedAbort,

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write: connection closed by server")]
    WriteClosedGraceful,

    #[error("write: connection aborted")]
    WriteClosedAbort,

    #[error("write failed: {0}")]
    WriteFailed(String),

    /// Some bytes of a frame reached the stream, the rest did not.
    /// The server state is unknown; the frame is never resumed.
    #[error("write incomplete: {written} of {expected} bytes sent")]
    ShortWrite { written: usize, expected: usize },
}

// ── Server-reported ──────────────────────────────────────────────────────────

/// Reasons the push server gives for rejecting a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ApnError {
    #[error("processing error")]
    Processing,

    #[error("missing device token")]
    MissingToken,

    #[error("missing topic")]
    MissingTopic,

    #[error("missing payload")]
    MissingPayload,

    #[error("invalid token size")]
    InvalidTokenSize,

    #[error("invalid topic size")]
    InvalidTopicSize,

    #[error("invalid payload size")]
    InvalidPayloadSize,

    #[error("invalid token")]
    InvalidTokenContent,

    #[error("unknown reason")]
    UnknownReason,

    #[error("server shutting down")]
    Shutdown,

    #[error("unknown status 0x{0:02x}")]
    UnknownStatus(u8),
}

// ── Client-local validation ──────────────────────────────────────────────────

/// A notification that cannot be put on the wire. Raised before any byte
/// is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("device token is empty")]
    EmptyToken,

    #[error("device token length {0} does not fit a 16-bit length field")]
    TokenTooLong(usize),

    #[error("device token is not valid hex: {0}")]
    InvalidToken(String),

    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(String),
}

// ── Umbrella ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("credential: {0}")]
    Credential(#[from] CredentialError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("io: {0}")]
    Io(#[from] IoError),

    #[error("server rejected notification: {0}")]
    Apn(#[from] ApnError),

    #[error("invalid notification: {0}")]
    InvalidNotification(#[from] ValidationError),

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] WireError),

    /// The identifier is still retained for an earlier notification.
    #[error("identifier {0} is already pending")]
    IdentifierOutOfSync(u32),

    #[error("not connected")]
    NotConnected,
}

impl Error {
    /// True when the stream this error came from can no longer be used.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Io(_) | Error::MalformedFrame(_) | Error::NotConnected
        )
    }

    /// True for failures reported by the push server itself.
    pub fn is_server_reported(&self) -> bool {
        matches!(self, Error::Apn(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
