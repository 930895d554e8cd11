//! Configuration for pushwire clients.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PUSHWIRE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/pushwire/config.toml
//!   3. ~/.config/pushwire/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::notification::Format;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushwireConfig {
    pub push: PushConfig,
    pub feedback: FeedbackConfig,
}

/// Which server environment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub environment: Environment,
    /// Empty = the environment's gateway.
    pub host: String,
    /// 0 = the environment's gateway port.
    pub port: u16,
    /// Wire format used by the hub: 0, 1 or 2.
    pub format: Format,
    /// How long a sent notification stays available for error correlation.
    pub feedback_span_secs: f64,
    /// Upper bound on a single error-response poll.
    pub read_timeout_ms: u64,
    /// Reconnect once and retry when a push or a failure read hits a dead connection.
    pub auto_reconnect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub read_timeout_ms: u64,
    /// Stop after this many records. 0 = until the server closes.
    pub max_records: usize,
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

pub const PUSH_HOST_PRODUCTION: &str = "gateway.push.apple.com";
pub const PUSH_HOST_SANDBOX: &str = "gateway.sandbox.push.apple.com";
pub const PUSH_PORT: u16 = 2195;

pub const FEEDBACK_HOST_PRODUCTION: &str = "feedback.push.apple.com";
pub const FEEDBACK_HOST_SANDBOX: &str = "feedback.sandbox.push.apple.com";
pub const FEEDBACK_PORT: u16 = 2196;

/// A host and port to open a secure stream to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn push(environment: Environment) -> Self {
        match environment {
            Environment::Sandbox => Self::new(PUSH_HOST_SANDBOX, PUSH_PORT),
            Environment::Production => Self::new(PUSH_HOST_PRODUCTION, PUSH_PORT),
        }
    }

    pub fn feedback(environment: Environment) -> Self {
        match environment {
            Environment::Sandbox => Self::new(FEEDBACK_HOST_SANDBOX, FEEDBACK_PORT),
            Environment::Production => Self::new(FEEDBACK_HOST_PRODUCTION, FEEDBACK_PORT),
        }
    }

    /// Replace host and port where the overrides are set.
    fn overridden(mut self, host: &str, port: u16) -> Self {
        if !host.is_empty() {
            self.host = host.to_owned();
        }
        if port != 0 {
            self.port = port;
        }
        self
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl PushConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::push(self.environment).overridden(&self.host, self.port)
    }

    pub fn feedback_span(&self) -> Duration {
        Duration::from_secs_f64(self.feedback_span_secs.max(0.0))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl FeedbackConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::feedback(self.environment).overridden(&self.host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PushwireConfig {
    fn default() -> Self {
        Self {
            push: PushConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            host: String::new(),
            port: 0,
            format: Format::Item,
            feedback_span_secs: 30.0,
            read_timeout_ms: 100,
            auto_reconnect: true,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Sandbox,
            host: String::new(),
            port: 0,
            read_timeout_ms: 1000,
            max_records: 1000,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("pushwire")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PushwireConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PushwireConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PUSHWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PushwireConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PUSHWIRE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup("PUSHWIRE_PUSH__ENVIRONMENT").and_then(|v| parse_environment(&v)) {
            self.push.environment = env;
        }
        if let Some(format) = lookup("PUSHWIRE_PUSH__FORMAT")
            .and_then(|v| v.parse::<u8>().ok())
            .and_then(|v| Format::try_from(v).ok())
        {
            self.push.format = format;
        }
        if let Some(v) = lookup("PUSHWIRE_PUSH__AUTO_RECONNECT") {
            self.push.auto_reconnect = v == "true" || v == "1";
        }
        if let Some(span) = lookup("PUSHWIRE_PUSH__FEEDBACK_SPAN_SECS").and_then(|v| v.parse().ok())
        {
            self.push.feedback_span_secs = span;
        }
        if let Some(ms) = lookup("PUSHWIRE_PUSH__READ_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.push.read_timeout_ms = ms;
        }
        if let Some(env) =
            lookup("PUSHWIRE_FEEDBACK__ENVIRONMENT").and_then(|v| parse_environment(&v))
        {
            self.feedback.environment = env;
        }
    }
}

fn parse_environment(value: &str) -> Option<Environment> {
    match value.to_ascii_lowercase().as_str() {
        "sandbox" => Some(Environment::Sandbox),
        "production" => Some(Environment::Production),
        _ => None,
    }
}
