//! Notification Types
//!
//! Wire payload, delivery outcome, and errors for deprovisioning notices.

use std::time::Duration;

use dpr_signing::{Secret, Signature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Substring the receiving service puts in its 403 message when the signed
/// timestamp falls outside its freshness window.
pub const TIMESTAMP_REJECTION_MARKER: &str = "Timestamp is out of range";

/// Deprovisioning strength applied by the receiving service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeprovisionMode {
    /// Disable or flag the account.
    #[default]
    Soft,
    /// Permanently delete the account.
    Hard,
}

impl DeprovisionMode {
    /// Parse from a config string (`"soft"` / `"hard"`, case-insensitive).
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "soft" => Some(Self::Soft),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

impl std::fmt::Display for DeprovisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body POSTed to the deprovisioning endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    #[serde(rename = "discord_user_id")]
    pub subject_id: String,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "sig")]
    pub signature: String,
    pub mode: DeprovisionMode,
    pub dry_run: bool,
}

impl NotificationRequest {
    /// Assemble a request around a signature computed over `subject_id` and `timestamp`.
    pub fn new(
        subject_id: &str,
        timestamp: i64,
        signature: Signature,
        mode: DeprovisionMode,
        dry_run: bool,
    ) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            timestamp,
            signature: signature.into_string(),
            mode,
            dry_run,
        }
    }
}

/// Notifier settings, passed in explicitly at construction.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// POST destination.
    pub endpoint: String,
    /// Shared HMAC secret.
    pub secret: Secret,
    /// Per-request timeout (default: 10s).
    pub request_timeout: Duration,
    /// Pause before the single timestamp retry (default: 1000ms).
    pub retry_delay: Duration,
}

impl NotifierConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(endpoint: impl Into<String>, secret: Secret) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    /// HTTP status of the accepted attempt.
    pub status: u16,
    /// Response body: parsed JSON, a JSON string for non-JSON text, `null` when empty.
    pub data: Value,
    /// Number of HTTP requests made (1, or 2 after a timestamp retry).
    pub attempts: u8,
}

impl Delivered {
    /// Whether the accepted attempt was the timestamp retry.
    pub const fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Outcome of one `notify` call.
pub type NotificationResult = Result<Delivered, NotifyError>;

/// Notification errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Timestamp rejected (HTTP {status}): {message}")]
    TimestampRejected {
        status: u16,
        message: String,
        body: Value,
    },
    #[error("Rejected (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        body: Value,
    },
}

impl NotifyError {
    /// HTTP status, when the service answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::TimestampRejected { status, .. } | Self::Rejected { status, .. } => Some(*status),
            Self::Client(_) | Self::Transport(_) => None,
        }
    }

    /// Response body, when the service answered.
    pub const fn body(&self) -> Option<&Value> {
        match self {
            Self::TimestampRejected { body, .. } | Self::Rejected { body, .. } => Some(body),
            Self::Client(_) | Self::Transport(_) => None,
        }
    }

    /// Whether the request timed out before a response arrived.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Classify a non-2xx response.
    pub(crate) fn from_response(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let timestamp_rejected = status == 403
            && message
                .as_deref()
                .is_some_and(|m| m.contains(TIMESTAMP_REJECTION_MARKER));

        let message = message.unwrap_or_else(|| format!("HTTP {status}"));
        if timestamp_rejected {
            Self::TimestampRejected {
                status,
                message,
                body,
            }
        } else {
            Self::Rejected {
                status,
                message,
                body,
            }
        }
    }
}
