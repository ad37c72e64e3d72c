//! Gateway Error Types

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Gateway connection errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame could not be decoded.
    #[error("Failed to decode {event}: {source}")]
    Decode {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A frame could not be encoded.
    #[error("Failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// The gateway closed the connection with a code that forbids reconnecting.
    #[error("Gateway closed the session ({code}): {reason}")]
    Closed { code: u16, reason: String },
}

impl GatewayError {
    /// Close codes after which reconnecting cannot succeed
    /// (bad token, sharding, API version, or intent problems).
    pub const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

    pub fn is_fatal_close_code(code: u16) -> bool {
        Self::FATAL_CLOSE_CODES.contains(&code)
    }

    /// Whether the connection loop should stop instead of reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed { code, .. } if Self::is_fatal_close_code(*code))
    }
}
