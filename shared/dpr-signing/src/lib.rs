//! Deprovision Request Signing
//!
//! Timestamped HMAC-SHA256 signatures for deprovisioning notices.
//!
//! - **Signer**: `sign` / `verify` over `"{subject_id}:{timestamp}"`
//! - **Window**: freshness check shared with the receiving service (±300s)

pub mod error;
pub mod signer;
pub mod window;

pub use error::{Result, SigningError};
pub use signer::{sign, signing_message, verify, Secret, Signature};
pub use window::{skew_seconds, within_window, TIMESTAMP_WINDOW_SECS};
