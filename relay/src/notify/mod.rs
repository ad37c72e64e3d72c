//! Deprovisioning Notifier
//!
//! HTTP POST delivery of signed, timestamped deprovisioning notices with a
//! single retry on timestamp-window rejection.

pub mod delivery;
pub mod types;

pub use delivery::Notifier;
pub use types::{
    Delivered, DeprovisionMode, NotificationRequest, NotificationResult, NotifierConfig,
    NotifyError, TIMESTAMP_REJECTION_MARKER,
};
