//! Deprovision Relay
//!
//! Listens for members leaving a chat community and asks an external web
//! service to deprovision the matching account with a signed, timestamped
//! notice.

pub mod config;
pub mod gateway;
pub mod handler;
pub mod notify;
