//! Chat Gateway Subscription
//!
//! Minimal gateway client: identify, heartbeat, reconnect, and forward
//! member departures to a [`MemberRemovedHandler`](crate::handler::MemberRemovedHandler).

pub mod connection;
pub mod error;
pub mod events;

pub use connection::GatewayClient;
pub use error::GatewayError;
pub use events::{GatewayEvent, GatewayIntents, GatewayPayload, GatewayUser};
