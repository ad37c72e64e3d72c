//! Gateway Frames, Intents & Events
//!
//! The slice of the Discord gateway v10 JSON protocol the relay speaks:
//! handshake, heartbeats, and the handful of dispatch events it reacts to.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::GatewayError;
use crate::handler::MemberRemoved;

/// Gateway opcodes.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

bitflags! {
    /// Gateway intents requested at identify time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GatewayIntents: u64 {
        /// Guild create/delete, needed for guild context
        const GUILDS           = 1 << 0;
        /// Member add/update/remove (privileged)
        const GUILD_MEMBERS    = 1 << 1;
        /// Ban add/remove
        const GUILD_MODERATION = 1 << 2;
    }
}

impl GatewayIntents {
    /// Intents the relay subscribes with.
    pub const RELAY: Self = Self::GUILDS
        .union(Self::GUILD_MEMBERS)
        .union(Self::GUILD_MODERATION);
}

/// Raw gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// Heartbeat carrying the last sequence number seen.
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self {
            op: opcode::HEARTBEAT,
            d: sequence.map_or(Value::Null, Value::from),
            s: None,
            t: None,
        }
    }

    /// Identify handshake.
    pub fn identify(token: &str, intents: GatewayIntents) -> Self {
        Self {
            op: opcode::IDENTIFY,
            d: json!({
                "token": token,
                "intents": intents.bits(),
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": env!("CARGO_PKG_NAME"),
                    "device": env!("CARGO_PKG_NAME"),
                },
            }),
            s: None,
            t: None,
        }
    }
}

/// User object as sent in gateway events.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl GatewayUser {
    /// `name#1234` for legacy accounts, plain username otherwise.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{d}", self.username),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HelloData {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct ReadyData {
    user: GatewayUser,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuildUserData {
    guild_id: String,
    user: GatewayUser,
}

/// A decoded gateway frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Hello { heartbeat_interval_ms: u64 },
    HeartbeatAck,
    /// The gateway asks for an immediate heartbeat.
    HeartbeatRequest,
    Reconnect,
    InvalidSession { resumable: bool },
    Ready {
        user: GatewayUser,
        session_id: Option<String>,
    },
    MemberRemoved(MemberRemoved),
    BanAdded { guild_id: String, user: GatewayUser },
    /// A dispatch the relay does not react to.
    Other { name: String },
    UnknownOpcode(u8),
}

impl GatewayEvent {
    pub fn from_payload(payload: GatewayPayload) -> Result<Self, GatewayError> {
        let event = match payload.op {
            opcode::HELLO => {
                let hello: HelloData = decode("HELLO", payload.d)?;
                Self::Hello {
                    heartbeat_interval_ms: hello.heartbeat_interval,
                }
            }
            opcode::HEARTBEAT_ACK => Self::HeartbeatAck,
            opcode::HEARTBEAT => Self::HeartbeatRequest,
            opcode::RECONNECT => Self::Reconnect,
            opcode::INVALID_SESSION => Self::InvalidSession {
                resumable: payload.d.as_bool().unwrap_or(false),
            },
            opcode::DISPATCH => {
                let name = payload.t.unwrap_or_default();
                match name.as_str() {
                    "READY" => {
                        let ready: ReadyData = decode("READY", payload.d)?;
                        Self::Ready {
                            user: ready.user,
                            session_id: ready.session_id,
                        }
                    }
                    "GUILD_MEMBER_REMOVE" => {
                        let data: GuildUserData = decode("GUILD_MEMBER_REMOVE", payload.d)?;
                        Self::MemberRemoved(MemberRemoved {
                            display_name: Some(data.user.tag()),
                            user_id: data.user.id,
                            guild_id: Some(data.guild_id),
                        })
                    }
                    "GUILD_BAN_ADD" => {
                        let data: GuildUserData = decode("GUILD_BAN_ADD", payload.d)?;
                        Self::BanAdded {
                            guild_id: data.guild_id,
                            user: data.user,
                        }
                    }
                    _ => Self::Other { name },
                }
            }
            other => Self::UnknownOpcode(other),
        };
        Ok(event)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    event: &'static str,
    data: Value,
) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|source| GatewayError::Decode { event, source })
}
