//! Relay Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::fmt;

use anyhow::{bail, Result};
use dpr_signing::Secret;

use crate::notify::{DeprovisionMode, NotifierConfig};

/// Relay configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Deprovisioning endpoint (POST destination)
    pub endpoint: String,

    /// Shared HMAC secret (notification is disabled without it)
    pub bot_secret: Option<Secret>,

    /// Gateway bot token
    pub discord_token: Option<String>,

    /// Whether the endpoint should only validate and log (must be chosen explicitly)
    pub dry_run: Option<bool>,

    /// Deprovisioning strength (default: soft)
    pub mode: DeprovisionMode,

    /// Gateway WebSocket URL
    pub gateway_url: String,
}

impl Config {
    pub const DEFAULT_ENDPOINT: &'static str =
        "https://minlight.work/discord-bot-only-connect/wp-json/discord/v1/deprovision";
    pub const DEFAULT_GATEWAY_URL: &'static str = "wss://gateway.discord.gg/?v=10&encoding=json";

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dry_run = match non_empty("DEPROVISION_DRY_RUN") {
            Some(raw) => match parse_bool(&raw) {
                Some(v) => Some(v),
                None => bail!("DEPROVISION_DRY_RUN must be true or false, got {raw:?}"),
            },
            None => None,
        };

        let mode = match non_empty("DEPROVISION_MODE") {
            Some(raw) => match DeprovisionMode::parse_str(&raw) {
                Some(mode) => mode,
                None => bail!("DEPROVISION_MODE must be soft or hard, got {raw:?}"),
            },
            None => DeprovisionMode::default(),
        };

        Ok(Self {
            endpoint: non_empty("WORDPRESS_ENDPOINT")
                .unwrap_or_else(|| Self::DEFAULT_ENDPOINT.into()),
            bot_secret: non_empty("DISCORD_BOT_SECRET").and_then(|s| Secret::new(s).ok()),
            discord_token: non_empty("DISCORD_TOKEN"),
            dry_run,
            mode,
            gateway_url: non_empty("DISCORD_GATEWAY_URL")
                .unwrap_or_else(|| Self::DEFAULT_GATEWAY_URL.into()),
        })
    }

    /// Names of required settings that are absent.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bot_secret.is_none() {
            missing.push("DISCORD_BOT_SECRET");
        }
        if self.discord_token.is_none() {
            missing.push("DISCORD_TOKEN");
        }
        if self.dry_run.is_none() {
            missing.push("DEPROVISION_DRY_RUN");
        }
        missing
    }

    /// Notifier settings, or `None` when notification must stay disabled.
    pub fn notifier_config(&self) -> Option<NotifierConfig> {
        let secret = self.bot_secret.clone()?;
        self.dry_run?;
        Some(NotifierConfig::new(self.endpoint.clone(), secret))
    }

    /// Create a fully populated configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9/deprovision".into(),
            bot_secret: Secret::new("test-secret").ok(),
            discord_token: Some("test-token".into()),
            dry_run: Some(true),
            mode: DeprovisionMode::Soft,
            gateway_url: "ws://127.0.0.1:9/gateway".into(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("bot_secret", &self.bot_secret)
            .field("discord_token", &self.discord_token.as_ref().map(|_| "<redacted>"))
            .field("dry_run", &self.dry_run)
            .field("mode", &self.mode)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
