//! Member Departure Handling
//!
//! The single inbound entry point: the gateway reports a departure and the
//! handler awaits one deprovisioning notice for it.

use std::future::Future;

use tracing::{error, info, warn};

use crate::notify::{DeprovisionMode, Notifier};

/// A member left (or was removed from) a community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRemoved {
    /// Platform user ID, forwarded as the deprovisioning subject.
    pub user_id: String,
    /// Human-readable tag, when the gateway supplied one.
    pub display_name: Option<String>,
    /// Community the member left.
    pub guild_id: Option<String>,
}

impl MemberRemoved {
    /// Display name, falling back to the user ID.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// Receives member-removal events from the gateway.
pub trait MemberRemovedHandler: Send + Sync + 'static {
    fn on_member_removed(&self, event: MemberRemoved) -> impl Future<Output = ()> + Send;
}

/// Forwards departures to the deprovisioning endpoint.
///
/// Without a notifier (missing secret or dry-run choice) departures are
/// logged and skipped.
#[derive(Debug, Clone)]
pub struct DeprovisionHandler {
    notifier: Option<Notifier>,
    mode: DeprovisionMode,
    dry_run: bool,
}

impl DeprovisionHandler {
    pub fn new(notifier: Notifier, mode: DeprovisionMode, dry_run: bool) -> Self {
        Self {
            notifier: Some(notifier),
            mode,
            dry_run,
        }
    }

    /// Handler that never sends; every departure logs a skip warning.
    pub const fn disabled() -> Self {
        Self {
            notifier: None,
            mode: DeprovisionMode::Soft,
            dry_run: true,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }
}

impl MemberRemovedHandler for DeprovisionHandler {
    async fn on_member_removed(&self, event: MemberRemoved) {
        info!(
            user_id = %event.user_id,
            user = %event.label(),
            guild_id = ?event.guild_id,
            "Member left"
        );

        let Some(notifier) = &self.notifier else {
            warn!(
                user_id = %event.user_id,
                "Notification disabled by configuration, skipping deprovision notice"
            );
            return;
        };

        match notifier
            .notify(&event.user_id, self.mode, self.dry_run)
            .await
        {
            Ok(delivered) => info!(
                user_id = %event.user_id,
                user = %event.label(),
                attempts = delivered.attempts,
                dry_run = self.dry_run,
                "Deprovisioning completed"
            ),
            Err(e) => error!(
                user_id = %event.user_id,
                user = %event.label(),
                error = %e,
                "Deprovisioning failed"
            ),
        }
    }
}
