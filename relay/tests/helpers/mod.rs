//! Reusable test helpers for notifier and gateway integration tests.
//!
//! Provides a mock deprovisioning endpoint that verifies signatures and the
//! timestamp window the way the real receiving service does.
#![allow(dead_code)]

use std::time::Duration;

use chrono::Utc;
use dpr_relay::notify::{NotificationRequest, Notifier, NotifierConfig};
use dpr_signing::{verify, within_window, Secret};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockBuilder, MockServer, Request, Respond, ResponseTemplate};

pub const TEST_SECRET: &str = "s3cr3t";
pub const DEPROVISION_PATH: &str = "/wp-json/discord/v1/deprovision";

pub fn test_secret() -> Secret {
    Secret::new(TEST_SECRET).unwrap()
}

pub fn endpoint(server: &MockServer) -> String {
    format!("{}{DEPROVISION_PATH}", server.uri())
}

/// Config with the production timeout and a short retry delay.
pub fn notifier_config(server: &MockServer) -> NotifierConfig {
    NotifierConfig::new(endpoint(server), test_secret()).with_retry_delay(Duration::from_millis(50))
}

pub fn notifier(server: &MockServer) -> Notifier {
    Notifier::new(notifier_config(server)).unwrap()
}

/// Matcher for a JSON POST to the deprovisioning path.
pub fn deprovision_post() -> MockBuilder {
    Mock::given(method("POST"))
        .and(path(DEPROVISION_PATH))
        .and(header("Content-Type", "application/json"))
}

pub fn timestamp_rejection() -> ResponseTemplate {
    ResponseTemplate::new(403).set_body_json(json!({
        "code": "forbidden",
        "message": "Timestamp is out of range",
        "data": { "status": 403 },
    }))
}

/// Request bodies received so far, in arrival order.
pub async fn received_bodies(server: &MockServer) -> Vec<NotificationRequest> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.body_json::<NotificationRequest>().unwrap())
        .collect()
}

/// Receiving service that checks the signature and the ±300s window.
///
/// `clock_offset_secs` shifts the receiver's clock relative to the sender's.
pub struct ConformantReceiver {
    pub secret: Secret,
    pub clock_offset_secs: i64,
}

impl ConformantReceiver {
    pub fn new() -> Self {
        Self {
            secret: test_secret(),
            clock_offset_secs: 0,
        }
    }

    pub fn with_clock_offset(clock_offset_secs: i64) -> Self {
        Self {
            secret: test_secret(),
            clock_offset_secs,
        }
    }
}

impl Respond for ConformantReceiver {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = request.body_json::<NotificationRequest>() else {
            return ResponseTemplate::new(400).set_body_json(json!({"message": "Bad request"}));
        };

        let now = Utc::now().timestamp() + self.clock_offset_secs;
        if !within_window(body.timestamp, now) {
            return timestamp_rejection();
        }

        if !verify(&self.secret, &body.subject_id, body.timestamp, &body.signature) {
            return ResponseTemplate::new(403).set_body_json(json!({
                "code": "forbidden",
                "message": "Invalid signature",
            }));
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "status": "ok",
            "discord_user_id": body.subject_id,
            "mode": body.mode,
            "dry_run": body.dry_run,
        }))
    }
}
