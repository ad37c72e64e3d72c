//! Notifier Integration Tests
//!
//! Drives `Notifier::notify` against wiremock endpoints covering delivery,
//! the single timestamp retry, and failures that must not retry.

mod helpers;

use std::time::Duration;

use dpr_relay::notify::{DeprovisionMode, Notifier, NotifierConfig, NotifyError};
use serde_json::json;
use wiremock::{MockServer, ResponseTemplate};

use helpers::*;

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test]
async fn success_returns_response_body() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let delivered = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, false)
        .await
        .unwrap();

    assert_eq!(delivered.status, 200);
    assert_eq!(delivered.data, json!({"status": "ok"}));
    assert_eq!(delivered.attempts, 1);
    assert!(!delivered.was_retried());
}

#[tokio::test]
async fn request_body_matches_wire_contract() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let before = chrono::Utc::now().timestamp();
    notifier(&server)
        .notify("12345", DeprovisionMode::Hard, true)
        .await
        .unwrap();
    let after = chrono::Utc::now().timestamp();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let raw: serde_json::Value = requests[0].body_json().unwrap();
    let keys: Vec<&str> = raw.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys.len(), 5);
    assert_eq!(raw["discord_user_id"], "12345");
    assert_eq!(raw["mode"], "hard");
    assert_eq!(raw["dry_run"], true);

    let ts = raw["ts"].as_i64().unwrap();
    assert!((before..=after).contains(&ts));
    assert_eq!(
        raw["sig"].as_str().unwrap(),
        dpr_signing::sign(&test_secret(), "12345", ts).as_str()
    );
}

#[tokio::test]
async fn dry_run_flag_is_forwarded() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ConformantReceiver::new())
        .expect(2)
        .mount(&server)
        .await;

    let notifier = notifier(&server);
    let dry = notifier
        .notify("111", DeprovisionMode::Soft, true)
        .await
        .unwrap();
    let live = notifier
        .notify("222", DeprovisionMode::Soft, false)
        .await
        .unwrap();

    assert_eq!(dry.data["dry_run"], true);
    assert_eq!(live.data["dry_run"], false);

    let bodies = received_bodies(&server).await;
    assert!(bodies[0].dry_run);
    assert!(!bodies[1].dry_run);
}

#[tokio::test]
async fn conformant_receiver_accepts_fresh_request() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ConformantReceiver::new())
        .expect(1)
        .mount(&server)
        .await;

    let delivered = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap();

    assert_eq!(delivered.data["status"], "ok");
    assert_eq!(delivered.data["discord_user_id"], "12345");
}

#[tokio::test]
async fn non_json_success_body_is_kept_as_text() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
        .expect(1)
        .mount(&server)
        .await;

    let delivered = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap();

    assert_eq!(delivered.status, 202);
    assert_eq!(delivered.data, json!("queued"));
}

// =============================================================================
// Timestamp Retry
// =============================================================================

#[tokio::test]
async fn timestamp_rejection_then_success_retries_once() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(timestamp_rejection())
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let delivered = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap();

    assert_eq!(delivered.data, json!({"status": "ok"}));
    assert_eq!(delivered.attempts, 2);
    assert!(delivered.was_retried());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn retry_uses_newer_timestamp_and_fresh_signature() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(timestamp_rejection())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // The retry must carry a signature a real receiver accepts.
    deprovision_post()
        .respond_with(ConformantReceiver::new())
        .mount(&server)
        .await;

    notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap();

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    assert!(bodies[1].timestamp > bodies[0].timestamp);
    assert_ne!(bodies[1].signature, bodies[0].signature);
    assert_eq!(bodies[0].subject_id, bodies[1].subject_id);
    assert_eq!(bodies[0].mode, bodies[1].mode);
    assert_eq!(bodies[0].dry_run, bodies[1].dry_run);
}

#[tokio::test]
async fn retry_waits_for_configured_delay() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(timestamp_rejection())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let config = NotifierConfig::new(endpoint(&server), test_secret())
        .with_retry_delay(Duration::from_millis(300));
    let started = std::time::Instant::now();
    Notifier::new(config)
        .unwrap()
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn second_timestamp_rejection_fails_without_third_attempt() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(timestamp_rejection())
        .expect(2)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::TimestampRejected { status: 403, .. }));
    assert_eq!(err.status(), Some(403));
    assert!(err.to_string().contains("Timestamp is out of range"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn skewed_receiver_clock_rejects_both_attempts() {
    let server = MockServer::start().await;

    // Receiver clock runs 10 minutes ahead; no fresh timestamp can satisfy it.
    deprovision_post()
        .respond_with(ConformantReceiver::with_clock_offset(600))
        .expect(2)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::TimestampRejected { .. }));
}

#[tokio::test]
async fn retry_failing_differently_returns_that_failure() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(timestamp_rejection())
        .up_to_n_times(1)
        .mount(&server)
        .await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    match err {
        NotifyError::Rejected { status, message, .. } => {
            assert_eq!(status, 500);
            assert_eq!(message, "db down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

// =============================================================================
// Failures Without Retry
// =============================================================================

#[tokio::test]
async fn server_error_is_not_retried() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(err.body(), Some(&json!("Internal Server Error")));
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Timestamp is out of range"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn other_forbidden_is_not_retried() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"code": "forbidden", "message": "Invalid signature"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server)
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    match err {
        NotifyError::Rejected { status, message, .. } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Invalid signature");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn wrong_secret_is_rejected_without_retry() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(ConformantReceiver::new())
        .expect(1)
        .mount(&server)
        .await;

    let config = NotifierConfig::new(
        endpoint(&server),
        dpr_signing::Secret::new("not-the-shared-secret").unwrap(),
    );
    let err = Notifier::new(config)
        .unwrap()
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Rejected { status: 403, .. }));
}

#[tokio::test]
async fn timeout_fails_without_retry() {
    let server = MockServer::start().await;

    deprovision_post()
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok"}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = notifier_config(&server).with_request_timeout(Duration::from_millis(100));
    let err = Notifier::new(config)
        .unwrap()
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Transport(_)));
    assert!(err.is_timeout());
    assert_eq!(err.status(), None);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn connection_refused_is_a_transport_failure() {
    // Port 9 (discard) is not served in the test environment.
    let config = NotifierConfig::new("http://127.0.0.1:9/deprovision", test_secret());
    let err = Notifier::new(config)
        .unwrap()
        .notify("12345", DeprovisionMode::Soft, true)
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::Transport(_)));
    assert!(!err.is_timeout());
}
