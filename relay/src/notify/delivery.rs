//! Deprovision Notice Delivery
//!
//! Signs and POSTs one notice per departure. A 403 timestamp rejection gets
//! exactly one retry with a fresh timestamp; every other failure is final.
//!
//! ```text
//! START -> SENT -> SUCCESS
//!               -> FAILED
//!               -> TIMESTAMP_REJECTED -> RETRYING -> SUCCESS | FAILED
//! ```

use chrono::{DateTime, Utc};
use dpr_signing::{sign, skew_seconds, within_window, Signature};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::types::{
    Delivered, DeprovisionMode, NotificationRequest, NotificationResult, NotifierConfig,
    NotifyError,
};

/// Sends signed deprovisioning notices to the configured endpoint.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    config: NotifierConfig,
}

impl Notifier {
    /// Build a notifier with its own pooled HTTP client.
    pub fn new(config: NotifierConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(NotifyError::Client)?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Notify the endpoint that `subject_id` should be deprovisioned.
    ///
    /// Never panics; every outcome, including transport failures, comes back
    /// as the returned result.
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    pub async fn notify(
        &self,
        subject_id: &str,
        mode: DeprovisionMode,
        dry_run: bool,
    ) -> NotificationResult {
        info!(subject_id, mode = %mode, dry_run, "Sending deprovision notice");

        let first_ts = fresh_timestamp(None);
        let err = match self.attempt(subject_id, first_ts, mode, dry_run).await {
            Ok((status, data)) => {
                info!(subject_id, status, response = %data, "Deprovision notice delivered");
                return Ok(Delivered {
                    status,
                    data,
                    attempts: 1,
                });
            }
            Err(e) => e,
        };

        if !matches!(err, NotifyError::TimestampRejected { .. }) {
            log_failure(subject_id, &err, 1);
            return Err(err);
        }

        warn!(
            subject_id,
            ts = first_ts,
            error = %err,
            "Timestamp rejected, retrying once with a fresh timestamp"
        );
        tokio::time::sleep(self.config.retry_delay).await;

        // Never re-sign the rejected timestamp, even with a short retry delay.
        let retry_ts = fresh_timestamp(Some(first_ts));
        info!(subject_id, ts = retry_ts, "Retrying deprovision notice");

        match self.attempt(subject_id, retry_ts, mode, dry_run).await {
            Ok((status, data)) => {
                info!(
                    subject_id,
                    status,
                    response = %data,
                    "Deprovision notice delivered after retry"
                );
                Ok(Delivered {
                    status,
                    data,
                    attempts: 2,
                })
            }
            Err(e) => {
                log_failure(subject_id, &e, 2);
                Err(e)
            }
        }
    }

    /// One signed POST. Returns the status and parsed body on 2xx.
    async fn attempt(
        &self,
        subject_id: &str,
        timestamp: i64,
        mode: DeprovisionMode,
        dry_run: bool,
    ) -> Result<(u16, Value), NotifyError> {
        let signature = sign(&self.config.secret, subject_id, timestamp);
        self.log_diagnostics(subject_id, timestamp, &signature);
        let request = NotificationRequest::new(subject_id, timestamp, signature, mode, dry_run);

        let response = self
            .client
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(NotifyError::Transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(NotifyError::Transport)?;
        let body = parse_body(&bytes);

        if status.is_success() {
            Ok((status.as_u16(), body))
        } else {
            Err(NotifyError::from_response(status.as_u16(), body))
        }
    }

    fn log_diagnostics(&self, subject_id: &str, timestamp: i64, signature: &Signature) {
        let now = Utc::now();
        let ts_date = DateTime::from_timestamp(timestamp, 0)
            .map(|d| d.to_rfc3339())
            .unwrap_or_default();

        debug!(
            subject_id,
            ts = timestamp,
            ts_date = %ts_date,
            current_time = %now.to_rfc3339(),
            skew_secs = skew_seconds(timestamp, now.timestamp()),
            in_window = within_window(timestamp, now.timestamp()),
            signature = %signature.preview(),
            endpoint = %self.config.endpoint,
            "Signed deprovision request"
        );
    }
}

/// Current Unix seconds, strictly after `after` when given.
fn fresh_timestamp(after: Option<i64>) -> i64 {
    let now = Utc::now().timestamp();
    match after {
        Some(prev) => now.max(prev.saturating_add(1)),
        None => now,
    }
}

/// JSON when possible, otherwise the text as a JSON string; empty is `null`.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn log_failure(subject_id: &str, err: &NotifyError, attempts: u8) {
    error!(
        subject_id,
        attempts,
        status = ?err.status(),
        body = ?err.body(),
        timeout = err.is_timeout(),
        error = %err,
        "Deprovision notice failed"
    );
}
