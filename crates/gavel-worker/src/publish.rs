//! Result delivery
//!
//! Hands finished verdicts back to the originating system: a signed webhook
//! POST when the submission carries a callback URL, otherwise a push onto the
//! reply queue named on the message. Delivery failures are logged, never
//! retried, and never escalate to a SystemError for the submission; the
//! grading itself already completed.

use std::fmt::Write as _;

use hmac::{Hmac, Mac};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sha2::Sha256;
use tracing::{debug, error, warn};

use gavel::{JudgeReport, ResultPayload, Submission};

const SIGNATURE_HEADER: &str = "X-OJ-Signature";
const USER_AGENT: &str = concat!("gavel-worker/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Publisher {
    conn: ConnectionManager,
    http: reqwest::Client,
    webhook_secret: Option<String>,
}

impl Publisher {
    pub fn new(conn: ConnectionManager, webhook_secret: Option<String>) -> Self {
        Self {
            conn,
            http: reqwest::Client::new(),
            webhook_secret,
        }
    }

    /// Deliver a finished verdict to the submission's delivery target
    pub async fn publish(&self, submission: &Submission, report: JudgeReport) {
        let payload = ResultPayload::new(submission.submission_id, report);
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(err) => {
                error!(
                    submission_id = %submission.submission_id,
                    error = %err,
                    "failed to serialize result payload"
                );
                return;
            }
        };

        if let Some(url) = submission.callback_url.as_deref() {
            if let Err(err) = self.post_webhook(url, body).await {
                warn!(
                    submission_id = %submission.submission_id,
                    url,
                    error = %err,
                    "webhook delivery failed"
                );
            } else {
                debug!(submission_id = %submission.submission_id, url, "webhook delivered");
            }
        } else if let Some(reply_to) = submission.reply_to.as_deref() {
            let mut conn = self.conn.clone();
            if let Err(err) = conn.lpush::<_, _, ()>(reply_to, body).await {
                warn!(
                    submission_id = %submission.submission_id,
                    reply_to,
                    error = %err,
                    "reply-queue delivery failed"
                );
            } else {
                debug!(submission_id = %submission.submission_id, reply_to, "result published");
            }
        } else {
            warn!(
                submission_id = %submission.submission_id,
                "submission carries no delivery target; result dropped"
            );
        }
    }

    async fn post_webhook(&self, url: &str, body: Vec<u8>) -> anyhow::Result<()> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            anyhow::bail!("webhook secret not configured");
        };

        let signature = sign(secret, &body);
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, format!("sha256={signature}"))
            .header("User-Agent", USER_AGENT)
            .body(body)
            .send()
            .await?;

        if response.status() != reqwest::StatusCode::OK {
            anyhow::bail!("callback returned status {}", response.status());
        }

        Ok(())
    }
}

/// Hex-encoded HMAC-SHA256 of the raw request body
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);

    let digest = mac.finalize().into_bytes();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}
