/// Transactional email
///
/// Use cases build an [`EmailMessage`] from one of the [`templates`] and hand
/// it to an [`EmailService`]. Delivery failures are logged by the callers and
/// never fail the request that triggered them.
///
/// # Implementations
///
/// - [`LogMailer`]: writes the message to the log (development)
/// - [`HttpMailer`]: posts the message to an HTTP mail relay
/// - [`MemoryMailer`]: keeps messages in memory (tests)

pub mod templates;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info};

/// Header carrying the hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-DevHelp-Signature";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail transport failed: {0}")]
    Transport(String),

    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to sign mail request: {0}")]
    Signature(String),
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

/// Logs messages instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl EmailService for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "Email (log mailer)");
        debug!(html = %message.html, "Email body");
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Delivers through an HTTP mail relay
///
/// The relay receives `{from, to, subject, html}` as JSON. When an API key is
/// configured it is sent as a bearer token and also keys the body signature
/// in [`SIGNATURE_HEADER`].
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
            from: from.into(),
        })
    }
}

/// Hex HMAC-SHA256 of `body` under `key`
pub fn sign_body(key: &str, body: &[u8]) -> Result<String, MailError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| MailError::Signature(e.to_string()))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl EmailService for HttpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let body = serde_json::to_vec(&RelayPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        })
        .map_err(|e| MailError::Transport(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(key) = &self.api_key {
            request = request
                .bearer_auth(key)
                .header(SIGNATURE_HEADER, sign_body(key, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(to = %message.to, subject = %message.subject, "Email delivered to relay");
        Ok(())
    }
}

/// Collects messages in memory
///
/// Clones share the same outbox. [`MemoryMailer::failing`] builds one whose
/// sends always error, for exercising the "log and continue" paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    outbox: Arc<Mutex<Vec<EmailMessage>>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.outbox.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl EmailService for MemoryMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("outbox unavailable".to_string()));
        }
        self.outbox.lock().push(message);
        Ok(())
    }
}
