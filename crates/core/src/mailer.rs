//! Outbound email seam used by account registration.
//!
//! The engine only needs to hand a verification link to someone. Real delivery
//! lives behind [`Mailer`]; the API crate provides an SMTP implementation.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Error type for mail delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("invalid mail address: {0}")]
    Address(String),
}

/// Delivers account emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the verification link for `token` to `email`.
    async fn send_verification(&self, email: &str, token: &str) -> Result<(), MailError>;
}

/// Build the link a recipient follows to verify their account.
pub fn verification_link(base_url: &str, token: &str) -> String {
    format!("{}/api/v1/auth/verify/{token}", base_url.trim_end_matches('/'))
}

/// Writes verification links to the log instead of sending them.
///
/// Used when no SMTP relay is configured.
pub struct LogMailer {
    base_url: String,
}

impl LogMailer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, token: &str) -> Result<(), MailError> {
        tracing::info!(
            to = email,
            link = %verification_link(&self.base_url, token),
            "Verification email not sent (no SMTP relay configured)"
        );
        Ok(())
    }
}

/// A message captured by [`MemoryMailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub token: String,
}

/// Records messages in memory. Can be switched to fail every send.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// The token most recently sent to `email`.
    pub async fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|m| m.to == email)
            .map(|m| m.token.clone())
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_verification(&self, email: &str, token: &str) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("relay refused the message".into()));
        }
        self.sent.lock().await.push(SentMessage {
            to: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}
