//! Verification email delivery via SMTP.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. If `SMTP_HOST` is
//! not set, [`SmtpConfig::from_lookup`] returns `None` and the binary falls
//! back to [`warden_core::mailer::LogMailer`].

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use warden_core::mailer::{verification_link, MailError, Mailer};

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@warden.local";

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl SmtpConfig {
    /// Load SMTP settings, or `None` when no relay is configured.
    ///
    /// | Variable        | Required | Default                 |
    /// |-----------------|----------|-------------------------|
    /// | `SMTP_HOST`     | yes      | --                      |
    /// | `SMTP_PORT`     | no       | `587`                   |
    /// | `SMTP_FROM`     | no       | `noreply@warden.local`  |
    /// | `SMTP_USER`     | no       | --                      |
    /// | `SMTP_PASSWORD` | no       | --                      |
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let smtp_host = lookup("SMTP_HOST").filter(|h| !h.is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: lookup("SMTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: lookup("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: lookup("SMTP_USER"),
            smtp_password: lookup("SMTP_PASSWORD"),
        })
    }
}

/// Sends verification links through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, base_url: impl Into<String>) -> Result<Self, MailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address,
            base_url: base_url.into(),
        })
    }

    fn verification_message(&self, email: &str, token: &str) -> Result<Message, MailError> {
        let link = verification_link(&self.base_url, token);
        let body = format!(
            "Thank you for registering. Verify your email address by opening this link:\n\n{link}\n\n\
             If you did not create an account, ignore this email."
        );

        Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e: lettre::address::AddressError| MailError::Address(e.to_string()))?,
            )
            .to(email
                .parse()
                .map_err(|e: lettre::address::AddressError| MailError::Address(e.to_string()))?)
            .subject("Please verify your email address")
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| MailError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification(&self, email: &str, token: &str) -> Result<(), MailError> {
        let message = self.verification_message(email, token)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::info!(to = email, "Verification email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn no_relay_without_smtp_host() {
        assert!(SmtpConfig::from_lookup(lookup_from(&[])).is_none());
        assert!(SmtpConfig::from_lookup(lookup_from(&[("SMTP_HOST", "")])).is_none());
    }

    #[test]
    fn defaults_fill_port_and_sender() {
        let config = SmtpConfig::from_lookup(lookup_from(&[("SMTP_HOST", "smtp.example.com")]))
            .unwrap();
        assert_eq!(config.smtp_port, DEFAULT_SMTP_PORT);
        assert_eq!(config.from_address, DEFAULT_FROM_ADDRESS);
        assert!(config.smtp_user.is_none());
    }

    #[tokio::test]
    async fn message_carries_the_verification_link() {
        let config = SmtpConfig::from_lookup(lookup_from(&[("SMTP_HOST", "smtp.example.com")]))
            .unwrap();
        let mailer = SmtpMailer::new(config, "https://auth.example").unwrap();

        let message = mailer
            .verification_message("grace@example.com", "tok123")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: grace@example.com"));
        assert!(raw.contains("https://auth.example/api/v1/auth/verify/tok123"));
    }

    #[tokio::test]
    async fn malformed_recipient_is_an_address_error() {
        let config = SmtpConfig::from_lookup(lookup_from(&[("SMTP_HOST", "smtp.example.com")]))
            .unwrap();
        let mailer = SmtpMailer::new(config, "https://auth.example").unwrap();
        assert!(matches!(
            mailer.verification_message("not an address", "tok"),
            Err(MailError::Address(_))
        ));
    }
}
