//! Email channel: authenticated SMTP via lettre.
//!
//! Each send opens its own SMTP session (STARTTLS on 587, implicit TLS
//! otherwise), which is closed when the transport drops, on success or
//! failure alike.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::DeliveryChannel;
use crate::config::{Env, parse_or};
use crate::error::{ConfigError, DeliveryError};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
const STARTTLS_PORT: u16 = 587;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP settings and sender address.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Display name on the `From` header.
    pub from_name: Option<String>,
}

impl EmailConfig {
    /// `SMTP_EMAIL` and `SMTP_PASSWORD` are required.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let username = env.required("SMTP_EMAIL")?;
        let password = SecretString::from(env.required("SMTP_PASSWORD")?);
        let smtp_host = env.or("SMTP_HOST", "smtp.gmail.com");
        let smtp_port: u16 = parse_or(env, "SMTP_PORT", STARTTLS_PORT)?;
        let from_name = env.optional("SENDER_NAME");

        Ok(Self {
            smtp_host,
            smtp_port,
            from_address: username.clone(),
            username,
            password,
            from_name,
        })
    }
}

// ── Channel ─────────────────────────────────────────────────────────

pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, DeliveryError> {
        let from_address: Address =
            self.config
                .from_address
                .parse()
                .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: e.to_string(),
                })?;
        let from = Mailbox::new(self.config.from_name.clone(), from_address);

        let to: Mailbox = to
            .trim()
            .parse()
            .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
                address: to.to_string(),
                reason: e.to_string(),
            })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Rejected(format!("Failed to build email: {e}")))
    }

    fn transport(config: &EmailConfig) -> Result<SmtpTransport, DeliveryError> {
        let builder = if config.smtp_port == STARTTLS_PORT {
            SmtpTransport::starttls_relay(&config.smtp_host)
        } else {
            SmtpTransport::relay(&config.smtp_host)
        }
        .map_err(|e| DeliveryError::Connection(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        Ok(builder
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let email = self.build_message(recipient, subject, body)?;
        let config = self.config.clone();
        let to = recipient.trim().to_string();

        tracing::info!(host = %config.smtp_host, port = config.smtp_port, "Connecting to SMTP");

        tokio::task::spawn_blocking(move || {
            let transport = Self::transport(&config)?;
            transport.send(&email).map_err(|e| {
                classify_smtp_failure(
                    &to,
                    e.status().map(|code| code.to_string()).as_deref(),
                    e.is_permanent() || e.is_transient(),
                    e.to_string(),
                )
            })?;
            Ok::<(), DeliveryError>(())
        })
        .await
        .map_err(|e| DeliveryError::Connection(format!("SMTP send task failed: {e}")))??;

        tracing::info!(recipient = %recipient, "Email sent");
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Map an SMTP failure onto `DeliveryError`.
///
/// `code` is the server's three-digit reply code, if it sent one;
/// `server_replied` is false for network, TLS and client-side failures.
pub fn classify_smtp_failure(
    recipient: &str,
    code: Option<&str>,
    server_replied: bool,
    message: String,
) -> DeliveryError {
    match code {
        Some("530" | "534" | "535") => DeliveryError::AuthFailed(message),
        Some(c) if c.starts_with("55") => DeliveryError::RecipientRejected {
            recipient: recipient.to_string(),
            reason: message,
        },
        _ if server_replied => DeliveryError::Rejected(message),
        _ => DeliveryError::Connection(message),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            username: "me@test.com".into(),
            password: SecretString::from("pass"),
            from_address: "me@test.com".into(),
            from_name: Some("Sam Lee".into()),
        }
    }

    #[test]
    fn auth_codes_classified() {
        for code in ["530", "534", "535"] {
            let err = classify_smtp_failure("x@y.z", Some(code), true, "denied".into());
            assert!(matches!(err, DeliveryError::AuthFailed(_)), "code {code}");
        }
    }

    #[test]
    fn mailbox_codes_are_recipient_rejections() {
        let err = classify_smtp_failure("x@y.z", Some("550"), true, "no such user".into());
        match err {
            DeliveryError::RecipientRejected { recipient, .. } => assert_eq!(recipient, "x@y.z"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_replies_and_network_failures() {
        let err = classify_smtp_failure("x@y.z", Some("421"), true, "busy".into());
        assert!(matches!(err, DeliveryError::Rejected(_)));
        let err = classify_smtp_failure("x@y.z", None, false, "connection refused".into());
        assert!(matches!(err, DeliveryError::Connection(_)));
    }

    #[test]
    fn message_carries_headers() {
        let channel = EmailChannel::new(config());
        let message = channel
            .build_message("hr@acme.io", "Hello Acme", "Body text")
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: hr@acme.io"));
        assert!(raw.contains("Subject: Hello Acme"));
        assert!(raw.contains("Sam Lee"));
        assert!(raw.contains("Body text"));
    }

    #[test]
    fn invalid_recipient_rejected_before_connecting() {
        let channel = EmailChannel::new(config());
        let err = channel.build_message("not-an-address", "s", "b").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn send_to_invalid_recipient_fails_fast() {
        let channel = EmailChannel::new(config());
        let err = channel.send("   ", "s", "b").await.unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { .. }));
    }

    #[test]
    fn config_requires_credentials() {
        let env = Env::from_pairs(&[("SMTP_EMAIL", "me@test.com")]);
        let err = EmailConfig::from_env(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "SMTP_PASSWORD"));
    }

    #[test]
    fn config_defaults_to_gmail_starttls() {
        let env = Env::from_pairs(&[
            ("SMTP_EMAIL", "me@test.com"),
            ("SMTP_PASSWORD", "app-password"),
        ]);
        let cfg = EmailConfig::from_env(&env).unwrap();
        assert_eq!(cfg.smtp_host, "smtp.gmail.com");
        assert_eq!(cfg.smtp_port, 587);
        assert_eq!(cfg.from_address, "me@test.com");
        assert!(cfg.from_name.is_none());
    }

    #[test]
    fn channel_name() {
        assert_eq!(EmailChannel::new(config()).name(), "email");
    }
}
