//! SMTP submission using lettre.
//!
//! The message is already MIME-encoded, so it is sent with
//! [`AsyncTransport::send_raw`] rather than built with lettre's message
//! builder. Only `To`, `Subject` and `Date` are added here.

use super::{ensure_single_recipient, Transport};
use crate::error::{NotificationError, NotificationResult};
use crate::renderer::encode_header;
use async_trait::async_trait;
use chrono::Utc;
use core_config::{env_flag, env_or_default, env_parse, ConfigError, FromEnv};
use lettre::{
    address::{Address, Envelope},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use std::env;
use std::time::Duration;
use tracing::{debug, error, info};

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Optional for local relays like Mailpit.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Implicit TLS relay; plain connection otherwise (local development).
    pub use_tls: bool,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            use_tls: false,
            timeout: Duration::from_secs(10),
        }
    }

    /// Builder method to set TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl FromEnv for SmtpConfig {
    /// Reads from environment variables (defaults suit a local Mailpit):
    /// - SMTP_HOST: defaults to "localhost"
    /// - SMTP_PORT: defaults to 1025
    /// - SMTP_USERNAME / SMTP_PASSWORD: optional
    /// - SMTP_USE_TLS: defaults to false
    /// - SMTP_TIMEOUT_SECS: defaults to 10
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse("SMTP_PORT", 1025)?,
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            use_tls: env_flag("SMTP_USE_TLS", false),
            timeout: Duration::from_secs(env_parse("SMTP_TIMEOUT_SECS", 10)?),
        })
    }
}

/// Relays messages through an SMTP server.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let transport = Self::build_transport(&config)?;
        info!(host = %config.host, port = config.port, tls = config.use_tls, "SMTP transport configured");
        Ok(Self { transport, config })
    }

    fn build_transport(config: &SmtpConfig) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotificationError::Transport(format!("Failed to create SMTP relay: {}", e)))?
        } else {
            // Plain connection for local relays like Mailpit
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let mut builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn submit(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        headers: &str,
        envelope_sender: &str,
    ) -> NotificationResult<()> {
        ensure_single_recipient(recipient)?;
        let envelope = envelope(recipient, envelope_sender)?;
        let raw = raw_message(recipient, subject, body, headers);

        debug!(
            to = %recipient,
            host = %self.config.host,
            port = self.config.port,
            bytes = raw.len(),
            "Submitting message via SMTP"
        );

        let response = self
            .transport
            .send_raw(&envelope, raw.as_bytes())
            .await
            .map_err(|e| {
                error!(to = %recipient, error = %e, "SMTP submission failed");
                NotificationError::Transport(format!("SMTP send failed: {}", e))
            })?;

        info!(
            to = %recipient,
            code = %response.code(),
            "Message accepted by SMTP relay"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::Transport(format!("SMTP health check failed: {}", e)))
    }
}

fn envelope(recipient: &str, envelope_sender: &str) -> NotificationResult<Envelope> {
    let to: Address = recipient
        .trim()
        .parse()
        .map_err(|e| NotificationError::InvalidRecipient(format!("{}: {}", recipient, e)))?;

    let from = if envelope_sender.trim().is_empty() {
        None
    } else {
        let sender: Address = envelope_sender
            .trim()
            .parse()
            .map_err(|e| NotificationError::Config(format!("Invalid envelope sender '{}': {}", envelope_sender, e)))?;
        Some(sender)
    };

    Ok(Envelope::new(from, vec![to])?)
}

/// Prepends the addressing headers and normalises line endings to CRLF.
///
/// A subject that is already encoded passes through unchanged.
fn raw_message(recipient: &str, subject: &str, body: &str, headers: &str) -> String {
    let mut message = format!(
        "To: {}\nSubject: {}\nDate: {}\n",
        recipient.trim(),
        encode_header(subject),
        Utc::now().to_rfc2822()
    );
    let headers = headers.trim_end();
    if !headers.is_empty() {
        message.push_str(headers);
        message.push('\n');
    }
    message.push('\n');
    message.push_str(body);
    to_crlf(&message)
}

fn to_crlf(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}
