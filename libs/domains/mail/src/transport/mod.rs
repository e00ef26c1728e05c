//! Message submission.
//!
//! A [`Transport`] receives a message that is already fully rendered: the
//! MIME body, the header block and the envelope sender. Implementations:
//!
//! - [`SmtpTransport`]: relays through an SMTP server using lettre.
//! - [`LogTransport`]: logs instead of sending, for local runs.
//! - [`RecordingTransport`]: keeps submissions in memory, for tests and previews.

mod log;
mod recording;
mod smtp;

pub use self::log::LogTransport;
pub use recording::{RecordingTransport, Submission};
pub use smtp::{SmtpConfig, SmtpTransport};

use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{env_or_default, ConfigError, FromEnv};
use std::str::FromStr;
use std::sync::Arc;

/// Submission interface. Errors are returned, never panicked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one rendered message for `recipient`.
    async fn submit(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        headers: &str,
        envelope_sender: &str,
    ) -> NotificationResult<()>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Check that the transport can currently accept mail.
    async fn health_check(&self) -> NotificationResult<bool>;
}

/// Which transport to build, selected by `MAIL_TRANSPORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    Smtp,
    #[default]
    Log,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(TransportKind::Smtp),
            "log" => Ok(TransportKind::Log),
            other => Err(format!("unknown transport '{}', expected smtp or log", other)),
        }
    }
}

impl FromEnv for TransportKind {
    fn from_env() -> Result<Self, ConfigError> {
        env_or_default("MAIL_TRANSPORT", "log")
            .parse()
            .map_err(|details| ConfigError::ParseError {
                key: "MAIL_TRANSPORT".to_string(),
                details,
            })
    }
}

/// Build the transport selected by the environment.
pub fn transport_from_env() -> NotificationResult<Arc<dyn Transport>> {
    let transport: Arc<dyn Transport> = match TransportKind::from_env()? {
        TransportKind::Smtp => Arc::new(SmtpTransport::new(SmtpConfig::from_env()?)?),
        TransportKind::Log => Arc::new(LogTransport),
    };
    Ok(transport)
}

/// Rejects recipients that cannot be a single address.
pub(crate) fn ensure_single_recipient(recipient: &str) -> NotificationResult<()> {
    if recipient.contains(',') || recipient.trim().is_empty() {
        return Err(NotificationError::InvalidRecipient(recipient.to_string()));
    }
    Ok(())
}
