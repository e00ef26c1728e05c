//! Error types for the mail domain.

use thiserror::Error;

/// Result type for mail operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while rendering or delivering a message.
///
/// None of these ever reach the HTTP client: the response has already been
/// sent by the time a queue is flushed, so they only feed the logs and the
/// [`FlushReport`](crate::queue::FlushReport).
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Recipient holds more than one address (contains a comma).
    #[error("Invalid recipient, exactly one address expected: {0}")]
    InvalidRecipient(String),

    /// HTML or plain-text generation failed.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Template registration or rendering failed.
    #[error("Template error: {0}")]
    Template(String),

    /// The transport refused or failed to submit the message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Mail settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for NotificationError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}

impl From<lettre::error::Error> for NotificationError {
    fn from(err: lettre::error::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::Config(err.to_string())
    }
}
