//! The contract every outgoing message implements.
//!
//! A document only describes a message. Nothing is rendered when it is
//! queued: [`EmailDocument::init`] and the `render_*` methods run during the
//! post-response flush, once per delivery attempt.

use crate::error::NotificationResult;
use crate::transcoder::html_to_text;
use async_trait::async_trait;
use core_config::mail::MailSettings;
use serde::{Deserialize, Serialize};

/// Message priority, numbered like the `X-Priority` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal = 3,
    High = 1,
}

impl Priority {
    /// Numeric `X-Priority` value.
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Result of [`EmailDocument::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Render and send.
    Ready,
    /// Drop silently, e.g. the recipient no longer exists.
    Skip,
}

/// What a document may look at while preparing itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryContext {
    pub site_name: String,
    pub hostname: String,
    pub scheme: String,
    pub locale: String,
}

impl DeliveryContext {
    pub fn from_settings(settings: &MailSettings) -> Self {
        Self {
            site_name: settings.site_name.clone(),
            hostname: settings.hostname.clone(),
            scheme: settings.scheme.clone(),
            locale: settings.locale.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.hostname)
    }
}

/// A single outgoing message.
///
/// Implementors must address exactly one recipient and must not produce two
/// empty bodies; either is reported as a failure for that document only.
#[async_trait]
pub trait EmailDocument: Send + Sync {
    /// Single recipient address.
    fn recipient(&self) -> &str;

    /// Unencoded subject line.
    fn subject(&self) -> &str;

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// Runs once, right before rendering.
    async fn init(&mut self, _context: &DeliveryContext) -> NotificationResult<InitOutcome> {
        Ok(InitOutcome::Ready)
    }

    /// HTML fragment placed inside the message's `<body>`.
    fn render_html(&self) -> NotificationResult<String>;

    /// Plain-text alternative, without the site signature.
    fn render_plain_text(&self) -> NotificationResult<String>;
}

/// A document with a fixed HTML body. The plain-text part is transcoded from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlDocument {
    recipient: String,
    subject: String,
    html: String,
    priority: Priority,
}

impl HtmlDocument {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            html: html.into(),
            priority: Priority::Normal,
        }
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl EmailDocument for HtmlDocument {
    fn recipient(&self) -> &str {
        &self.recipient
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn render_html(&self) -> NotificationResult<String> {
        Ok(self.html.clone())
    }

    fn render_plain_text(&self) -> NotificationResult<String> {
        Ok(html_to_text(&self.html))
    }
}
