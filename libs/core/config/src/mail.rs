use crate::{env_or_default, ConfigError, FromEnv};

/// Site identity used when rendering and addressing outgoing mail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailSettings {
    /// Shown in the plain-text signature and passed to templates.
    pub site_name: String,
    /// Right-hand side of generated `Message-ID`s.
    pub hostname: String,
    /// `http` or `https`, used to build absolute links.
    pub scheme: String,
    pub from_name: String,
    pub from_address: String,
    /// SMTP `MAIL FROM`; bounces go here.
    pub envelope_sender: String,
    pub locale: String,
}

impl MailSettings {
    pub fn new(site_name: impl Into<String>, hostname: impl Into<String>) -> Self {
        let site_name = site_name.into();
        let hostname = hostname.into();
        let from_address = format!("noreply@{}", hostname);
        Self {
            from_name: site_name.clone(),
            envelope_sender: from_address.clone(),
            from_address,
            site_name,
            hostname,
            scheme: "http".to_string(),
            locale: "en".to_string(),
        }
    }

    /// Builder method to set the sender mailbox.
    pub fn with_sender(mut self, from_name: impl Into<String>, from_address: impl Into<String>) -> Self {
        self.from_name = from_name.into();
        self.from_address = from_address.into();
        self.envelope_sender = self.from_address.clone();
        self
    }

    /// Base URL of the site, e.g. `https://example.com`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.hostname)
    }
}

impl FromEnv for MailSettings {
    /// Reads from environment variables:
    /// - MAIL_SITE_NAME: defaults to "Courier"
    /// - MAIL_HOSTNAME: defaults to "localhost"
    /// - MAIL_SCHEME: "http" (default) or "https"
    /// - MAIL_FROM_NAME: defaults to the site name
    /// - MAIL_FROM_ADDRESS: defaults to noreply@MAIL_HOSTNAME
    /// - MAIL_ENVELOPE_SENDER: defaults to the from address
    /// - MAIL_LOCALE: defaults to "en"
    fn from_env() -> Result<Self, ConfigError> {
        let site_name = env_or_default("MAIL_SITE_NAME", "Courier");
        let hostname = env_or_default("MAIL_HOSTNAME", "localhost");

        let scheme = env_or_default("MAIL_SCHEME", "http").to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::ParseError {
                key: "MAIL_SCHEME".to_string(),
                details: format!("expected http or https, got '{}'", scheme),
            });
        }

        let from_name = env_or_default("MAIL_FROM_NAME", &site_name);
        let from_address = env_or_default("MAIL_FROM_ADDRESS", &format!("noreply@{}", hostname));
        if !from_address.contains('@') {
            return Err(ConfigError::ParseError {
                key: "MAIL_FROM_ADDRESS".to_string(),
                details: format!("'{}' is not an email address", from_address),
            });
        }
        let envelope_sender = env_or_default("MAIL_ENVELOPE_SENDER", &from_address);
        let locale = env_or_default("MAIL_LOCALE", "en");

        Ok(Self {
            site_name,
            hostname,
            scheme,
            from_name,
            from_address,
            envelope_sender,
            locale,
        })
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self::new("Courier", "localhost")
    }
}
