use core_config::{env_or_default, env_parse, mail::MailSettings, ConfigError, FromEnv};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_PORT: u16 = 8080;

/// Everything the courier needs at startup: where to listen and who mail
/// comes from. The transport is chosen separately by `MAIL_TRANSPORT`.
#[derive(Clone, Debug)]
pub struct CourierConfig {
    pub listen: SocketAddr,
    pub mail: MailSettings,
}

impl FromEnv for CourierConfig {
    /// Reads `HOST` (an IP address, all interfaces by default) and `PORT`
    /// (8080), plus the `MAIL_*` settings.
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let ip: IpAddr = host.parse().map_err(|e| ConfigError::ParseError {
            key: "HOST".to_string(),
            details: format!("'{}' is not an IP address: {}", host, e),
        })?;
        let port = env_parse("PORT", DEFAULT_PORT)?;

        Ok(Self {
            listen: SocketAddr::new(ip, port),
            mail: MailSettings::from_env()?,
        })
    }
}
