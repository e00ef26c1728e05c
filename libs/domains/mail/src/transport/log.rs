use super::Transport;
use crate::error::NotificationResult;
use async_trait::async_trait;
use tracing::info;

/// Logs each submission instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn submit(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        headers: &str,
        envelope_sender: &str,
    ) -> NotificationResult<()> {
        info!(
            to = %recipient,
            subject = %subject,
            envelope_sender = %envelope_sender,
            header_lines = headers.lines().count(),
            body_bytes = body.len(),
            "Mail not sent, log transport active"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(true)
    }
}
