use super::{ensure_single_recipient, Transport};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One captured call to [`Transport::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub headers: String,
    pub envelope_sender: String,
}

/// Transport that keeps submissions in memory.
///
/// Clones share the same capture buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    submissions: Arc<Mutex<Vec<Submission>>>,
    failure_message: Option<String>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that rejects every submission
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            submissions: Arc::default(),
            failure_message: Some(message.into()),
        }
    }

    pub async fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    pub async fn clear(&self) {
        self.submissions.lock().await.clear();
    }

    pub async fn was_sent_to(&self, recipient: &str) -> bool {
        self.submissions
            .lock()
            .await
            .iter()
            .any(|s| s.recipient == recipient)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn submit(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        headers: &str,
        envelope_sender: &str,
    ) -> NotificationResult<()> {
        if let Some(message) = &self.failure_message {
            return Err(NotificationError::Transport(message.clone()));
        }
        ensure_single_recipient(recipient)?;

        self.submissions.lock().await.push(Submission {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            headers: headers.to_string(),
            envelope_sender: envelope_sender.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(self.failure_message.is_none())
    }
}
