//! Request-scoped deferred delivery.
//!
//! ```text
//! handler ──enqueue──▶ DeliveryQueue ──(first enqueue)──▶ RuntimeContext
//!                                                          │
//!                       response sent ◀────────────────────┘
//!                              │
//!                            flush ──▶ init ──▶ MessageRenderer ──▶ Transport
//! ```
//!
//! Nothing is rendered or sent while the request is being handled. One
//! failing document never stops the others, and the queue is always empty
//! after a flush.

use crate::document::{DeliveryContext, EmailDocument, InitOutcome};
use crate::error::{NotificationError, NotificationResult};
use crate::hooks::RuntimeContext;
use crate::renderer::MessageRenderer;
use crate::transport::Transport;
use core_config::mail::MailSettings;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

/// Shared, long-lived delivery setup. Hands out one [`DeliveryQueue`] per request.
#[derive(Clone)]
pub struct Mailer {
    renderer: MessageRenderer,
    transport: Arc<dyn Transport>,
    context: DeliveryContext,
}

impl Mailer {
    pub fn new(settings: MailSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            context: DeliveryContext::from_settings(&settings),
            renderer: MessageRenderer::new(settings),
            transport,
        }
    }

    /// A fresh, empty queue for one request.
    pub fn queue(&self) -> DeliveryQueue {
        DeliveryQueue::new(self.renderer.clone(), Arc::clone(&self.transport), self.context.clone())
    }

    pub fn renderer(&self) -> &MessageRenderer {
        &self.renderer
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl fmt::Debug for Mailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("transport", &self.transport.name())
            .field("context", &self.context)
            .finish()
    }
}

/// A document that could not be delivered.
#[derive(Debug)]
pub struct FailedDelivery {
    pub recipient: String,
    pub subject: String,
    pub error: NotificationError,
}

/// Outcome of one [`DeliveryQueue::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: Vec<FailedDelivery>,
}

impl FlushReport {
    /// Number of documents taken from the queue.
    pub fn processed(&self) -> usize {
        self.sent + self.skipped + self.failed.len()
    }
}

enum Delivery {
    Sent,
    Skipped,
}

struct QueueInner {
    pending: Mutex<Vec<Box<dyn EmailDocument>>>,
    /// Set while a flush callback is registered and has not run yet.
    registered: AtomicBool,
    renderer: MessageRenderer,
    transport: Arc<dyn Transport>,
    context: DeliveryContext,
}

/// FIFO of documents to send after the current response.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

impl DeliveryQueue {
    pub fn new(renderer: MessageRenderer, transport: Arc<dyn Transport>, context: DeliveryContext) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                pending: Mutex::new(Vec::new()),
                registered: AtomicBool::new(false),
                renderer,
                transport,
                context,
            }),
        }
    }

    /// Queue `document` for delivery after the response.
    ///
    /// The first enqueue registers a single flush with `runtime`; later
    /// enqueues before that flush only append.
    pub fn enqueue<D>(&self, document: D, runtime: &dyn RuntimeContext)
    where
        D: EmailDocument + 'static,
    {
        self.enqueue_boxed(Box::new(document), runtime);
    }

    pub fn enqueue_boxed(&self, document: Box<dyn EmailDocument>, runtime: &dyn RuntimeContext) {
        debug!(
            recipient = %document.recipient(),
            subject = %document.subject(),
            "Queued email for post-response delivery"
        );
        self.lock().push(document);

        if !self.inner.registered.swap(true, Ordering::AcqRel) {
            let queue = self.clone();
            runtime.register_post_response(Box::new(move || {
                Box::pin(async move {
                    queue.flush().await;
                })
            }));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether a flush is currently registered with the runtime.
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::Acquire)
    }

    /// Deliver every pending document in FIFO order.
    ///
    /// The pending list is taken up front, so the queue is empty afterwards
    /// whatever happens to the individual documents.
    pub async fn flush(&self) -> FlushReport {
        let documents = std::mem::take(&mut *self.lock());
        self.inner.registered.store(false, Ordering::Release);

        let mut report = FlushReport::default();
        for mut document in documents {
            let outcome = AssertUnwindSafe(self.deliver(document.as_mut()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(NotificationError::Render(panic_message(panic.as_ref()))));
            match outcome {
                Ok(Delivery::Sent) => report.sent += 1,
                Ok(Delivery::Skipped) => {
                    info!(
                        recipient = %document.recipient(),
                        subject = %document.subject(),
                        "Email skipped by document"
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    error!(
                        recipient = %document.recipient(),
                        subject = %document.subject(),
                        error = %err,
                        "Failed to deliver email"
                    );
                    report.failed.push(FailedDelivery {
                        recipient: document.recipient().to_string(),
                        subject: document.subject().to_string(),
                        error: err,
                    });
                }
            }
        }

        if report.processed() > 0 {
            info!(
                sent = report.sent,
                skipped = report.skipped,
                failed = report.failed.len(),
                transport = self.inner.transport.name(),
                "Mail queue flushed"
            );
        }
        report
    }

    async fn deliver(&self, document: &mut dyn EmailDocument) -> NotificationResult<Delivery> {
        if document.recipient().contains(',') {
            return Err(NotificationError::InvalidRecipient(document.recipient().to_string()));
        }

        if document.init(&self.inner.context).await? == InitOutcome::Skip {
            return Ok(Delivery::Skipped);
        }

        let message = self.inner.renderer.render(&*document)?;
        self.inner
            .transport
            .submit(
                document.recipient(),
                &message.subject,
                &message.body,
                &message.headers,
                &self.inner.renderer.settings().envelope_sender,
            )
            .await?;
        Ok(Delivery::Sent)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<dyn EmailDocument>>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("document panicked: {}", detail)
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("pending", &self.len())
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HtmlDocument;
    use crate::hooks::PostResponseHooks;
    use crate::transport::{MockTransport, RecordingTransport};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn settings() -> MailSettings {
        MailSettings::new("Example", "example.com").with_sender("Example", "noreply@example.com")
    }

    fn queue_with(transport: Arc<dyn Transport>) -> DeliveryQueue {
        Mailer::new(settings(), transport).queue()
    }

    fn plain_part(body: &str) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let marker = "BASE64\n\n";
        let start = body.find(marker).unwrap() + marker.len();
        let end = start + body[start..].find("\n\n--").unwrap();
        let bytes = STANDARD.decode(body[start..end].replace('\n', "")).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    fn html(recipient: &str, subject: &str) -> HtmlDocument {
        HtmlDocument::new(recipient, subject, "<p>Hello</p>")
    }

    /// Counts `init` calls and can skip or fail on demand.
    struct Scripted {
        recipient: String,
        skip: bool,
        fail_render: bool,
        panic_render: bool,
        inits: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(recipient: &str) -> Self {
            Self {
                recipient: recipient.to_string(),
                skip: false,
                fail_render: false,
                panic_render: false,
                inits: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl EmailDocument for Scripted {
        fn recipient(&self) -> &str {
            &self.recipient
        }

        fn subject(&self) -> &str {
            "Scripted"
        }

        async fn init(&mut self, _context: &DeliveryContext) -> NotificationResult<InitOutcome> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(if self.skip { InitOutcome::Skip } else { InitOutcome::Ready })
        }

        fn render_html(&self) -> NotificationResult<String> {
            if self.fail_render {
                return Err(NotificationError::Render("boom".to_string()));
            }
            if self.panic_render {
                panic!("template exploded");
            }
            Ok("<p>scripted</p>".to_string())
        }

        fn render_plain_text(&self) -> NotificationResult<String> {
            Ok("scripted".to_string())
        }
    }

    #[tokio::test]
    async fn test_first_enqueue_registers_one_flush() {
        let transport = RecordingTransport::new();
        let queue = queue_with(Arc::new(transport.clone()));
        let hooks = PostResponseHooks::new();

        queue.enqueue(html("a@example.com", "One"), &hooks);
        queue.enqueue(html("b@example.com", "Two"), &hooks);
        queue.enqueue(html("c@example.com", "Three"), &hooks);

        assert_eq!(hooks.len(), 1);
        assert_eq!(queue.len(), 3);
        assert!(queue.is_registered());
        assert_eq!(transport.count().await, 0);

        assert_eq!(hooks.run().await, 1);
        assert!(queue.is_empty());
        assert!(!queue.is_registered());

        let recipients: Vec<String> = transport
            .submissions()
            .await
            .into_iter()
            .map(|s| s.recipient)
            .collect();
        assert_eq!(recipients, ["a@example.com", "b@example.com", "c@example.com"]);
    }

    #[tokio::test]
    async fn test_queue_registers_again_after_flush() {
        let queue = queue_with(Arc::new(RecordingTransport::new()));
        let hooks = PostResponseHooks::new();

        queue.enqueue(html("a@example.com", "One"), &hooks);
        hooks.run().await;
        queue.enqueue(html("b@example.com", "Two"), &hooks);

        assert_eq!(hooks.len(), 1);
    }

    #[tokio::test]
    async fn test_flush_passes_rendered_message_to_transport() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .withf(|recipient, subject, body, headers, envelope_sender| {
                recipient == "a@example.com"
                    && subject == "=?UTF-8?B?R3LDvMOfZQ==?="
                    && body.contains("Content-Type: text/html; charset=utf-8")
                    && headers.starts_with("Auto-Submitted: auto-generated\n")
                    && envelope_sender == "noreply@example.com"
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        transport.expect_name().return_const("mock");

        let queue = queue_with(Arc::new(transport));
        queue.enqueue(html("a@example.com", "Grüße"), &PostResponseHooks::new());

        let report = queue.flush().await;
        assert_eq!(report.sent, 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_comma_recipient_is_never_submitted() {
        let mut transport = MockTransport::new();
        transport.expect_submit().never();
        transport.expect_name().return_const("mock");

        let queue = queue_with(Arc::new(transport));
        let document = Scripted::new("a@example.com,b@example.com");
        let inits = Arc::clone(&document.inits);
        queue.enqueue(document, &PostResponseHooks::new());

        let report = queue.flush().await;
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].error, NotificationError::InvalidRecipient(_)));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty());

        logs_assert(|lines: &[&str]| {
            let errors = lines
                .iter()
                .filter(|line| line.contains("ERROR") && line.contains("Failed to deliver email"))
                .count();
            match errors {
                1 => Ok(()),
                n => Err(format!("expected one error entry, found {}", n)),
            }
        });
        assert!(logs_contain("a@example.com,b@example.com"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_skipped_document_is_not_rendered_or_sent() {
        let mut transport = MockTransport::new();
        transport.expect_submit().never();
        transport.expect_name().return_const("mock");

        let queue = queue_with(Arc::new(transport));
        let mut document = Scripted::new("gone@example.com");
        document.skip = true;
        document.fail_render = true;
        let inits = Arc::clone(&document.inits);
        queue.enqueue(document, &PostResponseHooks::new());

        let report = queue.flush().await;
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(logs_contain("Email skipped by document"));
    }

    #[tokio::test]
    async fn test_render_failure_does_not_stop_the_batch() {
        let transport = RecordingTransport::new();
        let queue = queue_with(Arc::new(transport.clone()));
        let hooks = PostResponseHooks::new();

        for k in 0..5 {
            let mut document = Scripted::new(&format!("user{}@example.com", k));
            document.fail_render = k == 2;
            queue.enqueue(document, &hooks);
        }

        let report = queue.flush().await;
        assert_eq!(report.sent, 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].recipient, "user2@example.com");
        assert!(matches!(report.failed[0].error, NotificationError::Render(_)));
        assert!(queue.is_empty());
        assert!(!transport.was_sent_to("user2@example.com").await);
        assert_eq!(transport.count().await, 4);
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_and_queue_cleared() {
        let mut transport = MockTransport::new();
        transport
            .expect_submit()
            .withf(|recipient, _, _, _, _| recipient == "a@example.com")
            .times(1)
            .returning(|_, _, _, _, _| Err(NotificationError::Transport("relay down".to_string())));
        transport
            .expect_submit()
            .withf(|recipient, _, _, _, _| recipient == "b@example.com")
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        transport.expect_name().return_const("mock");

        let queue = queue_with(Arc::new(transport));
        let hooks = PostResponseHooks::new();
        queue.enqueue(html("a@example.com", "One"), &hooks);
        queue.enqueue(html("b@example.com", "Two"), &hooks);

        let report = queue.flush().await;
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].subject, "One");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_every_document_failing_still_clears_queue() {
        let queue = queue_with(Arc::new(RecordingTransport::failing("down")));
        let hooks = PostResponseHooks::new();
        queue.enqueue(html("a@example.com", "One"), &hooks);
        queue.enqueue(html("b@example.com", "Two"), &hooks);

        let report = queue.flush().await;
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.processed(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_flush_of_empty_queue_is_a_no_op() {
        let mut transport = MockTransport::new();
        transport.expect_submit().never();

        let report = queue_with(Arc::new(transport)).flush().await;
        assert_eq!(report.processed(), 0);
    }

    #[tokio::test]
    async fn test_footnotes_restart_for_every_message() {
        let transport = RecordingTransport::new();
        let queue = queue_with(Arc::new(transport.clone()));
        let hooks = PostResponseHooks::new();
        let body = "<p><a href=\"https://example.com/x\">link</a></p>";
        queue.enqueue(HtmlDocument::new("a@example.com", "One", body), &hooks);
        queue.enqueue(HtmlDocument::new("b@example.com", "Two", body), &hooks);
        queue.flush().await;

        let submissions = transport.submissions().await;
        let plains: Vec<String> = submissions
            .iter()
            .map(|s| plain_part(&s.body))
            .collect();
        assert_eq!(plains[0], plains[1]);
        assert!(plains[0].contains("link [1]"));
        assert!(plains[0].contains("[1] https://example.com/x"));
        assert!(!plains[1].contains("[2]"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_document_does_not_stop_the_batch() {
        let transport = RecordingTransport::new();
        let queue = queue_with(Arc::new(transport.clone()));
        let hooks = PostResponseHooks::new();

        let mut broken = Scripted::new("b@example.com");
        broken.panic_render = true;
        queue.enqueue(html("a@example.com", "One"), &hooks);
        queue.enqueue(broken, &hooks);
        queue.enqueue(html("c@example.com", "Three"), &hooks);

        let report = queue.flush().await;
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].recipient, "b@example.com");
        assert!(report.failed[0].error.to_string().contains("template exploded"));
        assert!(queue.is_empty());
        assert!(!queue.is_registered());
        assert!(transport.was_sent_to("c@example.com").await);
        assert!(logs_contain("Failed to deliver email"));
    }
}
