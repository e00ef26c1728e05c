//! Mail Domain
//!
//! Outbound mail for the courier service: documents are queued while a
//! request is handled and rendered and submitted after its response has
//! been sent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   API Handler   │  ← enqueues EmailDocuments
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  DeliveryQueue  │  ← request-scoped, flushed post-response
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ MessageRenderer │  ← multipart/alternative, base64 parts
//! └────────┬────────┘     (plain part via transcoder + flowed)
//!          │
//! ┌────────▼────────┐
//! │    Transport    │  ← SMTP, log, recording
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_mail::{HtmlDocument, Mailer, PostResponseHooks};
//!
//! let mailer = Mailer::new(settings, transport);
//! let hooks = PostResponseHooks::new();
//! let queue = mailer.queue();
//!
//! queue.enqueue(HtmlDocument::new("ada@example.com", "Hello", "<p>Hi!</p>"), &hooks);
//!
//! // ... response is sent ...
//! hooks.run().await;
//! ```

pub mod document;
pub mod error;
pub mod flowed;
pub mod hooks;
pub mod queue;
pub mod renderer;
pub mod templates;
pub mod transcoder;
pub mod transport;

// Re-export commonly used types
pub use document::{DeliveryContext, EmailDocument, HtmlDocument, InitOutcome, Priority};
pub use error::{NotificationError, NotificationResult};
pub use hooks::{PostResponseCallback, PostResponseHooks, RuntimeContext};
pub use queue::{DeliveryQueue, FailedDelivery, FlushReport, Mailer};
pub use renderer::{MessageRenderer, RenderedMessage};
pub use templates::{TemplateDocument, TemplateEngine, NOTIFICATION_TEMPLATE};
pub use transcoder::html_to_text;
pub use transport::{
    transport_from_env, LogTransport, RecordingTransport, SmtpConfig, SmtpTransport, Submission, Transport,
    TransportKind,
};
