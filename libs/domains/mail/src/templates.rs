//! Handlebars-backed documents.
//!
//! Templates are registered once at startup; [`TemplateDocument`]s reference
//! them by name and are rendered lazily during the flush, with the delivery
//! context merged into their data under the `site` key.

use crate::document::{DeliveryContext, EmailDocument, InitOutcome, Priority};
use crate::error::{NotificationError, NotificationResult};
use crate::transcoder::html_to_text;
use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Name of the built-in generic notification template.
pub const NOTIFICATION_TEMPLATE: &str = "notification";

const NOTIFICATION_HTML_TEMPLATE: &str = r#"<h1>{{title}}</h1>
{{#each paragraphs}}
<p>{{this}}</p>
{{/each}}
{{#if action_url}}
<p><a href="{{action_url}}">{{#if action_label}}{{action_label}}{{else}}{{action_url}}{{/if}}</a></p>
{{/if}}
<p><em>{{site.site_name}}</em></p>"#;

/// Registry of HTML templates and their optional plain-text counterparts.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    with_text: HashSet<String>,
}

impl TemplateEngine {
    /// Create an engine with the built-in templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut engine = Self {
            handlebars: Handlebars::new(),
            with_text: HashSet::new(),
        };
        engine.register(NOTIFICATION_TEMPLATE, NOTIFICATION_HTML_TEMPLATE, None)?;
        Ok(engine)
    }

    /// Register `name`. Without a text template the plain body is
    /// transcoded from the rendered HTML.
    pub fn register(&mut self, name: &str, html: &str, text: Option<&str>) -> NotificationResult<()> {
        self.handlebars
            .register_template_string(&html_key(name), html)
            .map_err(|e| NotificationError::Template(format!("Failed to register {}: {}", name, e)))?;

        match text {
            Some(text) => {
                self.handlebars
                    .register_template_string(&text_key(name), text)
                    .map_err(|e| {
                        NotificationError::Template(format!("Failed to register {} text: {}", name, e))
                    })?;
                self.with_text.insert(name.to_string());
            }
            None => {
                self.with_text.remove(name);
            }
        }

        debug!(template = %name, has_text = text.is_some(), "Registered mail template");
        Ok(())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(&html_key(name))
    }

    pub fn render_html(&self, name: &str, data: &Value) -> NotificationResult<String> {
        Ok(self.handlebars.render(&html_key(name), data)?)
    }

    pub fn render_text(&self, name: &str, data: &Value) -> NotificationResult<String> {
        if self.with_text.contains(name) {
            Ok(self.handlebars.render(&text_key(name), data)?)
        } else {
            Ok(html_to_text(&self.render_html(name, data)?))
        }
    }
}

fn html_key(name: &str) -> String {
    format!("{}_html", name)
}

fn text_key(name: &str) -> String {
    format!("{}_text", name)
}

/// A document rendered from a registered template.
pub struct TemplateDocument {
    engine: Arc<TemplateEngine>,
    template: String,
    recipient: String,
    subject: String,
    priority: Priority,
    data: Value,
}

impl TemplateDocument {
    pub fn new(
        engine: Arc<TemplateEngine>,
        template: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            engine,
            template: template.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            priority: Priority::Normal,
            data,
        }
    }

    /// Builder method to set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl EmailDocument for TemplateDocument {
    fn recipient(&self) -> &str {
        &self.recipient
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    async fn init(&mut self, context: &DeliveryContext) -> NotificationResult<InitOutcome> {
        if !self.engine.has_template(&self.template) {
            return Err(NotificationError::Template(format!(
                "Template not registered: {}",
                self.template
            )));
        }

        let site = json!({
            "site_name": context.site_name,
            "base_url": context.base_url(),
            "locale": context.locale,
        });
        match &mut self.data {
            Value::Object(map) => {
                map.insert("site".to_string(), site);
            }
            Value::Null => self.data = json!({ "site": site }),
            _ => {
                return Err(NotificationError::Render(
                    "template data must be a JSON object".to_string(),
                ))
            }
        }
        Ok(InitOutcome::Ready)
    }

    fn render_html(&self) -> NotificationResult<String> {
        self.engine.render_html(&self.template, &self.data)
    }

    fn render_plain_text(&self) -> NotificationResult<String> {
        self.engine.render_text(&self.template, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::mail::MailSettings;

    fn context() -> DeliveryContext {
        DeliveryContext::from_settings(&MailSettings::new("Example", "example.com"))
    }

    #[test]
    fn test_builtin_template_registered() {
        let engine = TemplateEngine::new().unwrap();
        assert!(engine.has_template(NOTIFICATION_TEMPLATE));
        assert!(!engine.has_template("missing"));
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let mut engine = TemplateEngine::new().unwrap();
        let result = engine.register("broken", "{{#if}}", None);
        assert!(matches!(result, Err(NotificationError::Template(_))));
    }

    #[test]
    fn test_text_template_is_preferred() {
        let mut engine = TemplateEngine::new().unwrap();
        engine
            .register("greeting", "<p>Hello <b>{{name}}</b></p>", Some("Hello {{name}}"))
            .unwrap();
        let data = json!({ "name": "Ada" });
        assert_eq!(engine.render_html("greeting", &data).unwrap(), "<p>Hello <b>Ada</b></p>");
        assert_eq!(engine.render_text("greeting", &data).unwrap(), "Hello Ada");
    }

    #[test]
    fn test_text_falls_back_to_transcoding() {
        let mut engine = TemplateEngine::new().unwrap();
        engine.register("greeting", "<p>Hello <b>{{name}}</b></p>", None).unwrap();
        let data = json!({ "name": "Ada" });
        assert_eq!(engine.render_text("greeting", &data).unwrap(), "Hello **Ada**\n\n");
    }

    #[tokio::test]
    async fn test_template_document_merges_site_context() {
        let engine = Arc::new(TemplateEngine::new().unwrap());
        let mut document = TemplateDocument::new(
            engine,
            NOTIFICATION_TEMPLATE,
            "ada@example.com",
            "Report ready",
            json!({
                "title": "Your report",
                "paragraphs": ["It is ready & waiting."],
                "action_url": "https://example.com/reports/1",
                "action_label": "Open report",
            }),
        );

        assert_eq!(document.init(&context()).await.unwrap(), InitOutcome::Ready);

        let html = document.render_html().unwrap();
        assert!(html.contains("<h1>Your report</h1>"));
        assert!(html.contains("It is ready &amp; waiting."));
        assert!(html.contains("<em>Example</em>"));

        let text = document.render_plain_text().unwrap();
        assert!(text.starts_with("YOUR REPORT\n"));
        assert!(text.contains("Open report [1]"));
        assert!(text.ends_with("[1] https://example.com/reports/1\n"));
    }

    #[tokio::test]
    async fn test_template_document_unknown_template() {
        let engine = Arc::new(TemplateEngine::new().unwrap());
        let mut document = TemplateDocument::new(engine, "missing", "a@example.com", "x", json!({}));
        let result = document.init(&context()).await;
        assert!(matches!(result, Err(NotificationError::Template(_))));
    }

    #[tokio::test]
    async fn test_template_document_rejects_non_object_data() {
        let engine = Arc::new(TemplateEngine::new().unwrap());
        let mut document =
            TemplateDocument::new(engine, NOTIFICATION_TEMPLATE, "a@example.com", "x", json!([1, 2]));
        let result = document.init(&context()).await;
        assert!(matches!(result, Err(NotificationError::Render(_))));
    }
}
