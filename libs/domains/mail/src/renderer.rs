//! MIME envelope construction.
//!
//! Every message is `multipart/alternative` with a base64 `text/plain` part
//! (the document's plain body plus a site signature, wrapped at 75 columns)
//! followed by a base64 `text/html` part (the document's HTML inside a
//! minimal XHTML page). Headers are returned separately from the body so the
//! transport can add `To`, `Subject` and `Date` itself.

use crate::document::{EmailDocument, Priority};
use crate::error::{NotificationError, NotificationResult};
use crate::flowed::{wordwrap, DEFAULT_WIDTH};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use core_config::mail::MailSettings;
use rand::{distr::Alphanumeric, Rng};
use std::sync::Arc;
use tracing::debug;

/// Base64 line length (RFC 2045 section 6.8).
const BASE64_LINE: usize = 76;

/// Raw bytes per RFC 2047 encoded word; keeps each word under 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

const TOKEN_RANDOM_LEN: usize = 16;

const BODY_STYLE: &str = "font-family: Verdana, Arial, Helvetica, sans-serif;";

/// A fully rendered message, ready for [`Transport::submit`](crate::transport::Transport::submit).
#[derive(Debug, Clone)]
pub struct RenderedMessage {
    /// Header block, one header per line, without `To`/`Subject`.
    pub headers: String,
    /// MIME boundary, also the `Message-ID` local part.
    pub boundary: String,
    /// Folded base64 of the HTML page.
    pub html_base64: String,
    /// Folded base64 of the plain text including the signature.
    pub plain_base64: String,
    /// Subject, RFC 2047 encoded when it is not printable ASCII.
    pub subject: String,
    pub body: String,
}

/// Builds MIME messages from documents for one site.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    settings: Arc<MailSettings>,
}

impl MessageRenderer {
    pub fn new(settings: MailSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    /// Render `document` into headers and a multipart body.
    ///
    /// Fails when the document cannot render either body, or renders both
    /// as empty.
    pub fn render(&self, document: &dyn EmailDocument) -> NotificationResult<RenderedMessage> {
        let html = document.render_html()?;
        let plain = document.render_plain_text()?;
        if html.trim().is_empty() && plain.trim().is_empty() {
            return Err(NotificationError::Render(format!(
                "both bodies are empty for '{}'",
                document.subject()
            )));
        }

        let boundary = message_token();
        let headers = self.headers(&boundary, document.priority());

        let plain = wordwrap(
            &format!("{}\n\n--\n{}\n", plain, self.settings.site_name),
            DEFAULT_WIDTH,
            "\n",
            false,
        );
        let html = html_page(document.subject(), &html);

        let plain_base64 = fold_base64(&plain);
        let html_base64 = fold_base64(&html);
        let body = multipart_body(&boundary, &plain_base64, &html_base64);

        debug!(
            recipient = %document.recipient(),
            boundary = %boundary,
            priority = ?document.priority(),
            bytes = body.len(),
            "Rendered message"
        );

        Ok(RenderedMessage {
            headers,
            subject: encode_header(document.subject()),
            boundary,
            html_base64,
            plain_base64,
            body,
        })
    }

    fn headers(&self, token: &str, priority: Priority) -> String {
        let mut headers = vec![
            "Auto-Submitted: auto-generated".to_string(),
            format!("Content-Type: multipart/alternative; boundary=\"{}\"", token),
            format!(
                "From: \"{}\" <{}>",
                encode_header(&self.settings.from_name),
                self.settings.from_address
            ),
            format!("Message-ID: <{}@{}>", token, self.settings.hostname),
            "MIME-Version: 1.0".to_string(),
            "Precedence: bulk".to_string(),
        ];

        if priority == Priority::High {
            headers.push(format!("X-Priority: {} (Highest)", priority.value()));
            headers.push("X-MSMail-Priority: High".to_string());
            headers.push("Importance: High".to_string());
        }

        headers.join("\n")
    }
}

/// Time-ordered, collision-resistant token. Not a secret.
fn message_token() -> String {
    let random: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{:x}{}", Utc::now().timestamp_micros(), random)
}

/// RFC 2047 `B` encoding for header text. Printable ASCII is returned
/// unchanged; anything else, including CR, LF and other control characters,
/// is encoded so it can never start a new header line.
///
/// Long values are split into several encoded words on character
/// boundaries, separated by a space.
pub fn encode_header(text: &str) -> String {
    if text.bytes().all(|b| b.is_ascii() && !b.is_ascii_control()) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if i + ch.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(encoded_word(&text[start..i]));
            start = i;
        }
    }
    words.push(encoded_word(&text[start..]));
    words.join(" ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk))
}

fn fold_base64(text: &str) -> String {
    let encoded = STANDARD.encode(text);
    let mut folded = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE);
    for (i, ch) in encoded.chars().enumerate() {
        if i > 0 && i % BASE64_LINE == 0 {
            folded.push('\n');
        }
        folded.push(ch);
    }
    folded
}

fn html_page(subject: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head>\n\
         <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n\
         <title>{}</title>\n\
         </head>\n\
         <body style=\"{}\">\n\
         {}\n\
         </body>\n\
         </html>\n",
        handlebars::html_escape(subject),
        BODY_STYLE,
        body
    )
}

fn multipart_body(boundary: &str, plain_base64: &str, html_base64: &str) -> String {
    format!(
        "--{b}\n\
         Content-Type: text/plain; charset=utf-8\n\
         Content-Transfer-Encoding: BASE64\n\
         \n\
         {plain}\n\
         \n\
         --{b}\n\
         Content-Type: text/html; charset=utf-8\n\
         Content-Transfer-Encoding: BASE64\n\
         \n\
         {html}\n\
         \n\
         --{b}--\n",
        b = boundary,
        plain = plain_base64,
        html = html_base64,
    )
}
