//! HTML fragment to plain-text transcoding.
//!
//! Produces the `text/plain` alternative of a message from its HTML body.
//! Inline emphasis becomes `*`/`**`, links become footnotes, and block
//! elements (lists, quotes, headings, definition lists) become indented,
//! RFC 3676 wrapped text.
//!
//! ```text
//! <ol><li>first</li><li>second</li></ol>   ->    1) first
//!                                                2) second
//! ```

use crate::flowed::{clean_indent, indented_wordwrap};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:em|i)(?:\s[^>]*)?>").unwrap());

static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:strong|b)(?:\s[^>]*)?>").unwrap());

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>(.*?)</a\s*>"#).unwrap()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Width of the `<hr>` ruler.
const RULE_WIDTH: usize = 75;

/// Converts an HTML fragment into flowed plain text.
///
/// Link footnotes are numbered from 1 on every call.
pub fn html_to_text(html: &str) -> String {
    let mut footnotes = Vec::new();
    let html = inline_markup(html, &mut footnotes);

    let mut state = WrapState::default();
    let mut cursor = 0;
    for tag in TAG.find_iter(&html) {
        state.text(&html[cursor..tag.start()]);
        let raw = tag.as_str();
        state.tag(Tag::parse(&raw[1..raw.len() - 1]));
        cursor = tag.end();
    }
    state.text(&html[cursor..]);

    let mut output = state.output;
    if !footnotes.is_empty() {
        output.push('\n');
        for (i, url) in footnotes.iter().enumerate() {
            output.push_str(&format!("[{}] {}\n", i + 1, url));
        }
    }
    output
}

/// Rewrites emphasis and anchors in place, collecting link targets.
fn inline_markup(html: &str, footnotes: &mut Vec<String>) -> String {
    let html = EMPHASIS.replace_all(html, "*");
    let html = STRONG.replace_all(&html, "**");

    ANCHOR
        .replace_all(&html, |caps: &Captures| {
            let url = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            let text = &caps[3];
            if text == url {
                return url.to_string();
            }
            footnotes.push(decode_entities(url).into_owned());
            format!("{} [{}]", text, footnotes.len())
        })
        .into_owned()
}

/// Decodes the common named entities and all numeric character references.
/// Unknown entities are left as written.
fn decode_entities(text: &str) -> Cow<'_, str> {
    ENTITY.replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        let decoded = match name {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            "copy" => Some('©'),
            "reg" => Some('®'),
            "hellip" => Some('…'),
            "mdash" => Some('—'),
            "ndash" => Some('–'),
            "euro" => Some('€'),
            _ => {
                if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        decoded.map_or_else(|| caps[0].to_string(), String::from)
    })
}

/// Elements that affect the text layout. Everything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    UnorderedList,
    OrderedList,
    ListItem,
    Blockquote,
    DefinitionList,
    DefinitionDescription,
    Paragraph,
    Heading(u8),
    Rule,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open(Element),
    Close(Element),
}

impl Tag {
    /// Parses the inside of `<...>`; only the first word counts.
    fn parse(raw: &str) -> Self {
        let key = raw
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (closing, name) = match key.strip_prefix('/') {
            Some(name) => (true, name),
            None => (false, key.as_str()),
        };

        let element = match name.trim_end_matches('/') {
            "ul" => Element::UnorderedList,
            "ol" => Element::OrderedList,
            "li" => Element::ListItem,
            "blockquote" => Element::Blockquote,
            "dl" => Element::DefinitionList,
            "dd" => Element::DefinitionDescription,
            "p" => Element::Paragraph,
            "hr" => Element::Rule,
            other => other
                .strip_prefix('h')
                .and_then(|level| level.parse::<u8>().ok())
                .filter(|level| (1..=6).contains(level))
                .map_or(Element::Other, Element::Heading),
        };

        if closing {
            Tag::Close(element)
        } else {
            Tag::Open(element)
        }
    }
}

/// Marker source for an open list.
#[derive(Debug, Clone, Copy)]
enum ListCounter {
    Bullet,
    Ordered(u32),
}

#[derive(Debug, Default)]
struct WrapState {
    output: String,
    /// One prefix per open block; joined to indent each chunk.
    indent: Vec<String>,
    lists: Vec<ListCounter>,
    uppercase: bool,
}

impl WrapState {
    fn text(&mut self, raw: &str) {
        let value = decode_entities(raw);
        let value = value.trim();
        if !value.is_empty() {
            self.emit(value);
        }
    }

    fn emit(&mut self, chunk: &str) {
        let chunk = if self.uppercase {
            Cow::Owned(chunk.to_uppercase())
        } else {
            Cow::Borrowed(chunk)
        };
        let indent = self.indent.concat();
        self.output.push_str(&indented_wordwrap(&chunk, &indent));
        self.output.push('\n');

        for entry in &mut self.indent {
            *entry = clean_indent(entry);
        }
    }

    fn tag(&mut self, tag: Tag) {
        match tag {
            Tag::Open(Element::UnorderedList) => self.lists.push(ListCounter::Bullet),
            Tag::Open(Element::OrderedList) => self.lists.push(ListCounter::Ordered(1)),
            Tag::Close(Element::UnorderedList | Element::OrderedList) => {
                self.lists.pop();
                self.emit("");
            }

            Tag::Open(Element::Blockquote) => {
                // Flowed quoting cannot be mixed with list indentation.
                let marker = if self.lists.is_empty() { ">" } else { " \"" };
                self.indent.push(marker.to_string());
            }
            Tag::Close(Element::Blockquote) => {
                if !self.lists.is_empty() {
                    let kept = self.output.trim_end_matches(['>', ' ', '\n']).len();
                    self.output.truncate(kept);
                    self.output.push_str("\"\n");
                }
                self.indent.pop();
            }

            Tag::Open(Element::ListItem) => {
                let marker = match self.lists.last_mut() {
                    Some(ListCounter::Ordered(n)) => {
                        let marker = format!(" {n}) ");
                        *n += 1;
                        marker
                    }
                    _ => " * ".to_string(),
                };
                self.indent.push(marker);
            }
            Tag::Open(Element::DefinitionDescription) => self.indent.push("    ".to_string()),
            Tag::Close(Element::ListItem | Element::DefinitionDescription) => {
                self.indent.pop();
            }

            Tag::Open(Element::Heading(level)) if level >= 3 => {
                self.indent.push(format!("{} ", "#".repeat(usize::from(level - 2))));
            }
            Tag::Open(Element::Heading(_)) => self.uppercase = true,
            Tag::Close(Element::Heading(level)) => {
                if level >= 3 {
                    self.indent.pop();
                } else {
                    self.uppercase = false;
                }
                self.emit("");
            }

            Tag::Open(Element::Rule) => {
                self.output.push_str("\n\n");
                self.output.push_str(&"-".repeat(RULE_WIDTH));
                self.output.push_str("\n\n");
            }

            Tag::Close(Element::Paragraph | Element::DefinitionList) => self.emit(""),

            _ => {}
        }
    }
}
