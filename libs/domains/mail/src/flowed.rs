//! RFC 3676 "format=flowed" line wrapping.
//!
//! [`wordwrap`] is a greedy, codepoint-aware wrapper. [`indented_wordwrap`]
//! builds on it to produce quoted or indented blocks where soft line breaks
//! (a trailing space before the newline) are only used for text that a
//! flowed-aware client may rejoin: unindented or purely `>`-quoted lines.

/// Default wrap column for outgoing plain text.
pub const DEFAULT_WIDTH: usize = 75;

/// Column budget for an indented line, before the indent is subtracted.
const FLOWED_WIDTH: usize = 77;

/// Keeps every line under the RFC 5322 limit of 998 octets plus CRLF.
const MAX_LINE_WIDTH: usize = 996;

const SOFT_BREAK: &str = " \n";
const HARD_BREAK: &str = "\n";

/// Wraps `text` so that no line is longer than `width` characters.
///
/// Lines are broken at the last space before the limit; the space itself is
/// replaced by `break_seq`. Existing newlines are kept and restart the count.
/// A single word longer than `width` is left intact unless `cut` is set, in
/// which case it is split at exactly `width` characters.
pub fn wordwrap(text: &str, width: usize, break_seq: &str, cut: bool) -> String {
    let width = width.max(1);

    if text.is_ascii() {
        if text.len() <= width {
            return text.to_string();
        }
        let units = text.bytes().enumerate().map(|(i, b)| (i, i, char::from(b)));
        return wrap_units(text, units, width, break_seq, cut);
    }

    let units = text
        .char_indices()
        .enumerate()
        .map(|(pos, (byte, ch))| (pos, byte, ch));
    wrap_units(text, units, width, break_seq, cut)
}

/// Position in the text, counted both in characters and in bytes.
#[derive(Debug, Clone, Copy, Default)]
struct Mark {
    pos: usize,
    byte: usize,
}

impl Mark {
    /// The mark just past a single-byte character (space or newline).
    fn after(self) -> Self {
        Mark {
            pos: self.pos + 1,
            byte: self.byte + 1,
        }
    }
}

fn wrap_units<I>(text: &str, units: I, width: usize, break_seq: &str, cut: bool) -> String
where
    I: Iterator<Item = (usize, usize, char)>,
{
    let mut out = String::with_capacity(text.len() + (text.len() / width + 1) * break_seq.len());
    let mut line_start = Mark::default();
    let mut last_space = Mark::default();

    for (pos, byte, ch) in units {
        let here = Mark { pos, byte };
        let run = pos - line_start.pos;

        if ch == '\n' {
            out.push_str(&text[line_start.byte..=byte]);
            line_start = here.after();
            last_space = line_start;
        } else if ch == ' ' {
            if run >= width {
                out.push_str(&text[line_start.byte..byte]);
                out.push_str(break_seq);
                line_start = here.after();
            }
            last_space = here;
        } else if run >= width && cut && line_start.pos >= last_space.pos {
            out.push_str(&text[line_start.byte..byte]);
            out.push_str(break_seq);
            line_start = here;
            last_space = here;
        } else if run >= width && line_start.pos < last_space.pos {
            out.push_str(&text[line_start.byte..last_space.byte]);
            out.push_str(break_seq);
            line_start = last_space.after();
            last_space = line_start;
        }
    }

    out.push_str(&text[line_start.byte..]);
    out
}

/// Replaces every character of an indent that is not a quote marker (`>`)
/// with a space, so bullets and heading markers are not repeated on
/// continuation lines while the quote depth is.
pub fn clean_indent(indent: &str) -> String {
    indent
        .chars()
        .map(|c| if c == '>' { '>' } else { ' ' })
        .collect()
}

/// Wraps `text` for placement under `indent`.
///
/// The first line carries `indent` verbatim, every following line its
/// [cleaned](clean_indent) form. Soft breaks are used only when the cleaned
/// indent contains no spaces. Lines starting with `>`, a space or `From` are
/// space-stuffed.
pub fn indented_wordwrap(text: &str, indent: &str) -> String {
    let text = text.replace('\r', "");
    let cleaned = clean_indent(indent);
    let soft = !cleaned.contains(' ');
    let indent_len = indent.chars().count();

    let wrapped = if text.contains('\n') {
        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let line = if i < last { harden_line_end(line) } else { line };
                wrap_line(line, indent_len, soft)
            })
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        wrap_line(&text, indent_len, soft)
    };

    let mut out = String::with_capacity(wrapped.len() + indent.len() + cleaned.len() * 4);
    for (i, line) in wrapped.split('\n').enumerate() {
        if i == 0 {
            out.push_str(indent);
        } else {
            out.push('\n');
            out.push_str(&cleaned);
        }

        if line.bytes().all(|b| b == b' ') {
            continue;
        }
        if line.starts_with('>') || line.starts_with(' ') || line.starts_with("From") {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

/// Strips trailing spaces so an existing soft break becomes a hard one.
/// A `--` line followed by spaces becomes the `"-- "` signature separator
/// (RFC 3676 section 4.3).
fn harden_line_end(line: &str) -> &str {
    let trimmed = line.trim_end_matches(' ');
    if trimmed == "--" && trimmed.len() < line.len() {
        "-- "
    } else {
        trimmed
    }
}

fn wrap_line(line: &str, indent_len: usize, soft: bool) -> String {
    let break_seq = if soft { SOFT_BREAK } else { HARD_BREAK };
    let wrapped = wordwrap(line, FLOWED_WIDTH.saturating_sub(indent_len), break_seq, false);
    wordwrap(&wrapped, MAX_LINE_WIDTH.saturating_sub(indent_len), break_seq, true)
}
