//! Recovery for near-valid JSON returned by a model: locate the payload in a
//! chatty reply, repair common defects, then decode strictly.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is empty")]
    Empty,

    #[error("no JSON payload found in response")]
    NoPayload,

    #[error("invalid JSON after repair: {source} (near: {excerpt:?})")]
    Json {
        #[source]
        source: serde_json::Error,
        excerpt: String,
    },

    #[error("unexpected JSON shape: expected {expected}")]
    Shape { expected: &'static str },
}

/// Decodes the JSON payload of `text`, repairing it first if strict decoding fails.
pub fn parse_lenient(text: &str) -> Result<serde_json::Value, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let payload = extract_json_payload(text).ok_or(ParseError::NoPayload)?;
    if let Ok(value) = serde_json::from_str(payload) {
        return Ok(value);
    }

    let repaired = repair_json(payload);
    tracing::debug!(
        payload_chars = payload.len(),
        repaired_chars = repaired.len(),
        "repaired json payload"
    );
    serde_json::from_str(&repaired).map_err(|source| ParseError::Json {
        source,
        excerpt: repaired.chars().take(160).collect(),
    })
}

/// Finds the JSON part of a reply: a fenced block if present, narrowed to the
/// first opening bracket and the last closing one.
pub fn extract_json_payload(text: &str) -> Option<&str> {
    let text = text.trim();
    fenced_block(text)
        .and_then(narrow_to_brackets)
        .or_else(|| narrow_to_brackets(text))
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| text.find("```").map(|i| i + "```".len()))?;
    let rest = &text[open..];
    // Skip an info string such as `JSON` on the fence line.
    let rest = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            &rest[nl + 1..]
        }
        _ => rest,
    };
    Some(match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    })
}

fn narrow_to_brackets(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let body = &text[start..];
    match body.rfind([']', '}']) {
        Some(end) => Some(&body[..=end]),
        // Truncated reply; the repair pass closes what is open.
        None => Some(body),
    }
}

#[derive(Debug, Clone, Copy)]
enum Quote {
    Double,
    Smart,
    Single,
}

impl Quote {
    fn closes(self, c: char) -> bool {
        match self {
            Quote::Double => c == '"',
            Quote::Smart => matches!(c, '"' | '”' | '“'),
            Quote::Single => c == '\'',
        }
    }
}

/// Single-pass repair of common model JSON defects: smart or single quotes,
/// bare keys, Python literals, trailing commas, raw control characters inside
/// strings, and unterminated strings or brackets.
pub fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut closers: Vec<char> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => read_string(&mut chars, &mut out, Quote::Double),
            '“' | '”' => read_string(&mut chars, &mut out, Quote::Smart),
            '\'' => read_string(&mut chars, &mut out, Quote::Single),
            '{' => {
                out.push('{');
                closers.push('}');
            }
            '[' => {
                out.push('[');
                closers.push(']');
            }
            '}' | ']' => close_to(&mut out, &mut closers, c),
            c if c.is_ascii_digit()
                || (c == '-' && chars.peek().is_some_and(|n| n.is_ascii_digit())) =>
            {
                out.push(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_digit() || matches!(next, '.' | 'e' | 'E' | '+' | '-') {
                        out.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "true" | "True" => out.push_str("true"),
                    "false" | "False" => out.push_str("false"),
                    "null" | "None" => out.push_str("null"),
                    _ => {
                        out.push('"');
                        out.push_str(&word);
                        out.push('"');
                    }
                }
            }
            c => out.push(c),
        }
    }

    while let Some(closer) = closers.pop() {
        push_closer(&mut out, closer);
    }
    out
}

fn read_string(chars: &mut Peekable<Chars<'_>>, out: &mut String, quote: Quote) {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => {}
            },
            c if quote.closes(c) => {
                out.push('"');
                return;
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn close_to(out: &mut String, closers: &mut Vec<char>, closer: char) {
    if !closers.contains(&closer) {
        return;
    }
    while let Some(expected) = closers.pop() {
        push_closer(out, expected);
        if expected == closer {
            break;
        }
    }
}

fn push_closer(out: &mut String, closer: char) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
    out.push(closer);
}
