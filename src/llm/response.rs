//! Cleaning of free-text model replies before they are decoded.
//!
//! Models wrap JSON in code fences, prefix it with a language tag, quote it,
//! or surround it with prose. Every consumer goes through [`clean`] and then
//! one of the typed decoders, which report [`LlmReply::Empty`] instead of failing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, error};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^```[\w ]*\n|```$").unwrap());

const LANGUAGE_TAGS: &[&str] = &["plaintext", "json", "python", "html", "javascript"];

/// Outcome of decoding a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply<T> {
    Parsed(T),
    Empty,
}

impl<T: Default> LlmReply<T> {
    pub fn unwrap_or_default(self) -> T {
        match self {
            LlmReply::Parsed(v) => v,
            LlmReply::Empty => T::default(),
        }
    }
}

impl<T> LlmReply<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, LlmReply::Empty)
    }
}

/// Which outermost span to keep.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn delimiters(self) -> (char, char) {
        match self {
            Shape::Object => ('{', '}'),
            Shape::Array => ('[', ']'),
        }
    }
}

/// Strip fences, language tags, wrapping quotes and newlines, then cut out the
/// outermost `{..}` / `[..]` span. `None` when no such span exists.
pub fn clean(raw: &str, shape: Shape) -> Option<String> {
    let text = FENCE_RE.replace_all(raw.trim(), "");
    let mut text = text.replace('`', "");

    for tag in LANGUAGE_TAGS {
        let prefix = format!("{}\n", tag);
        if text.len() >= prefix.len()
            && text.is_char_boundary(prefix.len())
            && text[..prefix.len()].eq_ignore_ascii_case(&prefix)
        {
            text = text[prefix.len()..].to_string();
        }
    }

    let text = text.trim();
    let text = text.strip_prefix(['\'', '"']).unwrap_or(text);
    let text = text.strip_suffix(['\'', '"']).unwrap_or(text);
    let text = text.replace('\n', "");

    let (open, close) = shape.delimiters();
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start >= end {
        return None;
    }
    Some(normalize_escapes(&text[start..=end]))
}

/// HTML entities are decoded and escapes JSON does not know (`\'`) are dropped.
fn normalize_escapes(span: &str) -> String {
    let decoded = html_escape::decode_html_entities(span);
    decoded.replace("\\'", "'")
}

pub fn parse_object(raw: &str) -> LlmReply<Map<String, Value>> {
    let Some(cleaned) = clean(raw, Shape::Object) else {
        debug!("No JSON object in model reply");
        return LlmReply::Empty;
    };
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(map)) => LlmReply::Parsed(map),
        Ok(_) => LlmReply::Empty,
        Err(e) => {
            error!("Failed to parse LLM response as JSON: {}", e);
            LlmReply::Empty
        }
    }
}

pub fn parse_list(raw: &str) -> LlmReply<Vec<Value>> {
    let Some(cleaned) = clean(raw, Shape::Array) else {
        debug!("No JSON array in model reply");
        return LlmReply::Empty;
    };
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Array(items)) => LlmReply::Parsed(items),
        Ok(_) => LlmReply::Empty,
        Err(e) => {
            error!("Failed to parse LLM response as JSON list: {}", e);
            LlmReply::Empty
        }
    }
}

/// Any reply containing "true" (case-insensitive) counts as a yes, including
/// "not true". Positives are preferred over missed documents.
pub fn answers_true(raw: &str) -> bool {
    raw.trim().to_lowercase().contains("true")
}
