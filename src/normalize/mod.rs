//! Response normalization
//!
//! Handler output arrives in several shapes: plain sentences, result
//! mappings serialized as literals, HTML gateway error pages, and upstream
//! API error reports. [`RawOutput::classify`] decides the shape once; the
//! [`Normalizer`] then renders a clean, non-empty sentence for the user.

mod literal;
mod upstream;

pub use literal::{LiteralError, LiteralSyntax, MAX_DEPTH, parse_mapping};
pub use upstream::{
    API_ERROR_MARKER, ApiFailure, TransportFailure, UpstreamFailure, is_html, page_title,
};

use serde_json::{Map, Value};

use crate::routing::{Category, Presentation};

/// Label prefixes workflows put in front of their output
pub const LABEL_PREFIXES: [&str; 3] = ["response: ", "routing_decision: ", "final_output: "];

/// Returned when there is nothing presentable at all
pub const EMPTY_RESPONSE: &str = "Sorry, I couldn't process your request.";

/// Marker of a handler-reported error sentence
const ERROR_CLAUSE_MARKER: &str = "encountered an error:";

/// Fields tried, in order, for the answer inside a result mapping
const ANSWER_FIELDS: [&str; 3] = ["final_response", "response", "content"];

/// Readable answer pulled out of a result mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredPayload {
    /// The answer text
    pub answer: String,
    /// Field the answer came from
    pub field: &'static str,
}

impl StructuredPayload {
    /// Extract the answer from a decoded result mapping
    ///
    /// Tries `final_response`, `response`, `content`, then the last
    /// `conversation_history` turn if it belongs to the assistant.
    #[must_use]
    pub fn from_mapping(map: &Map<String, Value>) -> Option<Self> {
        for field in ANSWER_FIELDS {
            if let Some(answer) = map.get(field).and_then(scalar_text) {
                return Some(Self { answer, field });
            }
        }

        let last = map.get("conversation_history")?.as_array()?.last()?;
        if last.get("role").and_then(Value::as_str) != Some("assistant") {
            return None;
        }
        let answer = last.get("content").and_then(scalar_text)?;
        Some(Self {
            answer,
            field: "conversation_history",
        })
    }
}

/// Text of a non-empty string, number, or boolean
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Shape of raw handler output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    /// Natural-language text (possibly already tagged)
    PlainText(String),
    /// Result mapping with an extractable answer
    Structured(StructuredPayload),
    /// Gateway page or upstream API error
    ErrorDocument(UpstreamFailure),
}

impl RawOutput {
    /// Decide the shape of label-stripped handler output
    ///
    /// Precedence: HTML error page, then API error marker, then result
    /// mapping, then plain text. A mapping that fails to decode, or has no
    /// answer field, is plain text.
    #[must_use]
    pub fn classify(content: &str) -> Self {
        if let Some(failure) = UpstreamFailure::detect(content) {
            return Self::ErrorDocument(failure);
        }

        if is_result_mapping(content) {
            match parse_mapping(content) {
                Ok(map) => {
                    if let Some(payload) = StructuredPayload::from_mapping(&map) {
                        return Self::Structured(payload);
                    }
                    tracing::debug!("result mapping has no answer field");
                }
                Err(e) => tracing::debug!(error = %e, "could not decode result mapping"),
            }
        }

        Self::PlainText(content.to_string())
    }
}

/// Whether content opens with a `success` key
fn is_result_mapping(content: &str) -> bool {
    content.starts_with("{'success'") || content.starts_with("{\"success\"")
}

/// Strip one leading `response: ` label
fn strip_response_label(raw: &str) -> &str {
    raw.strip_prefix(LABEL_PREFIXES[0]).map_or(raw, str::trim)
}

/// Strip every known label prefix, in order
fn strip_label_prefixes(raw: &str) -> &str {
    LABEL_PREFIXES
        .iter()
        .fold(raw, |text, prefix| text.strip_prefix(prefix).map_or(text, str::trim))
}

/// Turns raw handler output into user-facing text
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Create a normalizer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Normalize raw output produced for `category`
    ///
    /// Always returns a non-empty string. Output for presented categories is
    /// a fixed point; for other categories each label prefix is stripped at
    /// most once per call, so stacked labels need repeated passes.
    #[must_use]
    pub fn normalize(&self, raw: &str, category: Category) -> String {
        if raw.trim().is_empty() {
            return EMPTY_RESPONSE.to_string();
        }

        match category.presentation() {
            Some(presentation) => Self::present(raw, &presentation),
            None => {
                let cleaned = strip_label_prefixes(raw);
                if cleaned.trim().is_empty() {
                    EMPTY_RESPONSE.to_string()
                } else {
                    cleaned.to_string()
                }
            }
        }
    }

    fn present(raw: &str, p: &Presentation) -> String {
        let content = strip_response_label(raw);
        if content.trim().is_empty() {
            return EMPTY_RESPONSE.to_string();
        }

        match RawOutput::classify(content) {
            RawOutput::ErrorDocument(failure) => failure.message(p),
            RawOutput::Structured(payload) => {
                tracing::debug!(field = payload.field, "answer extracted from result mapping");
                p.tag(&payload.answer)
            }
            RawOutput::PlainText(text) => Self::present_text(&text, p),
        }
    }

    fn present_text(text: &str, p: &Presentation) -> String {
        if text.contains(&p.marker()) {
            return text.to_string();
        }

        // ASCII lowercasing keeps byte offsets aligned with `text`
        if let Some(pos) = text.to_ascii_lowercase().find(ERROR_CLAUSE_MARKER) {
            let clause = text[pos..].trim();
            return p.tag(&format!("Sorry, I {clause}"));
        }

        p.tag(text)
    }
}
