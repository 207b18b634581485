//! Query classification via a language model

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::Category;
use super::extract::extract_routing_decision;
use crate::llm::{CompletionBackend, CompletionRequest};

/// Default time budget for one classification call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Token cap for a classification answer; the JSON verdict is short
pub const MAX_CLASSIFICATION_TOKENS: u32 = 256;

/// Confidence reported when the category had to be dug out of free text
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Confidence reported when classification was unavailable
pub const FALLBACK_CONFIDENCE: f64 = 0.0;

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Backend returned the requested JSON shape
    Structured,
    /// Category was extracted from unstructured text
    FreeText,
    /// Backend failed; the default category was used
    Fallback,
}

/// Result of classifying one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Chosen category
    pub category: Category,

    /// Confidence in `[0, 1]`
    pub confidence: f64,

    /// Short explanation from the model (or of the fallback)
    pub reasoning: String,

    /// How the result was obtained
    pub source: ClassificationSource,
}

impl Classification {
    /// Default result used when the backend is unreachable or times out
    #[must_use]
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            category: Category::General,
            confidence: FALLBACK_CONFIDENCE,
            reasoning: reason.into(),
            source: ClassificationSource::Fallback,
        }
    }
}

/// Shape the model is asked to produce
#[derive(Deserialize)]
struct ModelClassification {
    category: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Classifies queries into the closed category set
#[derive(Clone)]
pub struct Classifier {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("model", &self.backend.model())
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Classifier {
    /// Create a classifier over a completion backend
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            temperature: 0.1,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the sampling temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the per-call timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify a query
    ///
    /// Never fails: backend errors and timeouts produce
    /// [`Classification::fallback`].
    pub async fn classify(&self, query: &str) -> Classification {
        let request = CompletionRequest::new(build_prompt(query))
            .with_temperature(self.temperature)
            .with_max_tokens(MAX_CLASSIFICATION_TOKENS)
            .json();

        let raw = match timeout(self.timeout, self.backend.complete(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "classification backend failed");
                return Classification::fallback(format!(
                    "Classification unavailable ({e}); defaulting to GENERAL"
                ));
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "classification timed out");
                return Classification::fallback(format!(
                    "Classification timed out after {:?}; defaulting to GENERAL",
                    self.timeout
                ));
            }
        };

        let classification = parse_classification(&raw);
        tracing::info!(
            category = %classification.category,
            confidence = classification.confidence,
            source = ?classification.source,
            reasoning = %classification.reasoning,
            "query classified"
        );
        classification
    }
}

/// Build the classification prompt for a query
#[must_use]
pub fn build_prompt(query: &str) -> String {
    let mut prompt = String::from(
        "You are a query classifier that determines which specialized assistant should handle a user's question.\n\nClassify queries into these categories:\n",
    );
    for category in Category::ALL {
        let _ = writeln!(prompt, "- '{}': {}", category.label(), category.description());
    }
    let _ = write!(
        prompt,
        "\nProvide a confidence score (0.0 to 1.0) and brief reasoning for your classification.\n\nQuery: {query}\n\nRespond with JSON containing category, confidence, and reasoning."
    );
    prompt
}

/// Parse raw model output into a classification
///
/// Structured JSON is preferred; anything else goes through the free-text
/// extraction heuristics.
#[must_use]
pub fn parse_classification(raw: &str) -> Classification {
    if let Some(parsed) = json_object(raw).and_then(|s| serde_json::from_str::<ModelClassification>(s).ok()) {
        let category = Category::from_label(&parsed.category)
            .unwrap_or_else(|| extract_routing_decision(&parsed.category));
        let confidence = parsed
            .confidence
            .filter(|c| c.is_finite())
            .map_or(NEUTRAL_CONFIDENCE, |c| c.clamp(0.0, 1.0));

        return Classification {
            category,
            confidence,
            reasoning: parsed.reasoning.unwrap_or_default(),
            source: ClassificationSource::Structured,
        };
    }

    tracing::debug!(raw = %raw, "classifier output not structured, extracting from text");
    Classification {
        category: extract_routing_decision(raw),
        confidence: NEUTRAL_CONFIDENCE,
        reasoning: "Category extracted from unstructured classifier output".to_string(),
        source: ClassificationSource::FreeText,
    }
}

/// Slice the outermost `{ ... }` out of model output, ignoring code fences
fn json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}
