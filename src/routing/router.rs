//! End-to-end routing pipeline

use std::sync::Arc;

use serde::Serialize;

use super::{Category, Classification, Classifier, HandlerInvoker, HandlerRegistry, HttpHandlerBackend};
use crate::Result;
use crate::config::Config;
use crate::llm::OllamaClient;
use crate::normalize::Normalizer;

/// Response for an empty or whitespace-only query
pub const BLANK_QUERY_RESPONSE: &str = "I didn't catch a question. Please ask me something.";

/// Result of routing one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOutcome {
    /// Category the query was routed to
    pub category: Category,

    /// Classifier verdict (a fallback for blank queries)
    pub classification: Classification,

    /// Normalized, user-facing response
    pub response: String,

    /// Raw handler output already reached the caller chunk by chunk
    pub streamed: bool,
}

/// Progress reported by [`Router::process_stream`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent<'a> {
    /// The query was classified; the handler runs next
    Classified(&'a Classification),

    /// A piece of raw handler output
    Chunk(&'a str),
}

type EventSink<'a> = &'a mut (dyn FnMut(StreamEvent<'_>) + Send);

/// Routes queries to handlers and cleans up their answers
///
/// Holds no per-query state, so one router can serve concurrent queries.
#[derive(Debug, Clone)]
pub struct Router {
    classifier: Classifier,
    registry: Arc<HandlerRegistry>,
    invoker: HandlerInvoker,
    normalizer: Normalizer,
}

impl Router {
    /// Assemble a router from its stages
    #[must_use]
    pub fn new(classifier: Classifier, registry: Arc<HandlerRegistry>, invoker: HandlerInvoker) -> Self {
        Self {
            classifier,
            registry,
            invoker,
            normalizer: Normalizer::new(),
        }
    }

    /// Build a router wired to the services named in `config`
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be constructed
    pub fn from_config(config: &Config) -> Result<Self> {
        let classifier_llm = OllamaClient::new(
            &config.llm.url,
            &config.llm.classifier_model,
            config.llm.timeout,
        )?;
        let classifier = Classifier::new(Arc::new(classifier_llm))
            .with_temperature(config.llm.classifier_temperature)
            .with_timeout(config.llm.timeout);

        let assistant_llm =
            OllamaClient::new(&config.llm.url, &config.llm.model, config.workflows.timeout)?;
        let backend = HttpHandlerBackend::new(
            &config.workflows.base_url,
            config.workflows.api_key.clone(),
            Arc::new(assistant_llm),
        )
        .with_assistant_temperature(config.llm.temperature);

        let registry = Arc::new(config.handlers.clone());
        let invoker = HandlerInvoker::new(Arc::new(backend), registry.configured());

        tracing::debug!(
            llm = %config.llm.url,
            classifier_model = %config.llm.classifier_model,
            workflows = %config.workflows.base_url,
            configured = ?registry.configured(),
            "router initialized"
        );

        Ok(Self::new(classifier, registry, invoker))
    }

    /// Handler table this router dispatches with
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Route one query
    ///
    /// Never fails. Blank queries short-circuit to a fixed reply; every
    /// other failure becomes a user-facing string inside the stages.
    pub async fn process(&self, query: &str) -> RouteOutcome {
        self.route(query, None).await
    }

    /// Route one query, reporting the classification and any streamed
    /// handler output through `on_event` as they happen
    ///
    /// Assistant handlers stream; the returned outcome still carries the
    /// normalized response, with `streamed` set when chunks were delivered.
    pub async fn process_stream<F>(&self, query: &str, mut on_event: F) -> RouteOutcome
    where
        F: FnMut(StreamEvent<'_>) + Send,
    {
        self.route(query, Some(&mut on_event)).await
    }

    async fn route(&self, query: &str, on_event: Option<EventSink<'_>>) -> RouteOutcome {
        let request_id = uuid::Uuid::new_v4();
        let query = query.trim();

        if query.is_empty() {
            tracing::debug!(%request_id, "blank query");
            return RouteOutcome {
                category: Category::General,
                classification: Classification::fallback("Blank query"),
                response: BLANK_QUERY_RESPONSE.to_string(),
                streamed: false,
            };
        }

        tracing::info!(%request_id, query, streaming = on_event.is_some(), "routing query");

        let classification = self.classifier.classify(query).await;
        let category = classification.category;
        let descriptor = self.registry.resolve(category);

        let (raw, streamed) = match on_event {
            Some(on_event) => {
                on_event(StreamEvent::Classified(&classification));
                self.invoker
                    .invoke_stream(category, descriptor, query, |chunk| {
                        on_event(StreamEvent::Chunk(chunk));
                    })
                    .await
            }
            None => (self.invoker.invoke(category, descriptor, query).await, false),
        };
        tracing::debug!(%request_id, %category, raw = %raw, streamed, "handler output");

        let response = self.normalizer.normalize(&raw, category);
        tracing::info!(%request_id, %category, "query routed");

        RouteOutcome {
            category,
            classification,
            response,
            streamed,
        }
    }
}
