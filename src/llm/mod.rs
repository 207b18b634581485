//! Language model completion backends
//!
//! The router only needs plain text completion: one prompt in, one string
//! out. Backends implement [`CompletionBackend`] so tests can swap in
//! canned responses.

mod ollama;

pub use ollama::{NdjsonDecoder, OllamaClient};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::Result;

/// Completion text delivered piece by piece as the model generates it
pub type CompletionStream = BoxStream<'static, Result<String>>;

/// A single completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// User prompt
    pub prompt: String,

    /// Optional system prompt
    pub system: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Upper bound on generated tokens
    pub max_tokens: Option<u32>,

    /// Ask the backend to constrain output to JSON
    pub json: bool,
}

impl CompletionRequest {
    /// Create a request with default sampling settings
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: None,
            json: false,
        }
    }

    /// Set the system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap the number of generated tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Constrain output to JSON
    #[must_use]
    pub const fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Text completion capability
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier, for logs
    fn model(&self) -> &str;

    /// Complete a prompt
    ///
    /// # Errors
    ///
    /// Returns error if the remote call fails or the response is malformed
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Complete a prompt, yielding text as it is generated
    ///
    /// Backends without incremental output deliver the whole completion as
    /// a single chunk.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be started; failures after the
    /// first chunk arrive as stream items
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let text = self.complete(request).await?;
        Ok(futures::stream::iter([Ok(text)]).boxed())
    }
}
