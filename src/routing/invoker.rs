//! Handler execution

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::registry::{HandlerDescriptor, HandlerKind};
use super::Category;
use crate::llm::{CompletionBackend, CompletionRequest, CompletionStream};
use crate::voice::HEALTH_TIMEOUT;
use crate::{Error, Result};

/// Keys the query is passed under
///
/// Handlers are wired in externally and disagree on their input name, so
/// every known spelling is supplied.
pub const INPUT_KEYS: [&str; 6] = [
    "user_input",
    "user_query",
    "user_request",
    "user_question",
    "user_command",
    "message",
];

/// Inputs handed to a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HandlerInputs {
    values: BTreeMap<String, String>,
}

impl HandlerInputs {
    /// Supply `query` under every key in [`INPUT_KEYS`]
    #[must_use]
    pub fn for_query(query: &str) -> Self {
        let values = INPUT_KEYS
            .iter()
            .map(|key| ((*key).to_string(), query.to_string()))
            .collect();
        Self { values }
    }

    /// Value for one key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The original query
    #[must_use]
    pub fn query(&self) -> &str {
        self.get("user_query").unwrap_or_default()
    }
}

/// Executes a handler and returns its raw textual output
#[async_trait]
pub trait HandlerBackend: Send + Sync {
    /// Run the handler described by `descriptor`
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be reached or reports failure
    async fn execute(&self, descriptor: &HandlerDescriptor, inputs: &HandlerInputs) -> Result<String>;

    /// Run the handler, yielding its output as it is produced
    ///
    /// Handlers without incremental output deliver everything as one chunk.
    ///
    /// # Errors
    ///
    /// Returns error if the handler cannot be started
    async fn execute_stream(
        &self,
        descriptor: &HandlerDescriptor,
        inputs: &HandlerInputs,
    ) -> Result<CompletionStream> {
        let output = self.execute(descriptor, inputs).await?;
        Ok(futures::stream::iter([Ok(output)]).boxed())
    }
}

/// Workflow run request body
#[derive(Serialize)]
struct RunRequest<'a> {
    inputs: &'a HandlerInputs,
}

/// Workflow run response body
#[derive(Deserialize)]
struct RunResponse {
    success: bool,
    #[serde(default)]
    final_output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs workflows over HTTP and assistants through a completion backend
pub struct HttpHandlerBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    llm: Arc<dyn CompletionBackend>,
    assistant_temperature: f32,
    health_timeout: Duration,
}

impl HttpHandlerBackend {
    /// Create a backend for the orchestration service at `base_url`
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        llm: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            llm,
            assistant_temperature: 0.7,
            health_timeout: HEALTH_TIMEOUT,
        }
    }

    /// Override the temperature used for direct assistants
    #[must_use]
    pub const fn with_assistant_temperature(mut self, temperature: f32) -> Self {
        self.assistant_temperature = temperature;
        self
    }

    /// Override the time budget for [`Self::is_available`]
    #[must_use]
    pub const fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Check whether the orchestration service answers at its base URL
    pub async fn is_available(&self) -> bool {
        let request = self.client.get(&self.base_url).timeout(self.health_timeout);
        match request.send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "workflow health check failed");
                false
            }
        }
    }

    async fn run_workflow(
        &self,
        name: &str,
        descriptor: &HandlerDescriptor,
        inputs: &HandlerInputs,
    ) -> Result<String> {
        let url = format!("{}/workflows/{name}/run", self.base_url);
        tracing::debug!(workflow = name, url = %url, "running workflow");

        let mut req = self
            .client
            .post(&url)
            .timeout(descriptor.timeout)
            .json(&RunRequest { inputs });

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        parse_run_body(status, &body)
    }

    fn assistant_request(&self, system_prompt: &str, inputs: &HandlerInputs) -> CompletionRequest {
        CompletionRequest::new(inputs.query())
            .with_system(system_prompt)
            .with_temperature(self.assistant_temperature)
    }
}

/// Turn a workflow response into raw handler output
///
/// HTML bodies are passed through untouched so gateway error pages reach
/// the normalizer.
fn parse_run_body(status: reqwest::StatusCode, body: &str) -> Result<String> {
    if body.trim_start().starts_with('<') {
        tracing::debug!(status = %status, "workflow returned markup");
        return Ok(body.to_string());
    }

    if let Ok(run) = serde_json::from_str::<RunResponse>(body) {
        if !run.success {
            let error = run.error.unwrap_or_else(|| "workflow reported failure".to_string());
            return Err(Error::Handler(format!("Agent execution failed: {error}")));
        }
        return Ok(match run.final_output {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        });
    }

    if status.is_success() {
        Ok(body.to_string())
    } else {
        Err(Error::Handler(format!("workflow API error {status}: {body}")))
    }
}

#[async_trait]
impl HandlerBackend for HttpHandlerBackend {
    async fn execute(&self, descriptor: &HandlerDescriptor, inputs: &HandlerInputs) -> Result<String> {
        match &descriptor.kind {
            HandlerKind::Workflow { name } => self.run_workflow(name, descriptor, inputs).await,
            HandlerKind::Assistant { system_prompt } => {
                self.llm.complete(&self.assistant_request(system_prompt, inputs)).await
            }
        }
    }

    async fn execute_stream(
        &self,
        descriptor: &HandlerDescriptor,
        inputs: &HandlerInputs,
    ) -> Result<CompletionStream> {
        match &descriptor.kind {
            HandlerKind::Workflow { name } => {
                let output = self.run_workflow(name, descriptor, inputs).await?;
                Ok(futures::stream::iter([Ok(output)]).boxed())
            }
            HandlerKind::Assistant { system_prompt } => {
                self.llm
                    .complete_stream(&self.assistant_request(system_prompt, inputs))
                    .await
            }
        }
    }
}

/// Invokes handlers, turning every failure into text
#[derive(Clone)]
pub struct HandlerInvoker {
    backend: Arc<dyn HandlerBackend>,
    configured: Vec<Category>,
}

impl std::fmt::Debug for HandlerInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerInvoker")
            .field("configured", &self.configured)
            .finish_non_exhaustive()
    }
}

impl HandlerInvoker {
    /// Create an invoker
    ///
    /// `configured` lists the categories that do have handlers; it is only
    /// used to word the unconfigured-category message.
    #[must_use]
    pub fn new(backend: Arc<dyn HandlerBackend>, configured: Vec<Category>) -> Self {
        Self { backend, configured }
    }

    /// Invoke the handler for `category`
    ///
    /// Never fails: a missing descriptor yields [`unconfigured_message`] and
    /// errors or timeouts yield a category-tagged error sentence.
    pub async fn invoke(
        &self,
        category: Category,
        descriptor: Option<&HandlerDescriptor>,
        query: &str,
    ) -> String {
        let Some(descriptor) = descriptor else {
            tracing::info!(%category, "no handler configured");
            return unconfigured_message(category, &self.configured, query);
        };

        let inputs = HandlerInputs::for_query(query);
        tracing::debug!(%category, handler = %descriptor.name, "invoking handler");

        match timeout(descriptor.timeout, self.backend.execute(descriptor, &inputs)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::warn!(%category, handler = %descriptor.name, error = %e, "handler failed");
                failure_message(category, &e)
            }
            Err(_) => {
                tracing::warn!(%category, handler = %descriptor.name, timeout = ?descriptor.timeout, "handler timed out");
                failure_message(category, &Error::Timeout(descriptor.timeout))
            }
        }
    }

    /// Invoke the handler for `category`, passing output to `on_chunk` as it arrives
    ///
    /// Only assistant handlers stream; anything else goes through
    /// [`Self::invoke`]. Returns the full output and whether it was streamed.
    /// A failure part way through discards the partial text and returns the
    /// failure sentence unstreamed.
    pub async fn invoke_stream<F>(
        &self,
        category: Category,
        descriptor: Option<&HandlerDescriptor>,
        query: &str,
        mut on_chunk: F,
    ) -> (String, bool)
    where
        F: FnMut(&str) + Send,
    {
        let Some(descriptor) = descriptor.filter(|d| matches!(d.kind, HandlerKind::Assistant { .. })) else {
            return (self.invoke(category, descriptor, query).await, false);
        };

        let inputs = HandlerInputs::for_query(query);
        tracing::debug!(%category, handler = %descriptor.name, "streaming handler");

        let mut output = String::new();
        let collect = async {
            let mut stream = self.backend.execute_stream(descriptor, &inputs).await?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                on_chunk(&chunk);
                output.push_str(&chunk);
            }
            Ok::<_, Error>(())
        };
        let result = timeout(descriptor.timeout, collect).await;

        match result {
            Ok(Ok(())) => (output, true),
            Ok(Err(e)) => {
                tracing::warn!(%category, handler = %descriptor.name, error = %e, "handler stream failed");
                (failure_message(category, &e), false)
            }
            Err(_) => {
                tracing::warn!(%category, handler = %descriptor.name, timeout = ?descriptor.timeout, "handler stream timed out");
                (failure_message(category, &Error::Timeout(descriptor.timeout)), false)
            }
        }
    }
}

/// Sentence reported when a handler fails
#[must_use]
pub fn failure_message(category: Category, error: &Error) -> String {
    format!("The {category} handler encountered an error: {error}")
}

/// Explanation returned for a category without a handler
#[must_use]
pub fn unconfigured_message(category: Category, configured: &[Category], query: &str) -> String {
    let topics: Vec<&str> = configured
        .iter()
        .filter(|c| **c != category)
        .map(|c| c.topic())
        .collect();

    if topics.is_empty() {
        return format!(
            "I'm a specialized routing system, but I don't have any handlers configured to answer '{query}'."
        );
    }

    let topics = topics.join(" or ");
    format!(
        "I'm a specialized routing system. I can help with {topics}, but I don't have a {} handler configured for '{query}'. Please ask about {topics}.",
        category.topic()
    )
}
