//! Ollama `/api/generate` client

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::{CompletionBackend, CompletionRequest, CompletionStream};
use crate::{Error, Result};

/// Request body for `/api/generate`
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body for a non-streaming `/api/generate` call
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// One line of a streaming `/api/generate` response
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Splits a byte stream into newline-delimited JSON lines
///
/// Lines may straddle network chunks; bytes are buffered until a newline
/// completes them.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete non-blank line, if one is buffered
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }

    /// Whatever is left once the stream has ended
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer))
            .trim()
            .to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Progress of one streaming response
struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: NdjsonDecoder,
    ended: bool,
    done: bool,
}

impl StreamState {
    fn next_line(&mut self) -> Option<String> {
        self.decoder
            .next_line()
            .or_else(|| if self.ended { self.decoder.finish() } else { None })
    }

    /// Produce the next text chunk, or `None` once the model is done
    async fn next_chunk(&mut self) -> Option<Result<String>> {
        loop {
            if self.done {
                return None;
            }

            if let Some(line) = self.next_line() {
                let chunk: GenerateChunk = match serde_json::from_str(&line) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e.into()));
                    }
                };
                if let Some(error) = chunk.error {
                    self.done = true;
                    return Some(Err(Error::Classification(format!(
                        "Ollama stream error: {error}"
                    ))));
                }
                self.done = chunk.done;
                if !chunk.response.is_empty() {
                    return Some(Ok(chunk.response));
                }
                continue;
            }

            if self.ended {
                return None;
            }

            match self.bytes.next().await {
                Some(Ok(bytes)) => self.decoder.push(&bytes),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                None => self.ended = true,
            }
        }
    }
}

/// Client for an Ollama inference server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    /// Create a client for `base_url` (e.g. `http://localhost:11434`)
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Send a generate request and check its status
    async fn generate(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            format: request.json.then_some("json"),
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            stream,
            "ollama generate"
        );

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            tracing::error!(error = %e, "ollama request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "ollama API error");
            return Err(Error::Classification(format!(
                "Ollama API error {status}: {body}"
            )));
        }

        Ok(response)
    }

    /// Check whether the server answers `GET /api/tags`
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "ollama health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let response = self.generate(request, false).await?;

        let result: GenerateResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse ollama response");
            e
        })?;

        Ok(result.response)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream> {
        let response = self.generate(request, true).await?;

        let state = StreamState {
            bytes: response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed(),
            decoder: NdjsonDecoder::new(),
            ended: false,
            done: false,
        };

        Ok(futures::stream::unfold(state, |mut state| async move {
            state.next_chunk().await.map(|item| (item, state))
        })
        .boxed())
    }
}
