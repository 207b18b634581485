//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use voxroute::llm::{CompletionBackend, CompletionRequest, CompletionStream};
use voxroute::routing::{HandlerBackend, HandlerDescriptor, HandlerInputs, HandlerKind};
use voxroute::{Classifier, Error, HandlerInvoker, HandlerRegistry, Result, Router};

/// Completion backend answering from a script keyed by query substring
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Vec<(String, String)>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    /// Answer `reply` whenever the prompt mentions `needle`
    #[must_use]
    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.replies.push((needle.to_string(), reply.to_string()));
        self
    }

    /// Classify any prompt mentioning `needle` as `label`
    #[must_use]
    pub fn classify(self, needle: &str, label: &str, confidence: f64) -> Self {
        let reply = serde_json::json!({
            "category": label,
            "confidence": confidence,
            "reasoning": format!("mentions {needle}"),
        });
        self.on(needle, &reply.to_string())
    }

    /// Sleep before every reply
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl CompletionBackend for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| Error::Classification("connection refused".to_string()))
    }
}

/// Handler backend returning canned output per handler name
#[derive(Default)]
pub struct FakeHandlers {
    outputs: HashMap<String, std::result::Result<String, String>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeHandlers {
    /// Return `output` from the handler named `name`
    #[must_use]
    pub fn returning(mut self, name: &str, output: &str) -> Self {
        self.outputs.insert(name.to_string(), Ok(output.to_string()));
        self
    }

    /// Fail the handler named `name`
    #[must_use]
    pub fn failing(mut self, name: &str, message: &str) -> Self {
        self.outputs.insert(name.to_string(), Err(message.to_string()));
        self
    }

    /// Sleep before every reply
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(handler, query)` pairs seen so far
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HandlerBackend for FakeHandlers {
    async fn execute(&self, descriptor: &HandlerDescriptor, inputs: &HandlerInputs) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((descriptor.name.clone(), inputs.query().to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.outputs.get(&descriptor.name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(Error::Handler(message.clone())),
            None => match &descriptor.kind {
                HandlerKind::Workflow { name } => Err(Error::Handler(format!("no such workflow: {name}"))),
                HandlerKind::Assistant { .. } => Ok(format!("assistant answer to {}", inputs.query())),
            },
        }
    }

    /// Assistants without a canned output stream their default answer in
    /// three pieces; everything else arrives whole
    async fn execute_stream(
        &self,
        descriptor: &HandlerDescriptor,
        inputs: &HandlerInputs,
    ) -> Result<CompletionStream> {
        let streams = matches!(descriptor.kind, HandlerKind::Assistant { .. })
            && !self.outputs.contains_key(&descriptor.name);
        if !streams {
            let output = self.execute(descriptor, inputs).await?;
            return Ok(futures::stream::iter([Ok(output)]).boxed());
        }

        self.calls
            .lock()
            .unwrap()
            .push((descriptor.name.clone(), inputs.query().to_string()));
        let chunks = ["assistant ".to_string(), "answer to ".to_string(), inputs.query().to_string()];
        Ok(futures::stream::iter(chunks.map(Ok)).boxed())
    }
}

/// Assemble a router over fakes
pub fn router(llm: ScriptedLlm, handlers: Arc<FakeHandlers>, registry: HandlerRegistry) -> Router {
    let classifier = Classifier::new(Arc::new(llm)).with_timeout(Duration::from_millis(200));
    let invoker = HandlerInvoker::new(handlers, registry.configured());
    Router::new(classifier, Arc::new(registry), invoker)
}
