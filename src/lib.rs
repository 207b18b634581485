//! voxroute - Query router for voice assistants
//!
//! This library provides the routing pipeline behind a household voice
//! assistant:
//! - Query classification via a local language model
//! - Dispatch to per-category workflow or assistant handlers
//! - Normalization of heterogeneous handler output into one sentence
//! - STT/TTS clients for the self-hosted speech services
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │   CLI  │  Interactive  │  Transcribe  │  Speak      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Router                          │
//! │  Classifier → Registry → Invoker → Normalizer       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 External services                    │
//! │   Ollama  │  Workflows  │  STT  │  TTS              │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod routing;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use llm::{CompletionBackend, CompletionRequest, OllamaClient};
pub use normalize::{Normalizer, RawOutput};
pub use routing::{
    Category, Classification, Classifier, HandlerBackend, HandlerDescriptor, HandlerInvoker,
    HandlerRegistry, HttpHandlerBackend, RouteOutcome, Router, StreamEvent,
};
pub use voice::{SpeechToText, TextToSpeech, Transcription};
