//! Static category → handler mapping

use std::collections::HashMap;
use std::time::Duration;

use super::Category;

/// Default time budget for one handler invocation
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(120);

/// What executes a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    /// Remote workflow run by the orchestration service
    Workflow {
        /// Workflow name on the orchestration service
        name: String,
    },
    /// Direct language model call with an expert system prompt
    Assistant {
        /// System prompt framing the assistant
        system_prompt: String,
    },
}

/// Handler configured for a category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Human-readable handler name, for logs
    pub name: String,

    /// How the handler runs
    pub kind: HandlerKind,

    /// Time budget for one invocation
    pub timeout: Duration,
}

impl HandlerDescriptor {
    /// Descriptor for a remote workflow
    #[must_use]
    pub fn workflow(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: name.clone(),
            kind: HandlerKind::Workflow { name },
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Descriptor for a direct assistant
    #[must_use]
    pub fn assistant(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: HandlerKind::Assistant {
                system_prompt: system_prompt.into(),
            },
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the invocation timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Immutable category → handler table
///
/// A category without an entry is deliberately unconfigured, not an error.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Category, HandlerDescriptor>,
}

impl HandlerRegistry {
    /// Empty registry: every category unconfigured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock deployment: Japanese and smart-home workflows, no general handler
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with(Category::Japanese, HandlerDescriptor::workflow("streaming_japanese_agent"))
            .with(Category::HomeAssistant, HandlerDescriptor::workflow("home_assistant_agent"))
    }

    /// Register a handler for a category, replacing any previous one
    #[must_use]
    pub fn with(mut self, category: Category, descriptor: HandlerDescriptor) -> Self {
        self.handlers.insert(category, descriptor);
        self
    }

    /// Remove the handler for a category
    #[must_use]
    pub fn without(mut self, category: Category) -> Self {
        self.handlers.remove(&category);
        self
    }

    /// Look up the handler for a category
    #[must_use]
    pub fn resolve(&self, category: Category) -> Option<&HandlerDescriptor> {
        self.handlers.get(&category)
    }

    /// Categories that have a handler, in `Category::ALL` order
    #[must_use]
    pub fn configured(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.handlers.contains_key(c))
            .collect()
    }
}

/// Expert system prompt for a category's direct assistant
#[must_use]
pub const fn expert_prompt(category: Category) -> &'static str {
    match category {
        Category::HomeAssistant => {
            "You are a Home Assistant expert specializing in smart home automation, IoT devices, and home management systems. You have deep knowledge of:
- Home Assistant platform and integrations
- Smart lighting, thermostats, and climate control
- Security systems and cameras
- Automation scripts and scenes
- Device troubleshooting and setup
- Energy monitoring and management

Provide helpful, practical advice with specific examples and configuration details when appropriate."
        }
        Category::Japanese => {
            "You are a Japanese culture and language expert with comprehensive knowledge of:
- Japanese language (grammar, vocabulary, kanji, hiragana, katakana)
- Japanese culture, customs, and traditions
- Anime, manga, and Japanese entertainment
- Japanese food, cooking, and dining etiquette
- Travel in Japan (transportation, accommodations, attractions)
- Japanese business culture and social norms
- Japanese history and regional differences

Provide accurate, culturally sensitive information with practical examples. When discussing language, include romanization and explain cultural context."
        }
        Category::General => {
            "You are a knowledgeable general assistant with expertise across many domains including:
- Programming and software development
- Science, mathematics, and technology
- History, geography, and social sciences
- Arts, literature, and philosophy
- Problem-solving and analysis
- Research and fact-checking

Provide accurate, well-reasoned responses with clear explanations. When appropriate, include examples, step-by-step guidance, or references to help users understand complex topics."
        }
    }
}
