//! Configuration management for voxroute
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::routing::registry::expert_prompt;
use crate::routing::{Category, HandlerDescriptor, HandlerRegistry};
use crate::{Error, Result};
use file::{ConfigFile, HandlerFileKind};

const DEFAULT_LLM_URL: &str = "http://localhost:11434";
const DEFAULT_LLM_MODEL: &str = "qwen2.5:7b";
const DEFAULT_WORKFLOW_URL: &str = "http://localhost:8000";
const DEFAULT_STT_URL: &str = "http://localhost:8002";
const DEFAULT_TTS_URL: &str = "http://localhost:8080";
const DEFAULT_TTS_VOICE: &str = "sonnet29";

/// voxroute configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Language model configuration
    pub llm: LlmConfig,

    /// Workflow orchestration service
    pub workflows: WorkflowConfig,

    /// Category → handler table
    pub handlers: HandlerRegistry,

    /// Speech services
    pub voice: VoiceConfig,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama server URL
    pub url: String,

    /// Model for direct assistants
    pub model: String,

    /// Model for classification
    pub classifier_model: String,

    /// Assistant sampling temperature
    pub temperature: f32,

    /// Classifier sampling temperature
    pub classifier_temperature: f32,

    /// Classification time budget
    pub timeout: Duration,
}

/// Workflow orchestration service configuration
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Service base URL
    pub base_url: String,

    /// Bearer token for workflow runs
    pub api_key: Option<SecretString>,

    /// Default handler time budget
    pub timeout: Duration,
}

/// Speech services configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Transcription server URL
    pub stt_url: String,

    /// Transcription model
    pub stt_model: String,

    /// Transcription language, or "auto"
    pub stt_language: String,

    /// Transcription time budget
    pub stt_timeout: Duration,

    /// Speech synthesis server URL
    pub tts_url: String,

    /// Speaker identifier
    pub tts_voice: String,

    /// Reference audio for voice cloning
    pub tts_reference_audio: Option<String>,

    /// Synthesis time budget
    pub tts_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded, or a
    /// value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a URL is malformed or a handler key is not a
    /// category
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model = env("VOXROUTE_LLM_MODEL")
            .or(fc.llm.model)
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());

        let llm = LlmConfig {
            url: validate_url(
                "llm",
                env("VOXROUTE_LLM_URL")
                    .or(fc.llm.url)
                    .unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
            )?,
            classifier_model: env("VOXROUTE_CLASSIFIER_MODEL")
                .or(fc.llm.classifier_model)
                .unwrap_or_else(|| model.clone()),
            model,
            temperature: fc.llm.temperature.unwrap_or(0.7),
            classifier_temperature: fc.llm.classifier_temperature.unwrap_or(0.1),
            timeout: fc
                .llm
                .timeout_secs
                .map_or(crate::routing::classifier::DEFAULT_TIMEOUT, Duration::from_secs),
        };

        let workflows = WorkflowConfig {
            base_url: validate_url(
                "workflow",
                env("VOXROUTE_WORKFLOW_URL")
                    .or(fc.workflows.base_url)
                    .unwrap_or_else(|| DEFAULT_WORKFLOW_URL.to_string()),
            )?,
            api_key: env("VOXROUTE_WORKFLOW_API_KEY")
                .or(fc.workflows.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            timeout: fc.workflows.timeout_secs.map_or(
                crate::routing::registry::DEFAULT_HANDLER_TIMEOUT,
                Duration::from_secs,
            ),
        };

        let handlers = build_registry(&fc.handlers, workflows.timeout)?;

        let voice = VoiceConfig {
            stt_url: validate_url(
                "stt",
                env("VOXROUTE_STT_URL")
                    .or(fc.voice.stt_url)
                    .unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
            )?,
            stt_model: fc.voice.stt_model.unwrap_or_else(|| "whisper".to_string()),
            stt_language: fc.voice.stt_language.unwrap_or_else(|| "auto".to_string()),
            stt_timeout: Duration::from_secs(fc.voice.stt_timeout_secs.unwrap_or(120)),
            tts_url: validate_url(
                "tts",
                env("VOXROUTE_TTS_URL")
                    .or(fc.voice.tts_url)
                    .unwrap_or_else(|| DEFAULT_TTS_URL.to_string()),
            )?,
            tts_voice: env("VOXROUTE_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
            tts_reference_audio: fc.voice.tts_reference_audio,
            tts_timeout: Duration::from_secs(fc.voice.tts_timeout_secs.unwrap_or(60)),
        };

        Ok(Self {
            llm,
            workflows,
            handlers,
            voice,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                url: DEFAULT_LLM_URL.to_string(),
                model: DEFAULT_LLM_MODEL.to_string(),
                classifier_model: DEFAULT_LLM_MODEL.to_string(),
                temperature: 0.7,
                classifier_temperature: 0.1,
                timeout: crate::routing::classifier::DEFAULT_TIMEOUT,
            },
            workflows: WorkflowConfig {
                base_url: DEFAULT_WORKFLOW_URL.to_string(),
                api_key: None,
                timeout: crate::routing::registry::DEFAULT_HANDLER_TIMEOUT,
            },
            handlers: HandlerRegistry::builtin(),
            voice: VoiceConfig {
                stt_url: DEFAULT_STT_URL.to_string(),
                stt_model: "whisper".to_string(),
                stt_language: "auto".to_string(),
                stt_timeout: Duration::from_secs(120),
                tts_url: DEFAULT_TTS_URL.to_string(),
                tts_voice: DEFAULT_TTS_VOICE.to_string(),
                tts_reference_audio: None,
                tts_timeout: Duration::from_secs(60),
            },
        }
    }
}

/// Check that `value` parses as an absolute URL
fn validate_url(name: &str, value: String) -> Result<String> {
    url::Url::parse(&value)
        .map_err(|e| Error::Config(format!("invalid {name} URL {value:?}: {e}")))?;
    Ok(value)
}

/// Apply `[handlers.*]` overrides on top of the builtin table
fn build_registry(
    overrides: &std::collections::BTreeMap<String, file::HandlerFileConfig>,
    default_timeout: Duration,
) -> Result<HandlerRegistry> {
    let builtin = HandlerRegistry::builtin();
    let mut registry = HandlerRegistry::new();
    for category in builtin.configured() {
        if let Some(descriptor) = builtin.resolve(category) {
            registry = registry.with(category, descriptor.clone().with_timeout(default_timeout));
        }
    }

    for (key, handler) in overrides {
        let category = Category::from_label(key)
            .ok_or_else(|| Error::Config(format!("unknown handler category: {key}")))?;
        let timeout = handler
            .timeout_secs
            .map_or(default_timeout, Duration::from_secs);

        registry = match handler.kind.unwrap_or(HandlerFileKind::Workflow) {
            HandlerFileKind::None => registry.without(category),
            HandlerFileKind::Workflow => {
                let name = handler
                    .workflow
                    .clone()
                    .or_else(|| registry.resolve(category).and_then(workflow_name))
                    .unwrap_or_else(|| format!("{}_agent", category.label().to_ascii_lowercase()));
                registry.with(category, HandlerDescriptor::workflow(name).with_timeout(timeout))
            }
            HandlerFileKind::Assistant => {
                let prompt = handler
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| expert_prompt(category).to_string());
                let name = format!("{}_assistant", category.label().to_ascii_lowercase());
                registry.with(
                    category,
                    HandlerDescriptor::assistant(name, prompt).with_timeout(timeout),
                )
            }
        };
    }

    Ok(registry)
}

fn workflow_name(descriptor: &HandlerDescriptor) -> Option<String> {
    match &descriptor.kind {
        crate::routing::HandlerKind::Workflow { name } => Some(name.clone()),
        crate::routing::HandlerKind::Assistant { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;
    use crate::routing::HandlerKind;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(text: &str) -> ConfigFile {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(ConfigFile::default(), no_env).unwrap();
        assert_eq!(config.llm.url, DEFAULT_LLM_URL);
        assert_eq!(config.llm.classifier_model, DEFAULT_LLM_MODEL);
        assert_eq!(config.workflows.timeout, Duration::from_secs(120));
        assert!(config.handlers.resolve(Category::General).is_none());
        assert_eq!(
            config.handlers.configured(),
            vec![Category::Japanese, Category::HomeAssistant]
        );
        assert_eq!(config.voice.tts_voice, "sonnet29");

        let stock = Config::default();
        assert_eq!(config.llm.model, stock.llm.model);
        assert_eq!(config.voice.stt_timeout, stock.voice.stt_timeout);
        assert_eq!(config.handlers.configured(), stock.handlers.configured());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = parse(
            r#"
            [llm]
            url = "http://file-host:11434"
            model = "file-model"
            "#,
        );
        let env: HashMap<&str, &str> = [
            ("VOXROUTE_LLM_URL", "http://env-host:11434"),
            ("VOXROUTE_WORKFLOW_API_KEY", "secret-token"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::from_sources(fc, |k| env.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(config.llm.url, "http://env-host:11434");
        assert_eq!(config.llm.model, "file-model");
        assert_eq!(config.llm.classifier_model, "file-model");
        assert_eq!(
            config.workflows.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("secret-token".to_string())
        );
    }

    #[test]
    fn test_handler_overrides() {
        let fc = parse(
            r#"
            [workflows]
            timeout_secs = 45

            [handlers.general]
            kind = "assistant"

            [handlers.JAPANESE]
            kind = "none"

            [handlers.home]
            workflow = "ha_v2"
            timeout_secs = 10
            "#,
        );
        let config = Config::from_sources(fc, no_env).unwrap();

        assert!(config.handlers.resolve(Category::Japanese).is_none());

        let general = config.handlers.resolve(Category::General).unwrap();
        assert!(matches!(general.kind, HandlerKind::Assistant { .. }));
        assert_eq!(general.timeout, Duration::from_secs(45));

        let home = config.handlers.resolve(Category::HomeAssistant).unwrap();
        assert_eq!(
            home.kind,
            HandlerKind::Workflow {
                name: "ha_v2".to_string()
            }
        );
        assert_eq!(home.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_unknown_handler_category_is_rejected() {
        let fc = parse("[handlers.weather]\nworkflow = \"w\"\n");
        let err = Config::from_sources(fc, no_env).unwrap_err();
        assert!(err.to_string().contains("weather"));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let fc = parse("[voice]\nstt_url = \"not a url\"\n");
        assert!(matches!(
            Config::from_sources(fc, no_env),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[voice]\ntts_voice = \"alto\"").unwrap();

        let fc = file::load_config_file(Some(file.path())).unwrap();
        assert_eq!(fc.voice.tts_voice.as_deref(), Some("alto"));
    }

    #[test]
    fn test_load_explicit_file_errors() {
        let missing = std::path::Path::new("/nonexistent/voxroute.toml");
        assert!(matches!(
            file::load_config_file(Some(missing)),
            Err(Error::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[llm\nurl = 1").unwrap();
        assert!(matches!(
            file::load_config_file(Some(file.path())),
            Err(Error::Toml(_))
        ));
    }
}
