//! TOML configuration file loading
//!
//! Supports `~/.config/voxroute/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Workflow orchestration service
    #[serde(default)]
    pub workflows: WorkflowsFileConfig,

    /// Per-category handler overrides, keyed by category label
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerFileConfig>,

    /// Speech services
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Ollama server URL (e.g. "http://localhost:11434")
    pub url: Option<String>,

    /// Model used by direct assistants (e.g. "qwen2.5:7b")
    pub model: Option<String>,

    /// Model used for classification; defaults to `model`
    pub classifier_model: Option<String>,

    /// Assistant sampling temperature
    pub temperature: Option<f32>,

    /// Classifier sampling temperature
    pub classifier_temperature: Option<f32>,

    /// Classification time budget in seconds
    pub timeout_secs: Option<u64>,
}

/// Workflow orchestration service configuration
#[derive(Debug, Default, Deserialize)]
pub struct WorkflowsFileConfig {
    /// Service base URL
    pub base_url: Option<String>,

    /// Bearer token sent with workflow runs
    pub api_key: Option<String>,

    /// Default handler time budget in seconds
    pub timeout_secs: Option<u64>,
}

/// How a category is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerFileKind {
    /// Remote workflow
    Workflow,
    /// Direct language model assistant
    Assistant,
    /// Deliberately unconfigured
    None,
}

/// One `[handlers.<category>]` table
#[derive(Debug, Default, Deserialize)]
pub struct HandlerFileConfig {
    /// Handler kind; defaults to `workflow`
    pub kind: Option<HandlerFileKind>,

    /// Workflow name for `workflow` handlers
    pub workflow: Option<String>,

    /// System prompt for `assistant` handlers
    pub system_prompt: Option<String>,

    /// Per-handler time budget in seconds
    pub timeout_secs: Option<u64>,
}

/// Speech services configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Transcription server URL
    pub stt_url: Option<String>,

    /// Transcription model (e.g. "whisper")
    pub stt_model: Option<String>,

    /// Transcription language, or "auto"
    pub stt_language: Option<String>,

    /// Transcription time budget in seconds
    pub stt_timeout_secs: Option<u64>,

    /// Speech synthesis server URL
    pub tts_url: Option<String>,

    /// Speaker identifier
    pub tts_voice: Option<String>,

    /// Reference audio path for voice cloning
    pub tts_reference_audio: Option<String>,

    /// Synthesis time budget in seconds
    pub tts_timeout_secs: Option<u64>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path
/// is tried and any problem falls back to defaults with a warning.
///
/// # Errors
///
/// Returns error if an explicit path cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    Ok(match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    })
}

/// Return the config file path: `~/.config/voxroute/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "voxroute")
        .map(|d| d.config_dir().join("config.toml"))
}
