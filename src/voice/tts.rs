//! Text-to-speech (TTS) client

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::check_health;
use crate::{Error, Result};

/// One voice offered by the synthesis server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    /// Voice name
    #[serde(default)]
    pub name: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,
}

fn fallback_voices() -> BTreeMap<String, VoiceInfo> {
    BTreeMap::from([(
        "default".to_string(),
        VoiceInfo {
            name: "default".to_string(),
            description: "Default Fish Speech voice".to_string(),
        },
    )])
}

/// Synthesis request body
#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    speaker: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_audio: Option<&'a str>,
}

/// Synthesizes speech through a Fish Speech server
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    speaker: String,
    reference_audio: Option<String>,
    voices: RwLock<Option<BTreeMap<String, VoiceInfo>>>,
}

impl std::fmt::Debug for TextToSpeech {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextToSpeech")
            .field("base_url", &self.base_url)
            .field("speaker", &self.speaker)
            .finish_non_exhaustive()
    }
}

impl TextToSpeech {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        speaker: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            speaker: speaker.into(),
            reference_audio: None,
            voices: RwLock::new(None),
        })
    }

    /// Clone the speaker from a reference recording on the server
    #[must_use]
    pub fn with_reference_audio(mut self, path: impl Into<String>) -> Self {
        self.reference_audio = Some(path.into());
        self
    }

    /// Synthesize text to audio bytes
    ///
    /// # Returns
    ///
    /// WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the text is blank or synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let request = TtsRequest {
            text,
            speaker: &self.speaker,
            reference_audio: self.reference_audio.as_deref(),
        };

        tracing::debug!(chars = text.len(), speaker = %self.speaker, "starting synthesis");

        let response = self
            .client
            .post(format!("{}/v1/tts", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "synthesis request failed");
                Error::Tts(format!("connection to speech server failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech server error");
            return Err(Error::Tts(format!("speech server error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::info!(audio_bytes = audio.len(), "synthesis complete");
        Ok(audio.to_vec())
    }

    /// Synthesize text and write the audio to `path`
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the file cannot be written
    pub async fn synthesize_to_file(&self, text: &str, path: &Path) -> Result<()> {
        let audio = self.synthesize(text).await?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, audio).await?;
        Ok(())
    }

    /// Voices the server offers, keyed by id
    ///
    /// Fetched once per instance; falls back to a single default voice.
    pub async fn voices(&self) -> BTreeMap<String, VoiceInfo> {
        if let Some(cached) = self.voices.read().await.as_ref() {
            return cached.clone();
        }

        let voices = self.fetch_voices().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "voice listing unavailable, using fallback");
            fallback_voices()
        });

        *self.voices.write().await = Some(voices.clone());
        voices
    }

    /// Drop the cached voice listing
    pub async fn clear_cache(&self) {
        *self.voices.write().await = None;
    }

    async fn fetch_voices(&self) -> Result<BTreeMap<String, VoiceInfo>> {
        let response = self
            .client
            .get(format!("{}/voices", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Tts(format!(
                "voice listing returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Check whether the server answers `/` or `/json`
    pub async fn is_available(&self) -> bool {
        check_health(
            &self.client,
            &[
                format!("{}/", self.base_url),
                format!("{}/json", self.base_url),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(url: &str) -> TextToSpeech {
        TextToSpeech::new(url, "sonnet29", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_synthesize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tts"))
            .and(body_json(serde_json::json!({
                "text": "Kitchen light is now on",
                "speaker": "sonnet29",
                "reference_audio": "/refs/sonnet29.wav"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF0000WAVE".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let tts = client(&server.uri()).with_reference_audio("/refs/sonnet29.wav");
        let audio = tts.synthesize("Kitchen light is now on").await.unwrap();
        assert_eq!(audio, b"RIFF0000WAVE");
    }

    #[tokio::test]
    async fn test_synthesize_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RIFF".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("response.wav");
        client(&server.uri())
            .synthesize_to_file("hello", &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"RIFF");
    }

    #[tokio::test]
    async fn test_synthesize_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
            .mount(&server)
            .await;

        let tts = client(&server.uri());
        assert!(tts.synthesize("   ").await.is_err());

        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(matches!(err, Error::Tts(_)));
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn test_voices_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sonnet29": {"name": "Sonnet 29", "description": "trained voice"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tts = client(&server.uri());
        let voices = tts.voices().await;
        assert_eq!(voices["sonnet29"].name, "Sonnet 29");
        assert_eq!(tts.voices().await, voices);
    }

    #[tokio::test]
    async fn test_voices_fallback() {
        let voices = client("http://127.0.0.1:9").voices().await;
        assert_eq!(voices, fallback_voices());
    }

    #[tokio::test]
    async fn test_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(client(&server.uri()).is_available().await);
        assert!(!client("http://127.0.0.1:9").is_available().await);
    }
}
