//! Speech-to-text (STT) client

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{HEALTH_TIMEOUT, check_health};
use crate::{Error, Result};

/// Languages assumed when the server cannot list its own
const FALLBACK_LANGUAGES: [&str; 20] = [
    "auto", "en", "es", "fr", "de", "it", "pt", "ru", "ja", "ko", "zh", "ar", "hi", "tr", "pl",
    "nl", "sv", "da", "no", "fi",
];

/// Transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Recognized text
    #[serde(default)]
    pub text: String,

    /// Language the server detected
    #[serde(default)]
    pub language: Option<String>,

    /// Server confidence, if reported
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Format details of a WAV file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    /// Samples per second
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Playback length
    pub duration: Duration,
}

/// Read the header of a WAV file
///
/// # Errors
///
/// Returns error if the file is not a readable WAV file
pub fn inspect_wav(path: &Path) -> Result<AudioInfo> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let frames = reader.duration();

    Ok(AudioInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration: Duration::from_secs_f64(f64::from(frames) / f64::from(spec.sample_rate.max(1))),
    })
}

/// Transcribes audio files through an OpenAI-compatible transcription server
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    model: String,
    language: String,
    temperature: f32,
    languages: RwLock<Option<Vec<String>>>,
}

impl std::fmt::Debug for SpeechToText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechToText")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl SpeechToText {
    /// Create a client for the server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            language: language.into(),
            temperature: 0.0,
            languages: RwLock::new(None),
        })
    }

    /// Transcribe an audio file
    ///
    /// WAV files are inspected locally first so a corrupt file fails
    /// without a round trip.
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or unreadable, or the server
    /// rejects the request
    pub async fn transcribe(&self, path: &Path) -> Result<Transcription> {
        if !path.is_file() {
            return Err(Error::Stt(format!(
                "audio file not found: {}",
                path.display()
            )));
        }

        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if is_wav {
            let info = inspect_wav(path)?;
            tracing::debug!(
                sample_rate = info.sample_rate,
                channels = info.channels,
                duration_ms = info.duration.as_millis(),
                "inspected WAV input"
            );
        }

        let audio = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "audio".to_string(), |n| n.to_string_lossy().into_owned());
        let mime = if is_wav { "audio/wav" } else { "application/octet-stream" };

        tracing::debug!(audio_bytes = audio.len(), file = %file_name, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name(file_name)
                    .mime_str(mime)
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("language", self.language.clone())
            .text("model", self.model.clone())
            .text("temperature", self.temperature.to_string())
            .text("response_format", "json")
            .text("timestamp_granularities[]", "segment");

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                Error::Stt(format!("connection to transcription server failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription server error");
            return Err(Error::Stt(format!(
                "transcription server error {status}: {body}"
            )));
        }

        let transcription: Transcription = response
            .json()
            .await
            .map_err(|e| Error::Stt(format!("malformed transcription response: {e}")))?;

        tracing::info!(
            chars = transcription.text.len(),
            language = ?transcription.language,
            "transcription complete"
        );

        Ok(transcription)
    }

    /// Languages the server accepts
    ///
    /// Fetched once per instance; a server that cannot list them yields a
    /// fixed set of common languages.
    pub async fn supported_languages(&self) -> Vec<String> {
        if let Some(cached) = self.languages.read().await.as_ref() {
            return cached.clone();
        }

        let languages = self.fetch_languages().await.unwrap_or_else(|e| {
            tracing::debug!(error = %e, "language listing unavailable, using fallback");
            FALLBACK_LANGUAGES.iter().map(ToString::to_string).collect()
        });

        *self.languages.write().await = Some(languages.clone());
        languages
    }

    /// Drop the cached language list
    pub async fn clear_cache(&self) {
        *self.languages.write().await = None;
    }

    async fn fetch_languages(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/languages", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Stt(format!(
                "language listing returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Check whether the server answers `/health` or `/`
    pub async fn is_available(&self) -> bool {
        check_health(
            &self.client,
            &[
                format!("{}/health", self.base_url),
                format!("{}/", self.base_url),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn write_wav(dir: &Path, seconds: u32) -> std::path::PathBuf {
        let path = dir.join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..(16_000 * seconds) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn client(url: &str) -> SpeechToText {
        SpeechToText::new(url, "whisper", "auto", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_inspect_wav() {
        let dir = tempfile::tempdir().unwrap();
        let info = inspect_wav(&write_wav(dir.path(), 2)).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration, Duration::from_secs(2));
    }

    #[test]
    fn test_inspect_wav_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav file").unwrap();
        assert!(matches!(inspect_wav(&path), Err(Error::Audio(_))));
    }

    #[tokio::test]
    async fn test_transcribe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "turn on the kitchen light",
                "language": "en"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = client(&server.uri())
            .transcribe(&write_wav(dir.path(), 1))
            .await
            .unwrap();

        assert_eq!(result.text, "turn on the kitchen light");
        assert_eq!(result.language.as_deref(), Some("en"));
        assert_eq!(result.confidence, None);
    }

    #[tokio::test]
    async fn test_transcribe_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = client(&server.uri())
            .transcribe(&write_wav(dir.path(), 1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_transcribe_missing_file() {
        let err = client("http://127.0.0.1:9")
            .transcribe(Path::new("/nonexistent/clip.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stt(_)));
    }

    #[tokio::test]
    async fn test_languages_cached_until_cleared() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(["en", "ja"]))
            .expect(2)
            .mount(&server)
            .await;

        let stt = client(&server.uri());
        assert_eq!(stt.supported_languages().await, vec!["en", "ja"]);
        assert_eq!(stt.supported_languages().await, vec!["en", "ja"]);

        stt.clear_cache().await;
        assert_eq!(stt.supported_languages().await, vec!["en", "ja"]);
    }

    #[tokio::test]
    async fn test_languages_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let languages = client(&server.uri()).supported_languages().await;
        assert_eq!(languages.len(), FALLBACK_LANGUAGES.len());
        assert_eq!(languages[0], "auto");
    }

    #[tokio::test]
    async fn test_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        assert!(client(&server.uri()).is_available().await);
        assert!(!client("http://127.0.0.1:9").is_available().await);
    }

    #[tokio::test]
    async fn test_is_available_rejects_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(!client(&server.uri()).is_available().await);
    }
}
