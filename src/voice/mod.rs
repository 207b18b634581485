//! Speech services
//!
//! HTTP clients for a self-hosted transcription server and a Fish Speech
//! synthesis server. Both keep a per-instance cache of their server's
//! capability listing.

mod stt;
mod tts;

use std::time::Duration;

pub use stt::{AudioInfo, SpeechToText, Transcription, inspect_wav};
pub use tts::{TextToSpeech, VoiceInfo};

/// Time budget for health checks and capability listings
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Try `urls` in order, moving on only when a request cannot be sent
async fn check_health(client: &reqwest::Client, urls: &[String]) -> bool {
    for url in urls {
        match client.get(url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => return true,
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "health check rejected");
                return false;
            }
            Err(e) => tracing::debug!(url = %url, error = %e, "health check failed"),
        }
    }
    false
}
