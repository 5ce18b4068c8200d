use crate::deepgram_types::PrerecordedResponse;
use crate::error::CollaboratorError;

use async_trait::async_trait;
use tracing::debug;

const LISTEN_URL: &str = "https://api.deepgram.com/v1/listen?punctuate=true&smart_format=true";

/// Speech-to-text for a finished call recording.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, recording_url: &str) -> Result<String, CollaboratorError>;
}

/// Fetches the recorded audio, then sends the bytes to Deepgram.
pub struct DeepgramTranscriber {
    http_client: reqwest::Client,
    api_key: String,
}

impl DeepgramTranscriber {
    pub fn new(http_client: reqwest::Client, api_key: String) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    async fn fetch_audio(&self, recording_url: &str) -> Result<Vec<u8>, CollaboratorError> {
        let resp = self
            .http_client
            .get(recording_url)
            .send()
            .await
            .map_err(CollaboratorError::http("recording"))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Status {
                service: "recording",
                status: resp.status(),
            });
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(CollaboratorError::http("recording"))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, recording_url: &str) -> Result<String, CollaboratorError> {
        let audio = self.fetch_audio(recording_url).await?;
        debug!(bytes = audio.len(), "fetched recording");
        let resp = self
            .http_client
            .post(LISTEN_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
            .header(reqwest::header::CONTENT_TYPE, "audio/mpeg")
            .body(audio)
            .send()
            .await
            .map_err(CollaboratorError::http("deepgram"))?;
        if !resp.status().is_success() {
            return Err(CollaboratorError::Status {
                service: "deepgram",
                status: resp.status(),
            });
        }
        let resp = resp
            .json::<PrerecordedResponse>()
            .await
            .map_err(|e| CollaboratorError::malformed("deepgram", e.to_string()))?;
        resp.transcript()
            .map(|t| t.trim().to_string())
            .ok_or_else(|| CollaboratorError::malformed("deepgram", "no transcript alternatives"))
    }
}
