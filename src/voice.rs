//! Voice capabilities
//!
//! Optional speech-to-text and text-to-speech clients for the API layer.
//! Both are plain request/response wrappers; audio encoding details stay
//! with the upstream services. Failures surface as `VoiceError` so the
//! API can answer with a clean error envelope.

use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{OrchestrationError, Result};

/// Used when the caller does not pick a voice.
pub const DEFAULT_VOICE_ID: &str = "en-US-natalie";

const TRANSCRIPTION_ENDPOINT: &str = "https://api.groq.com/openai/v1/audio/transcriptions";
const TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

const SPEECH_ENDPOINT: &str = "https://api.murf.ai/v1/speech/generate";

fn pooled_client() -> Client {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
}

//
// ================= Transcription =================
//

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style transcription over multipart upload.
pub struct TranscriptionClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl TranscriptionClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: pooled_client(),
            api_key,
            endpoint: TRANSCRIPTION_ENDPOINT.to_string(),
        }
    }

    /// Turn recorded audio into query text.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String> {
        let audio_len = audio.len();
        let part = multipart::Part::bytes(audio)
            .file_name("query.wav")
            .mime_str("audio/wav")
            .map_err(|e| OrchestrationError::VoiceError(format!("invalid audio payload: {}", e)))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL)
            .text("language", "en");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::VoiceError(format!("transcription request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "Transcription service rejected the upload");
            return Err(OrchestrationError::VoiceError(format!(
                "transcription service returned {}",
                status
            )));
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| {
            OrchestrationError::VoiceError(format!("transcription response unreadable: {}", e))
        })?;

        debug!(audio_bytes = audio_len, transcript_chars = parsed.text.len(), "Audio transcribed");
        Ok(parsed.text.trim().to_string())
    }
}

//
// ================= Speech Synthesis =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    audio_file: String,
}

/// Text-to-speech client. The generation endpoint answers with an audio
/// URL; fetching the bytes is a second hop.
pub struct SpeechClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl SpeechClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: pooled_client(),
            api_key,
            endpoint: SPEECH_ENDPOINT.to_string(),
        }
    }

    /// Synthesize `text` and return the audio bytes.
    pub async fn speak(&self, text: &str, voice_id: Option<&str>) -> Result<Vec<u8>> {
        let voice = voice_id.unwrap_or(DEFAULT_VOICE_ID);
        let request = SpeechRequest { text, voice_id: voice };

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::VoiceError(format!("speech request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, voice, "Speech service rejected the request");
            return Err(OrchestrationError::VoiceError(format!(
                "speech service returned {}",
                status
            )));
        }

        let parsed: SpeechResponse = response.json().await.map_err(|e| {
            OrchestrationError::VoiceError(format!("speech response unreadable: {}", e))
        })?;

        let audio = self
            .client
            .get(&parsed.audio_file)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::VoiceError(format!("audio download failed: {}", e))
            })?;

        let status = audio.status();
        if !status.is_success() {
            return Err(OrchestrationError::VoiceError(format!(
                "audio download returned {}",
                status
            )));
        }

        let bytes = audio.bytes().await.map_err(|e| {
            OrchestrationError::VoiceError(format!("audio download truncated: {}", e))
        })?;

        debug!(voice, audio_bytes = bytes.len(), "Speech synthesized");
        Ok(bytes.to_vec())
    }
}
