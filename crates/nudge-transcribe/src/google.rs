//! Google Web Speech API transcription adapter.
//!
//! Thin HTTP client over the recognize endpoint: voice note bytes are
//! posted with a language hint and an API key, and the response is a
//! stream of JSON lines whose first non-empty `result` carries the
//! recognized alternatives. Response parsing is kept in a pure function
//! so it can be tested without a network.

use serde_json::Value;
use tracing::debug;

use nudge_core::config::TranscribeConfig;
use nudge_core::error::NudgeError;

use crate::{TranscribeError, TranscriptionService};

/// Transcription service backed by the Google Web Speech API.
pub struct GoogleTranscriptionService {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GoogleTranscriptionService {
    /// Build the service from config.
    ///
    /// Fails when no API key is configured; callers fall back to the mock
    /// service in that case.
    pub fn new(config: &TranscribeConfig) -> Result<Self, NudgeError> {
        if config.api_key.trim().is_empty() {
            return Err(NudgeError::Config(
                "no speech API key configured; set transcribe.api_key".to_string(),
            ));
        }
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        })
    }
}

impl TranscriptionService for GoogleTranscriptionService {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::Unintelligible);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("client", "chromium"),
                ("lang", language),
                ("key", self.api_key.as_str()),
            ])
            .header("Content-Type", "audio/x-flac; rate=16000")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| TranscribeError::Processing(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscribeError::Processing(format!(
                "speech request failed ({status})"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscribeError::Processing(format!("speech response unreadable: {e}")))?;

        let text = parse_transcript(&body)?;
        debug!(
            audio_bytes = audio.len(),
            text_len = text.len(),
            language,
            "Voice note transcribed"
        );
        Ok(text)
    }
}

/// Parse the recognize endpoint's line-delimited JSON response.
///
/// The endpoint streams one JSON object per line; the first line is
/// typically an empty `{"result":[]}` placeholder. No line with a
/// non-empty result means the speech was not understood.
pub fn parse_transcript(body: &str) -> Result<String, TranscribeError> {
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(results) = value.get("result").and_then(Value::as_array) else {
            continue;
        };
        for result in results {
            if let Some(transcript) = result
                .get("alternative")
                .and_then(Value::as_array)
                .and_then(|alternatives| alternatives.first())
                .and_then(|alternative| alternative.get("transcript"))
                .and_then(Value::as_str)
            {
                return Ok(transcript.to_string());
            }
        }
    }
    Err(TranscribeError::Unintelligible)
}
