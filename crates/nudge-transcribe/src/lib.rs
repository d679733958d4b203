//! Nudge Transcribe crate - speech-to-text collaborator contract.
//!
//! Provides a trait-based abstraction for transcribing voice notes to
//! text, a branchable failure type distinguishing "could not understand"
//! from any other processing failure, a Google Web Speech adapter, and a
//! mock implementation for development and tests.

use std::future::Future;

use thiserror::Error;

pub mod google;

pub use google::GoogleTranscriptionService;

// =============================================================================
// Failure kinds
// =============================================================================

/// Why a transcription attempt produced no text.
///
/// Callers branch on the kind: `Unintelligible` is user-actionable (ask
/// them to repeat), `Processing` is not (tell them to try again later).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscribeError {
    #[error("speech could not be understood")]
    Unintelligible,

    #[error("transcription processing failed: {0}")]
    Processing(String),
}

// =============================================================================
// Trait
// =============================================================================

/// Service for transcribing recorded voice notes to text.
///
/// Implementations accept the raw encoded audio bytes of a voice note
/// (e.g. OGG/Opus from a chat transport) and a language hint.
pub trait TranscriptionService: Send + Sync {
    /// Transcribe a voice note into text.
    ///
    /// # Arguments
    /// * `audio` - Encoded audio bytes as downloaded from the transport.
    /// * `language` - Language hint (e.g. "fa-IR").
    fn transcribe(
        &self,
        audio: &[u8],
        language: &str,
    ) -> impl Future<Output = Result<String, TranscribeError>> + Send;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock transcription service that returns a fixed transcript.
///
/// Used for development and tests without calling a real recognizer.
/// Empty audio is reported as unintelligible.
#[derive(Debug, Clone)]
pub struct MockTranscriptionService {
    transcript: String,
}

impl Default for MockTranscriptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscriptionService {
    pub fn new() -> Self {
        Self {
            transcript: "[mock transcription]".to_string(),
        }
    }

    /// Fix the transcript returned for every non-empty voice note.
    pub fn with_transcript(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl TranscriptionService for MockTranscriptionService {
    async fn transcribe(&self, audio: &[u8], language: &str) -> Result<String, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::Unintelligible);
        }

        tracing::debug!(
            audio_bytes = audio.len(),
            language = language,
            "Mock transcription generated"
        );

        Ok(self.transcript.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================
