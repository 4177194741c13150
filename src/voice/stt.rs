//! Speech-to-text transcription and transcript filtering

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FilterSettings;
use crate::voice::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// One recognized span of a transcription
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub text: String,
    pub no_speech_prob: f32,
}

/// Raw transcription output before filtering
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Segment texts joined by single spaces, trimmed
    #[must_use]
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Mean no-speech probability across segments
    ///
    /// An empty transcript counts as certain non-speech.
    #[must_use]
    pub fn no_speech_prob(&self) -> f32 {
        if self.segments.is_empty() {
            return 1.0;
        }
        let sum: f32 = self.segments.iter().map(|s| s.no_speech_prob).sum();
        #[allow(clippy::cast_precision_loss)]
        {
            sum / self.segments.len() as f32
        }
    }
}

/// Transcription backend
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe WAV audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the backend request fails
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcript>;
}

/// Response from `OpenAI` Whisper transcription API (`verbose_json`)
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(serde::Deserialize)]
struct WhisperSegment {
    text: String,
    no_speech_prob: f32,
}

/// Transcribes speech via `OpenAI` Whisper
pub struct OpenAiWhisper {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: String,
}

impl OpenAiWhisper {
    /// Create a new Whisper transcription client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String, language: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            language,
        })
    }
}

#[async_trait]
impl SpeechToText for OpenAiWhisper {
    async fn transcribe(&self, wav: &[u8]) -> Result<Transcript> {
        tracing::debug!(audio_bytes = wav.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let mut segments: Vec<TranscriptSegment> = result
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                text: s.text,
                no_speech_prob: s.no_speech_prob,
            })
            .collect();

        // Some responses omit segment detail; fall back to the full text
        if segments.is_empty() && !result.text.trim().is_empty() {
            segments.push(TranscriptSegment {
                text: result.text,
                no_speech_prob: 0.0,
            });
        }

        Ok(Transcript { segments })
    }
}

/// Discards transcripts that are noise rather than speech
///
/// Whisper hallucinates short filler phrases on near-silent audio, so
/// low-confidence, too-short, and known-filler outputs are all dropped.
pub struct TranscriptFilter {
    min_chars: usize,
    no_speech_threshold: f32,
    discard_phrases: Vec<String>,
}

impl TranscriptFilter {
    #[must_use]
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            min_chars: settings.min_chars,
            no_speech_threshold: settings.no_speech_threshold,
            discard_phrases: settings
                .discard_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    /// Reduce a transcript to a usable utterance
    ///
    /// Returns the empty string when the transcript is noise.
    #[must_use]
    pub fn clean(&self, transcript: &Transcript) -> String {
        let no_speech = transcript.no_speech_prob();
        if no_speech > self.no_speech_threshold {
            tracing::debug!(no_speech, "discarding low-confidence transcript");
            return String::new();
        }

        let text = transcript.text();
        if text.chars().count() < self.min_chars {
            tracing::debug!(text = %text, "discarding short transcript");
            return String::new();
        }

        let lowered = text.to_lowercase();
        if self.discard_phrases.iter().any(|p| *p == lowered) {
            tracing::debug!(text = %text, "discarding hallucinated filler");
            return String::new();
        }

        text
    }
}

/// Turns one captured window into a clean utterance
///
/// Every failure maps to an empty utterance so a single bad window can
/// never stop the conversation loop.
pub struct Transcriber {
    backend: Arc<dyn SpeechToText>,
    filter: TranscriptFilter,
}

impl Transcriber {
    #[must_use]
    pub fn new(backend: Arc<dyn SpeechToText>, filter: TranscriptFilter) -> Self {
        Self { backend, filter }
    }

    /// Transcribe captured samples into filtered text
    ///
    /// Returns the empty string when the window carries no usable speech
    /// or the backend fails.
    pub async fn transcribe(&self, samples: &[f32]) -> String {
        let wav = match samples_to_wav(samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "WAV encoding failed");
                return String::new();
            }
        };

        let transcript = match self.backend.transcribe(&wav).await {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return String::new();
            }
        };

        let text = self.filter.clean(&transcript);
        if !text.is_empty() {
            tracing::info!(transcript = %text, "transcription complete");
        }
        text
    }
}
