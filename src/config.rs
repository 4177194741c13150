//! Configuration for the banter assistant
//!
//! Settings come from an optional TOML file (explicit `--config` path or the
//! platform config directory) with environment-provided credentials layered
//! on top. A missing or empty `OPENAI_API_KEY` is fatal at startup.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable holding the API credential for all hosted backends
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the transcription/synthesis/embedding/chat backends
    pub api_key: String,

    /// System persona for generated replies
    pub persona: String,

    /// Chat model used for reply generation
    pub chat_model: String,

    /// Root directory for persisted and transient assistant data
    pub data_dir: PathBuf,

    /// Audio capture and synthesis settings
    pub voice: VoiceSettings,

    /// Transcript filtering settings
    pub filter: FilterSettings,

    /// Context retrieval settings
    pub retrieval: RetrievalSettings,

    /// Utterances that end the conversation (lowercase, exact match)
    pub exit_phrases: Vec<String>,
}

/// Audio capture and synthesis settings
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    /// Transcription model
    pub stt_model: String,
    /// Transcription language pin
    pub stt_language: String,
    /// Synthesis model
    pub tts_model: String,
    /// Synthesis voice
    pub tts_voice: String,
    /// Synthesis speed multiplier
    pub tts_speed: f32,
    /// Capture window length in seconds
    pub record_secs: u64,
    /// RMS threshold below which a window counts as silence
    pub silence_threshold: f32,
}

/// Transcript filtering settings
#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Minimum transcript length in characters
    pub min_chars: usize,
    /// No-speech probability above which a transcript is discarded
    pub no_speech_threshold: f32,
    /// Known hallucination phrases, discarded case-insensitively
    pub discard_phrases: Vec<String>,
}

/// Context retrieval settings
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Number of passages to retrieve per query
    pub top_k: usize,
    /// Embedding model for queries and ingestion
    pub embedding_model: String,
    /// What to do when the retrieval backend fails mid-conversation
    pub on_error: RetrievalErrorPolicy,
}

/// Policy applied when context retrieval fails during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalErrorPolicy {
    /// Log the failure and generate with empty context
    ProceedWithoutContext,
    /// Abort the cycle and return to listening
    AbortCycle,
}

/// On-disk configuration file shape; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    persona: Option<String>,
    chat_model: Option<String>,
    data_dir: Option<PathBuf>,
    exit_phrases: Option<Vec<String>>,
    #[serde(default)]
    voice: FileVoice,
    #[serde(default)]
    filter: FileFilter,
    #[serde(default)]
    retrieval: FileRetrieval,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileVoice {
    stt_model: Option<String>,
    stt_language: Option<String>,
    tts_model: Option<String>,
    tts_voice: Option<String>,
    tts_speed: Option<f32>,
    record_secs: Option<u64>,
    silence_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileFilter {
    min_chars: Option<usize>,
    no_speech_threshold: Option<f32>,
    discard_phrases: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRetrieval {
    top_k: Option<usize>,
    embedding_model: Option<String>,
    on_error: Option<RetrievalErrorPolicy>,
}

impl Config {
    /// Load configuration from the given path (or the default location) and
    /// the environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file is unreadable or invalid, if the
    /// API key is missing from the environment, or if validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let contents = std::fs::read_to_string(p).map_err(|e| {
                    Error::Config(format!("cannot read config file {}: {e}", p.display()))
                })?;
                toml::from_str::<FileConfig>(&contents)?
            }
            None => Self::default_config_path()
                .filter(|p| p.exists())
                .map(|p| -> Result<FileConfig> {
                    let contents = std::fs::read_to_string(&p)?;
                    tracing::debug!(path = %p.display(), "loaded config file");
                    Ok(toml::from_str(&contents)?)
                })
                .transpose()?
                .unwrap_or_default(),
        };

        let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "{API_KEY_ENV} is not set; the assistant cannot reach its backends"
            )));
        }

        let data_dir = match file.data_dir {
            Some(dir) => dir,
            None => Self::default_data_dir()?,
        };

        let config = Self {
            api_key,
            persona: file.persona.unwrap_or_else(|| {
                "You are a helpful, friendly voice assistant. \
                 Answer naturally and concisely for spoken output."
                    .to_string()
            }),
            chat_model: file.chat_model.unwrap_or_else(|| "gpt-4o".to_string()),
            data_dir,
            voice: VoiceSettings {
                stt_model: file.voice.stt_model.unwrap_or_else(|| "whisper-1".to_string()),
                stt_language: file.voice.stt_language.unwrap_or_else(|| "en".to_string()),
                tts_model: file.voice.tts_model.unwrap_or_else(|| "tts-1".to_string()),
                tts_voice: file.voice.tts_voice.unwrap_or_else(|| "alloy".to_string()),
                tts_speed: file.voice.tts_speed.unwrap_or(1.0),
                record_secs: file.voice.record_secs.unwrap_or(5),
                silence_threshold: file.voice.silence_threshold.unwrap_or(0.003),
            },
            filter: FilterSettings {
                min_chars: file.filter.min_chars.unwrap_or(3),
                no_speech_threshold: file.filter.no_speech_threshold.unwrap_or(0.6),
                discard_phrases: file.filter.discard_phrases.unwrap_or_else(|| {
                    Vec::from(
                        ["you", "you.", "ok", "okay", "thanks", "thank you", "hello", "hi"]
                            .map(String::from),
                    )
                }),
            },
            retrieval: RetrievalSettings {
                top_k: file.retrieval.top_k.unwrap_or(3),
                embedding_model: file
                    .retrieval
                    .embedding_model
                    .unwrap_or_else(|| "text-embedding-3-small".to_string()),
                on_error: file
                    .retrieval
                    .on_error
                    .unwrap_or(RetrievalErrorPolicy::ProceedWithoutContext),
            },
            exit_phrases: file
                .exit_phrases
                .unwrap_or_else(|| Vec::from(["exit", "quit", "stop"].map(String::from))),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.voice.record_secs == 0 || self.voice.record_secs > 30 {
            return Err(Error::Config(format!(
                "voice.record_secs must be between 1 and 30, got {}",
                self.voice.record_secs
            )));
        }
        if self.voice.silence_threshold <= 0.0 {
            return Err(Error::Config(
                "voice.silence_threshold must be positive".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed must be between 0.25 and 4.0, got {}",
                self.voice.tts_speed
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Create the data, scratch, and documents directories
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be created
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.data_dir.clone(), self.scratch_dir(), self.documents_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("cannot create directory {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    /// Directory for transient playback artifacts
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }

    /// Directory scanned for documents by the ingest command
    #[must_use]
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    /// Path of the persisted knowledge store
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.json")
    }

    fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "banter").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn default_data_dir() -> Result<PathBuf> {
        ProjectDirs::from("", "", "banter")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| Error::Config("could not determine a data directory".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(contents: &str) -> FileConfig {
        toml::from_str(contents).expect("valid config")
    }

    #[test]
    fn file_config_all_fields_optional() {
        let file = parse("");
        assert!(file.persona.is_none());
        assert!(file.voice.record_secs.is_none());
        assert!(file.retrieval.on_error.is_none());
    }

    #[test]
    fn file_config_parses_sections() {
        let file = parse(
            r#"
            persona = "You are terse."
            chat_model = "gpt-4o-mini"

            [voice]
            record_secs = 6
            silence_threshold = 0.01

            [retrieval]
            top_k = 5
            on_error = "abort_cycle"
            "#,
        );

        assert_eq!(file.persona.as_deref(), Some("You are terse."));
        assert_eq!(file.voice.record_secs, Some(6));
        assert_eq!(file.retrieval.top_k, Some(5));
        assert_eq!(
            file.retrieval.on_error,
            Some(RetrievalErrorPolicy::AbortCycle)
        );
    }

    #[test]
    fn file_config_rejects_unknown_fields() {
        let result = toml::from_str::<FileConfig>("wake_word = \"hey\"");
        assert!(result.is_err());
    }
}
