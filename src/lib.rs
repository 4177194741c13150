//! Banter - Hands-free voice conversation loop for AI assistants
//!
//! This library provides the core functionality for the assistant:
//! - Voice processing (silence gating, capture, STT, TTS, playback)
//! - Knowledge retrieval over locally ingested documents
//! - Streaming response generation with sentence-level speech
//! - The conversation loop tying the stages together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Microphone                         │
//! │   Recorder  │  SilenceGate  │  peak normalization    │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                 Conversation Loop                     │
//! │   Transcriber  │  ContextRetriever  │  Streamer      │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │                    Speakers                           │
//! │   SentenceSegmenter  │  SpeechSink  │  playback      │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod knowledge;
pub mod segment;
pub mod voice;

pub use chat::{ChatGenerator, ChatMessage, FragmentStream, OpenAiChat, ResponseStreamer};
pub use config::Config;
pub use conversation::{ConversationLoop, CycleOutcome, SkipReason};
pub use error::{Error, Result};
pub use knowledge::{ContextRetriever, Embedder, SimilaritySearch, StoredChunk, VectorStore};
pub use segment::SentenceSegmenter;
pub use voice::{
    AudioCapture, AudioOutput, AudioPlayback, OpenAiSpeech, OpenAiWhisper, Recorder, SilenceGate,
    SpeechSink, SpeechToText, TextToSpeech, Transcriber, TranscriptFilter,
};
