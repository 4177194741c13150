//! Voice processing module
//!
//! Handles audio capture, silence gating, transcription, speech
//! synthesis, and serialized playback.

mod capture;
mod gate;
mod playback;
mod sink;
mod stt;
mod tts;

pub use capture::{AudioCapture, Recorder, SAMPLE_RATE, normalize_peak, samples_to_wav};
pub use gate::{SilenceGate, rms};
pub use playback::{AudioOutput, AudioPlayback};
pub use sink::SpeechSink;
pub use stt::{
    OpenAiWhisper, SpeechToText, Transcriber, Transcript, TranscriptFilter, TranscriptSegment,
};
pub use tts::{OpenAiSpeech, TextToSpeech};
