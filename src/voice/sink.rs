//! Serialized speech playback

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::Result;
use crate::voice::{AudioOutput, TextToSpeech};

/// Speaks sentences one at a time
///
/// A mutex serializes playback so concurrent `speak` calls queue up
/// rather than talking over each other. Synthesized audio lands in a
/// temporary artifact that is removed once playback finishes, on
/// success and failure alike.
pub struct SpeechSink {
    tts: Arc<dyn TextToSpeech>,
    output: Arc<dyn AudioOutput>,
    scratch_dir: PathBuf,
    playing: Mutex<()>,
}

impl SpeechSink {
    #[must_use]
    pub fn new(
        tts: Arc<dyn TextToSpeech>,
        output: Arc<dyn AudioOutput>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            tts,
            output,
            scratch_dir,
            playing: Mutex::new(()),
        }
    }

    /// Synthesize one sentence and play it through to completion
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails, the artifact cannot be written,
    /// or playback fails
    pub async fn speak(&self, sentence: &str) -> Result<()> {
        let text = sentence.trim();
        if text.is_empty() {
            return Ok(());
        }

        let _playing = self.playing.lock().await;

        // Dropped on every return path below, removing the artifact
        let artifact = tempfile::Builder::new()
            .prefix("speech-")
            .suffix(".mp3")
            .tempfile_in(&self.scratch_dir)?;

        let audio = self.tts.synthesize(text).await?;
        tokio::fs::write(artifact.path(), &audio).await?;

        if !artifact.path().exists() {
            tracing::error!(
                path = %artifact.path().display(),
                "synthesized artifact missing, skipping playback"
            );
            return Ok(());
        }

        tracing::debug!(len = text.len(), "playing sentence");
        self.output.play_file(artifact.path()).await?;

        Ok(())
    }
}
