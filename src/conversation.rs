//! The listen-and-respond conversation loop

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::chat::{FragmentStream, OpenAiChat, ResponseStreamer};
use crate::config::{Config, RetrievalErrorPolicy};
use crate::knowledge::{ContextRetriever, Embedder, VectorStore};
use crate::segment::SentenceSegmenter;
use crate::voice::{
    AudioPlayback, OpenAiSpeech, OpenAiWhisper, Recorder, SilenceGate, SpeechSink,
    TranscriptFilter, Transcriber,
};
use crate::{Error, Result};

/// How one listen-and-respond cycle ended
#[derive(Debug)]
pub enum CycleOutcome {
    /// A response was generated and spoken
    Completed,
    /// Nothing worth answering was heard
    Skipped(SkipReason),
    /// A backend fault ended the cycle early; the loop keeps running
    Recoverable(Error),
    /// An exit phrase was spoken
    Exit,
}

/// Why a cycle produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The capture window held no usable audio
    NoAudio,
    /// Transcription produced nothing past the noise filters
    EmptyTranscript,
}

/// Composes capture, transcription, retrieval, generation, and playback
/// into the continuous conversation cycle
///
/// Faults inside a cycle are contained: the loop logs them and goes
/// back to listening. Only a dead capture stream ends it with an error.
pub struct ConversationLoop {
    recorder: Recorder,
    transcriber: Transcriber,
    retriever: ContextRetriever,
    streamer: ResponseStreamer,
    sink: SpeechSink,
    exit_phrases: Vec<String>,
    retrieval_policy: RetrievalErrorPolicy,
}

impl ConversationLoop {
    #[must_use]
    pub fn new(
        recorder: Recorder,
        transcriber: Transcriber,
        retriever: ContextRetriever,
        streamer: ResponseStreamer,
        sink: SpeechSink,
        exit_phrases: Vec<String>,
        retrieval_policy: RetrievalErrorPolicy,
    ) -> Self {
        Self {
            recorder,
            transcriber,
            retriever,
            streamer,
            sink,
            exit_phrases,
            retrieval_policy,
        }
    }

    /// Wire up the loop with live backends from configuration
    ///
    /// # Errors
    ///
    /// Returns error if audio devices cannot be opened, the knowledge
    /// snapshot is unreadable, or backend clients cannot be created
    pub fn from_config(config: &Config) -> Result<Self> {
        let gate = SilenceGate::new(config.voice.silence_threshold);
        let recorder =
            Recorder::from_default_device(gate, Duration::from_secs(config.voice.record_secs))?;

        let whisper = OpenAiWhisper::new(
            config.api_key.clone(),
            config.voice.stt_model.clone(),
            config.voice.stt_language.clone(),
        )?;
        let transcriber = Transcriber::new(
            Arc::new(whisper),
            TranscriptFilter::new(&config.filter),
        );

        let embedder = Embedder::new(
            config.api_key.clone(),
            config.retrieval.embedding_model.clone(),
        )?;
        let store = VectorStore::load(&config.store_path(), embedder)?;
        let retriever = ContextRetriever::new(Arc::new(store), config.retrieval.top_k);

        let chat = OpenAiChat::new(config.api_key.clone(), config.chat_model.clone())?;
        let streamer = ResponseStreamer::new(Arc::new(chat), config.persona.clone());

        let tts = OpenAiSpeech::new(
            config.api_key.clone(),
            config.voice.tts_model.clone(),
            config.voice.tts_voice.clone(),
            config.voice.tts_speed,
        )?;
        let playback = AudioPlayback::new()?;
        let sink = SpeechSink::new(Arc::new(tts), Arc::new(playback), config.scratch_dir());

        Ok(Self::new(
            recorder,
            transcriber,
            retriever,
            streamer,
            sink,
            config.exit_phrases.clone(),
            config.retrieval.on_error,
        ))
    }

    /// Run cycles until an exit phrase or a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream dies
    pub async fn run(mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("assistant is online");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                outcome = self.run_cycle() => match outcome? {
                    CycleOutcome::Completed => {}
                    CycleOutcome::Skipped(reason) => {
                        tracing::debug!(?reason, "cycle skipped");
                    }
                    CycleOutcome::Recoverable(e) => {
                        tracing::warn!(error = %e, "cycle failed, listening again");
                    }
                    CycleOutcome::Exit => {
                        tracing::info!("exit phrase heard, stopping");
                        break;
                    }
                },
            }
        }

        self.recorder.stop();
        tracing::info!("assistant stopped");
        Ok(())
    }

    /// One pass through the listen-and-respond cycle
    ///
    /// # Errors
    ///
    /// Returns error only when capture has shut down; every other fault
    /// is folded into the returned outcome
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let Some(samples) = self.recorder.record().await? else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoAudio));
        };

        let utterance = self.transcriber.transcribe(&samples).await;
        if utterance.is_empty() {
            return Ok(CycleOutcome::Skipped(SkipReason::EmptyTranscript));
        }

        tracing::info!(utterance = %utterance, "heard");

        if is_exit_phrase(&self.exit_phrases, &utterance) {
            return Ok(CycleOutcome::Exit);
        }

        let context = match self.retriever.retrieve(&utterance).await {
            Ok(context) => context,
            Err(e) => match self.retrieval_policy {
                RetrievalErrorPolicy::ProceedWithoutContext => {
                    tracing::warn!(error = %e, "retrieval failed, answering without context");
                    String::new()
                }
                RetrievalErrorPolicy::AbortCycle => {
                    return Ok(CycleOutcome::Recoverable(e));
                }
            },
        };

        let stream = match self.streamer.generate(&utterance, &context).await {
            Ok(stream) => stream,
            Err(e) => return Ok(CycleOutcome::Recoverable(e)),
        };

        match self.speak_stream(stream).await {
            Ok(()) => Ok(CycleOutcome::Completed),
            Err(e) => Ok(CycleOutcome::Recoverable(e)),
        }
    }

    /// Speak each sentence as the response streams in
    ///
    /// Sentences are spoken strictly in generation order; the next one
    /// is not requested until the current playback finishes. A fault
    /// mid-stream still flushes whatever had accumulated before it.
    async fn speak_stream(&self, mut stream: FragmentStream) -> Result<()> {
        let mut segmenter = SentenceSegmenter::new();

        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(fragment) => {
                    if let Some(sentence) = segmenter.push(&fragment) {
                        tracing::info!(sentence = %sentence.trim(), "responding");
                        self.sink.speak(&sentence).await?;
                    }
                }
                Err(e) => {
                    if let Some(remainder) = segmenter.finish() {
                        tracing::info!(sentence = %remainder, "responding");
                        self.sink.speak(&remainder).await?;
                    }
                    return Err(e);
                }
            }
        }

        if let Some(remainder) = segmenter.finish() {
            tracing::info!(sentence = %remainder, "responding");
            self.sink.speak(&remainder).await?;
        }

        Ok(())
    }
}

/// Exact match against an exit phrase after trimming and lowercasing
fn is_exit_phrase(phrases: &[String], utterance: &str) -> bool {
    let normalized = utterance.trim().to_lowercase();
    phrases.iter().any(|p| *p == normalized)
}
