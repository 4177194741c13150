use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use banter::voice::{self, AudioCapture, AudioPlayback, OpenAiSpeech, SpeechSink};
use banter::{Config, ConversationLoop, Embedder, knowledge};

/// Banter - Hands-free voice conversation loop for AI assistants
#[derive(Parser)]
#[command(name = "banter", version, about)]
struct Cli {
    /// Path to a configuration file (defaults to the platform config dir)
    #[arg(short, long, env = "BANTER_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Embed documents into the knowledge snapshot
    Ingest,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,banter=info",
        1 => "info,banter=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Ingest => cmd_ingest(config_path).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(config_path, &text).await,
        };
    }

    let config = Config::load(config_path)?;
    config.ensure_dirs()?;
    tracing::info!(data_dir = %config.data_dir.display(), "starting banter");

    // Set up shutdown signal
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    let conversation = ConversationLoop::from_config(&config)?;
    tracing::info!(
        exit_phrases = %config.exit_phrases.join(", "),
        "ready - speak to begin, say an exit phrase to stop"
    );

    conversation.run(&mut shutdown_rx).await?;

    Ok(())
}

/// Embed documents into the knowledge snapshot
async fn cmd_ingest(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    config.ensure_dirs()?;

    let docs_dir = config.documents_dir();
    println!("Ingesting documents from {}", docs_dir.display());

    let embedder = Embedder::new(
        config.api_key.clone(),
        config.retrieval.embedding_model.clone(),
    )?;

    let chunks = knowledge::ingest::build_chunks(&docs_dir, &embedder).await?;
    if chunks.is_empty() {
        println!("No documents found.");
        println!(
            "Drop .txt or .md files into {} and rerun.",
            docs_dir.display()
        );
        return Ok(());
    }

    knowledge::ingest::save_snapshot(&chunks, &config.store_path())?;
    println!(
        "Ingested {} chunks into {}",
        chunks.len(),
        config.store_path().display()
    );

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::start()?;

    println!("Sample rate: {} Hz", voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        // Collect one second of audio
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        while let Ok(Some(chunk)) = tokio::time::timeout_at(deadline, capture.next_chunk()).await {
            samples.extend_from_slice(&chunk);
        }

        let energy = voice::rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_i32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output end to end
async fn test_tts(config_path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    config.ensure_dirs()?;

    let tts = OpenAiSpeech::new(
        config.api_key.clone(),
        config.voice.tts_model.clone(),
        config.voice.tts_voice.clone(),
        config.voice.tts_speed,
    )?;
    let playback = AudioPlayback::new()?;
    let sink = SpeechSink::new(Arc::new(tts), Arc::new(playback), config.scratch_dir());

    println!("Synthesizing and playing...");
    sink.speak(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
