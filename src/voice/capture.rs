//! Audio capture from microphone
//!
//! The input stream lives on a dedicated thread (cpal streams are not
//! `Send`); captured chunks cross to the async side through a bounded
//! channel. When the loop falls behind, the sending side blocks until
//! capacity frees up, so the capture thread can never flood the scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::mpsc;

use crate::voice::SilenceGate;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Chunks buffered between the capture thread and the loop
const CHANNEL_CAPACITY: usize = 64;

/// Receives audio chunks from the dedicated capture thread
pub struct AudioCapture {
    rx: mpsc::Receiver<Vec<f32>>,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl AudioCapture {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device is available
    pub fn start() -> Result<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || capture_thread(&tx, &thread_stop, &ready_tx))
            .map_err(|e| Error::Audio(format!("cannot spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                rx,
                stop,
                thread: Some(thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Audio("capture thread exited during startup".to_string())),
        }
    }

    /// Wrap an existing chunk channel instead of opening a device
    ///
    /// Used by tests and by alternative capture sources.
    #[must_use]
    pub fn from_channel(rx: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            rx,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Receive the next captured chunk
    ///
    /// Returns `None` when the capture thread has stopped.
    pub async fn next_chunk(&mut self) -> Option<Vec<f32>> {
        self.rx.recv().await
    }

    /// Discard any chunks buffered since the last receive
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Stop the capture thread
    ///
    /// Safe to call more than once; `Drop` calls it as well.
    pub fn stop(&mut self) {
        // A callback parked in `blocking_send` on a full channel keeps the
        // stream from dropping; closing the receiver releases it before the
        // join below.
        self.rx.close();
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs on the dedicated thread; owns the input stream for its lifetime
fn capture_thread(
    tx: &mpsc::Sender<Vec<f32>>,
    stop: &AtomicBool,
    ready: &std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match open_input_stream(tx.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(Error::Audio(e.to_string())));
        return;
    }

    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
}

fn open_input_stream(tx: mpsc::Sender<Vec<f32>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(SAMPLE_RATE))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels = config.channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Blocks when the channel is full; send fails only once
                // the receiving side has shut down
                let _ = tx.blocking_send(data.to_vec());
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    Ok(stream)
}

/// Records one fixed-length utterance window per call
///
/// A window survives only if it carries speech energy; silent and
/// incomplete windows are skipped so downstream stages never see empty
/// audio.
pub struct Recorder {
    capture: AudioCapture,
    gate: SilenceGate,
    window_samples: usize,
    window: Duration,
}

impl Recorder {
    /// Create a recorder over an already-started capture source
    #[must_use]
    pub fn new(capture: AudioCapture, gate: SilenceGate, window: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let window_samples = (window.as_secs_f64() * f64::from(SAMPLE_RATE)) as usize;
        Self {
            capture,
            gate,
            window_samples,
            window,
        }
    }

    /// Open the default input device and wrap it in a recorder
    ///
    /// # Errors
    ///
    /// Returns error if the capture device cannot be opened
    pub fn from_default_device(gate: SilenceGate, window: Duration) -> Result<Self> {
        Ok(Self::new(AudioCapture::start()?, gate, window))
    }

    /// Capture one window of audio
    ///
    /// Returns `Ok(None)` when the window holds no usable speech (silence,
    /// or the device produced too few frames in time). Returns an error
    /// only when the capture side has shut down entirely.
    ///
    /// # Errors
    ///
    /// Returns error if the capture channel is closed
    pub async fn record(&mut self) -> Result<Option<Vec<f32>>> {
        // Audio captured while the assistant was speaking is stale
        self.capture.drain();

        tracing::debug!(window_secs = self.window.as_secs(), "listening");

        let mut samples: Vec<f32> = Vec::with_capacity(self.window_samples);
        let deadline = tokio::time::Instant::now() + self.window * 2;

        while samples.len() < self.window_samples {
            match tokio::time::timeout_at(deadline, self.capture.next_chunk()).await {
                Ok(Some(chunk)) => samples.extend_from_slice(&chunk),
                Ok(None) => {
                    return Err(Error::Audio("capture stream closed".to_string()));
                }
                Err(_) => {
                    tracing::warn!(
                        collected = samples.len(),
                        expected = self.window_samples,
                        "capture window timed out"
                    );
                    return Ok(None);
                }
            }
        }

        samples.truncate(self.window_samples);

        if self.gate.is_silent(&samples) {
            tracing::debug!("silence detected, skipping window");
            return Ok(None);
        }

        normalize_peak(&mut samples);
        Ok(Some(samples))
    }

    /// Stop the underlying capture
    pub fn stop(&mut self) {
        self.capture.stop();
    }
}

/// Scale samples so the loudest one has unit magnitude
///
/// All-zero input is left untouched.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        for sample in samples.iter_mut() {
            *sample /= peak;
        }
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
