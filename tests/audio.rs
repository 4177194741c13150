//! Audio capture and encoding integration tests
//!
//! Tests the recorder against a channel-fed capture source, so no audio
//! hardware is required.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::assert_err;

use banter::voice::{AudioCapture, Recorder, SAMPLE_RATE, SilenceGate, rms, samples_to_wav};

mod common;
use common::{generate_silence, generate_sine_samples};

/// Capture window used by the tests
const WINDOW: Duration = Duration::from_millis(100);

/// Samples in one capture window
const WINDOW_SAMPLES: usize = (SAMPLE_RATE as usize) / 10;

fn channel_recorder(rx: mpsc::Receiver<Vec<f32>>) -> Recorder {
    Recorder::new(AudioCapture::from_channel(rx), SilenceGate::new(0.003), WINDOW)
}

#[tokio::test]
async fn test_voiced_window_is_normalized() {
    let (tx, rx) = mpsc::channel(64);
    let mut recorder = channel_recorder(rx);

    let samples = generate_sine_samples(440.0, 0.1, 0.3);
    let sender = tx.clone();
    tokio::spawn(async move {
        let _ = sender.send(samples).await;
    });

    let recorded = recorder.record().await.unwrap().expect("voiced window");
    assert_eq!(recorded.len(), WINDOW_SAMPLES);

    let peak = recorded.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    assert!((peak - 1.0).abs() < 1e-6, "peak was {peak}");
}

#[tokio::test]
async fn test_silent_window_is_discarded() {
    let (tx, rx) = mpsc::channel(64);
    let mut recorder = channel_recorder(rx);

    let samples = generate_silence(0.1);
    let sender = tx.clone();
    tokio::spawn(async move {
        let _ = sender.send(samples).await;
    });

    let recorded = recorder.record().await.unwrap();
    assert!(recorded.is_none());
}

#[tokio::test]
async fn test_window_assembles_from_small_chunks() {
    let (tx, rx) = mpsc::channel(64);
    let mut recorder = channel_recorder(rx);

    // Device callbacks deliver buffers much smaller than a window
    let samples = generate_sine_samples(220.0, 0.1, 0.3);
    let sender = tx.clone();
    tokio::spawn(async move {
        for chunk in samples.chunks(400) {
            if sender.send(chunk.to_vec()).await.is_err() {
                return;
            }
        }
    });

    let recorded = recorder.record().await.unwrap().expect("voiced window");
    assert_eq!(recorded.len(), WINDOW_SAMPLES);
}

#[tokio::test]
async fn test_stale_backlog_is_discarded_before_recording() {
    let (tx, rx) = mpsc::channel(64);
    let mut recorder = channel_recorder(rx);

    // Queued while the recorder was busy elsewhere, must not be heard
    tx.send(vec![0.5; WINDOW_SAMPLES]).await.unwrap();
    tx.send(vec![0.5; WINDOW_SAMPLES]).await.unwrap();

    let fresh = generate_sine_samples(440.0, 0.1, 0.4);
    let sender = tx.clone();
    tokio::spawn(async move {
        let _ = sender.send(fresh).await;
    });

    let recorded = recorder.record().await.unwrap().expect("voiced window");

    // A constant backlog window would normalize to all ones; a sine keeps
    // its zero crossings
    assert!(recorded.iter().any(|s| s.abs() < 0.1));
}

#[tokio::test]
async fn test_stalled_capture_times_out_as_empty() {
    let (tx, rx) = mpsc::channel::<Vec<f32>>(4);
    let mut recorder = Recorder::new(
        AudioCapture::from_channel(rx),
        SilenceGate::new(0.003),
        Duration::from_millis(50),
    );

    let recorded = recorder.record().await.unwrap();
    assert!(recorded.is_none());
    drop(tx);
}

#[tokio::test]
async fn test_closed_capture_channel_is_an_error() {
    let (tx, rx) = mpsc::channel::<Vec<f32>>(4);
    let mut recorder = channel_recorder(rx);

    drop(tx);
    assert_err!(recorder.record().await);
}

#[tokio::test]
async fn test_stop_releases_a_blocked_producer() {
    let (tx, rx) = mpsc::channel(1);
    let mut capture = AudioCapture::from_channel(rx);

    // Fill the channel so the next send has to wait for capacity
    tx.send(vec![0.0f32; 16]).await.unwrap();

    let (done_tx, done_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.blocking_send(vec![0.0f32; 16]);
        let _ = done_tx.send(());
    });

    // Give the producer time to park on the full channel
    tokio::time::sleep(Duration::from_millis(20)).await;
    capture.stop();

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("producer still blocked after stop");
}

#[test]
fn test_silence_gate_on_generated_audio() {
    let gate = SilenceGate::new(0.003);
    assert!(gate.is_silent(&generate_silence(0.1)));
    assert!(!gate.is_silent(&generate_sine_samples(440.0, 0.1, 0.3)));
}

#[test]
fn test_rms_of_sine_wave() {
    // RMS of a sine wave is amplitude over sqrt(2)
    let level = rms(&generate_sine_samples(440.0, 1.0, 0.5));
    assert!((level - 0.3536).abs() < 0.005, "rms was {level}");
}

#[test]
fn test_wav_roundtrip() {
    let samples = generate_sine_samples(440.0, 0.5, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).expect("wav encoding");

    let reader = hound::WavReader::new(std::io::Cursor::new(wav)).expect("wav parses");
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let decoded: Vec<i16> = reader
        .into_samples::<i16>()
        .map(|s| s.expect("sample decodes"))
        .collect();
    assert_eq!(decoded.len(), samples.len());

    for (original, restored) in samples.iter().zip(&decoded) {
        let restored = f32::from(*restored) / 32767.0;
        assert!((original - restored).abs() < 0.001);
    }
}
