//! Energy-based silence gate
//!
//! Decides whether a captured window contains speech worth transcribing.

/// Gates audio windows on RMS energy
#[derive(Debug, Clone, Copy)]
pub struct SilenceGate {
    threshold: f32,
}

impl SilenceGate {
    /// Create a gate with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Check whether a window is silence
    ///
    /// An empty window is always silent.
    #[must_use]
    pub fn is_silent(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return true;
        }

        let energy = rms(samples);
        tracing::debug!(rms = energy, threshold = self.threshold, "window energy");
        energy < self.threshold
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_silent() {
        let gate = SilenceGate::new(0.003);
        assert!(gate.is_silent(&[]));
    }

    #[test]
    fn zeros_are_silent() {
        let gate = SilenceGate::new(0.003);
        assert!(gate.is_silent(&[0.0; 1600]));
    }

    #[test]
    fn speech_level_signal_passes() {
        let gate = SilenceGate::new(0.003);
        assert!(!gate.is_silent(&[0.5; 1600]));
    }

    #[test]
    fn quiet_signal_below_threshold_is_silent() {
        // A constant signal has RMS equal to its amplitude
        let gate = SilenceGate::new(0.01);
        assert!(!gate.is_silent(&[0.02; 100]));
        assert!(gate.is_silent(&[0.005; 100]));
    }

    #[test]
    fn rms_of_constant_signal() {
        let value = rms(&[0.5; 1000]);
        assert!((value - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert!(rms(&[]).abs() < f32::EPSILON);
    }
}
