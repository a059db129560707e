//! Energy-based voice activity detection for inbound audio

use crate::pipeline::AudioFrame;
use std::time::Duration;

/// Detector thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadParams {
    /// Minimum voice confidence (0.0 - 1.0) for a frame to count as speech
    pub confidence: f32,
    /// Continuous speech needed before reporting `Speaking`
    pub start_secs: f64,
    /// Continuous silence needed before reporting `Quiet` again
    pub stop_secs: f64,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            confidence: 0.7,
            start_secs: 0.2,
            stop_secs: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Quiet,
    Starting,
    Speaking,
    Stopping,
}

#[derive(Debug)]
pub struct VadAnalyzer {
    params: VadParams,
    state: VadState,
    /// Time spent in the current transitional state
    elapsed: Duration,
}

impl VadAnalyzer {
    pub fn new(params: VadParams) -> Self {
        Self {
            params,
            state: VadState::Quiet,
            elapsed: Duration::ZERO,
        }
    }

    pub fn params(&self) -> &VadParams {
        &self.params
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, VadState::Speaking | VadState::Stopping)
    }

    pub fn reset(&mut self) {
        self.state = VadState::Quiet;
        self.elapsed = Duration::ZERO;
    }

    /// Feed one frame and return the new state
    pub fn analyze(&mut self, frame: &AudioFrame) -> VadState {
        let speech = voice_confidence(&frame.samples) >= self.params.confidence;
        let dt = frame.duration();
        let start = Duration::from_secs_f64(self.params.start_secs);
        let stop = Duration::from_secs_f64(self.params.stop_secs);

        self.state = match (self.state, speech) {
            (VadState::Quiet, false) => VadState::Quiet,
            (VadState::Quiet, true) => {
                self.elapsed = dt;
                if dt >= start {
                    VadState::Speaking
                } else {
                    VadState::Starting
                }
            }
            (VadState::Starting, true) => {
                self.elapsed += dt;
                if self.elapsed >= start {
                    VadState::Speaking
                } else {
                    VadState::Starting
                }
            }
            (VadState::Starting, false) => VadState::Quiet,
            (VadState::Speaking, true) | (VadState::Stopping, true) => VadState::Speaking,
            (VadState::Speaking, false) => {
                self.elapsed = dt;
                if dt >= stop {
                    VadState::Quiet
                } else {
                    VadState::Stopping
                }
            }
            (VadState::Stopping, false) => {
                self.elapsed += dt;
                if self.elapsed >= stop {
                    VadState::Quiet
                } else {
                    VadState::Stopping
                }
            }
        };

        self.state
    }
}

/// Map frame loudness to a 0.0 - 1.0 confidence: -60 dBFS and below is 0, -15 dBFS and above is 1.
pub fn voice_confidence(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_squares / samples.len() as f64).sqrt();
    if rms < 1.0 {
        return 0.0;
    }

    let dbfs = 20.0 * (rms / i16::MAX as f64).log10();
    ((dbfs + 60.0) / 45.0).clamp(0.0, 1.0) as f32
}
