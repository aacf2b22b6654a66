//! # Pitch Detection Module
//!
//! Dominant-frequency estimation for a single audio block. A recorder tone is
//! close to a pure sine, so the strongest FFT bin is a good enough estimate;
//! quiet blocks and peaks outside the instrument's range are rejected.

use crate::audio::AudioBlock;
use crate::fft::{peak_bin, SpectrumAnalyzer};

/// Mean absolute sample value, used as a cheap loudness measure.
pub fn mean_volume(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let total: u64 = samples.iter().map(|&s| (s as i32).unsigned_abs() as u64).sum();
    (total as f64 / samples.len() as f64) as f32
}

/// Turns one block into a dominant-frequency estimate.
#[derive(Debug, Clone)]
pub struct FrequencyEstimator {
    sample_rate: u32,
    volume_floor: f32,
    min_frequency: f32,
    max_frequency: f32,
    analyzer: SpectrumAnalyzer,
}

impl FrequencyEstimator {
    pub fn new(
        sample_rate: u32,
        block_size: usize,
        volume_floor: f32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Self {
        Self {
            sample_rate,
            volume_floor,
            min_frequency,
            max_frequency,
            analyzer: SpectrumAnalyzer::new(block_size),
        }
    }

    /// Returns the dominant frequency in Hz.
    ///
    /// # Returns
    /// * `Some(frequency)` - Peak bin frequency inside the plausible range
    /// * `None` - Block too quiet, empty, or peak outside the plausible range
    pub fn estimate(&self, block: &AudioBlock) -> Option<f32> {
        self.estimate_samples(block.samples())
    }

    pub fn estimate_samples(&self, samples: &[i16]) -> Option<f32> {
        if samples.is_empty() || mean_volume(samples) < self.volume_floor {
            return None;
        }

        let magnitudes = if samples.len() == self.analyzer.len() {
            self.analyzer.magnitudes(samples)
        } else {
            SpectrumAnalyzer::new(samples.len()).magnitudes(samples)
        };

        let index = peak_bin(&magnitudes)?;
        let frequency = index as f32 * self.sample_rate as f32 / samples.len() as f32;

        // Sub-harmonic rumble and ultrasonic artifacts are not recorder notes.
        if frequency < self.min_frequency || frequency > self.max_frequency {
            return None;
        }
        Some(frequency)
    }

    /// Width of one FFT bin for the configured block length.
    pub fn bin_width(&self) -> f32 {
        self.sample_rate as f32 / self.analyzer.len() as f32
    }
}
