//! # Fast Fourier Transform (FFT) Module
//!
//! Spectrum helpers for the frequency estimator. Blocks arrive as raw 16-bit
//! samples; the spectrum is taken as-is (no window, no DC removal) so the
//! dominant bin maps directly to `index * sample_rate / block_len`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// A forward FFT planned once for a fixed block length.
#[derive(Clone)]
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    len: usize,
}

impl SpectrumAnalyzer {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        Self { fft, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Magnitudes of bins `0..=len/2` (the half spectrum of a real signal).
    ///
    /// # Panics
    /// * If `samples.len()` differs from the planned length
    pub fn magnitudes(&self, samples: &[i16]) -> Vec<f32> {
        assert_eq!(samples.len(), self.len, "block length must match the planned FFT size");

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .map(|&sample| Complex { re: sample as f32, im: 0.0 })
            .collect();

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(self.len / 2 + 1)
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect()
    }
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").field("len", &self.len).finish()
    }
}

/// Index of the largest magnitude. The first one wins on ties.
pub fn peak_bin(magnitudes: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &magnitude) in magnitudes.iter().enumerate() {
        match best {
            Some((_, top)) if magnitude <= top => {}
            _ => best = Some((i, magnitude)),
        }
    }
    best.map(|(i, _)| i)
}
