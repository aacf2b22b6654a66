//! Short-window median smoothing of per-block frequency estimates.
//!
//! FFT bin quantization and breath noise make single blocks jump around. The
//! median of the last few present estimates drops a lone outlier without
//! adding noticeable latency.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct FrequencyStabilizer {
    window: VecDeque<Option<f32>>,
    capacity: usize,
}

impl FrequencyStabilizer {
    /// `capacity` is the number of recent estimates kept, absences included.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Records `estimate` and returns the stabilized frequency.
    ///
    /// An absent estimate always yields `None`: history never fabricates a note.
    pub fn push(&mut self, estimate: Option<f32>) -> Option<f32> {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(estimate);

        let latest = estimate?;
        let mut present: Vec<f32> = self.window.iter().flatten().copied().collect();
        if present.len() < 2 {
            return Some(latest);
        }
        Some(median(&mut present))
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Median of a non-empty slice; the mean of the middle pair for even lengths.
fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_outlier_is_rejected() {
        let mut stabilizer = FrequencyStabilizer::new(5);
        for estimate in [1000.0, 1000.0, 2500.0, 1000.0] {
            stabilizer.push(Some(estimate));
        }
        assert_eq!(stabilizer.push(Some(1000.0)), Some(1000.0));
    }

    #[test]
    fn outlier_as_latest_reading_is_still_rejected() {
        let mut stabilizer = FrequencyStabilizer::new(5);
        for _ in 0..4 {
            stabilizer.push(Some(861.0));
        }
        assert_eq!(stabilizer.push(Some(2900.0)), Some(861.0));
    }

    #[test]
    fn lone_estimate_passes_through() {
        let mut stabilizer = FrequencyStabilizer::new(5);
        assert_eq!(stabilizer.push(Some(990.0)), Some(990.0));

        stabilizer.reset();
        for _ in 0..4 {
            stabilizer.push(None);
        }
        // Only one present value in the window.
        assert_eq!(stabilizer.push(Some(1162.0)), Some(1162.0));
    }

    #[test]
    fn absent_estimate_is_absent_regardless_of_history() {
        let mut stabilizer = FrequencyStabilizer::new(5);
        for _ in 0..4 {
            stabilizer.push(Some(1000.0));
        }
        assert_eq!(stabilizer.push(None), None);
    }

    #[test]
    fn even_count_uses_middle_pair() {
        let mut stabilizer = FrequencyStabilizer::new(5);
        stabilizer.push(Some(1000.0));
        assert_eq!(stabilizer.push(Some(1100.0)), Some(1050.0));
    }

    #[test]
    fn oldest_estimates_are_evicted() {
        let mut stabilizer = FrequencyStabilizer::new(3);
        for _ in 0..3 {
            stabilizer.push(Some(600.0));
        }
        assert_eq!(stabilizer.push(Some(1200.0)), Some(600.0));
        // [600, 1200, 1200]: the new note has taken over the window.
        assert_eq!(stabilizer.push(Some(1200.0)), Some(1200.0));
        assert_eq!(stabilizer.capacity(), 3);
    }
}
