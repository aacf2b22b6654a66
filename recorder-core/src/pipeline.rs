//! Per-block analysis chain: estimate → stabilize → classify.

use crate::audio::AudioBlock;
use crate::config::RecognizerConfig;
use crate::error::ConfigError;
use crate::notes::NoteTable;
use crate::pitch::{mean_volume, FrequencyEstimator};
use crate::stabilizer::FrequencyStabilizer;
use crate::BlockAnalysis;

#[derive(Debug, Clone)]
pub struct NotePipeline {
    estimator: FrequencyEstimator,
    stabilizer: FrequencyStabilizer,
    table: NoteTable,
}

impl NotePipeline {
    /// Chains the three stages; the stabilizer's history starts empty.
    pub fn new(estimator: FrequencyEstimator, stabilizer: FrequencyStabilizer, table: NoteTable) -> Self {
        Self {
            estimator,
            stabilizer,
            table,
        }
    }

    /// Builds every stage from a validated config.
    ///
    /// # Returns
    /// * `Ok(pipeline)` - Ready to process blocks of `config.block_size` samples
    /// * `Err(e)` - The config failed validation
    pub fn from_config(config: &RecognizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            FrequencyEstimator::new(
                config.sample_rate,
                config.block_size,
                config.volume_floor,
                config.min_frequency,
                config.max_frequency,
            ),
            FrequencyStabilizer::new(config.stabilizer_window),
            config.note_table()?,
        ))
    }

    /// Runs one block through the chain. Stabilizer history carries over.
    pub fn process(&mut self, block: &AudioBlock) -> BlockAnalysis {
        let frequency = self.estimator.estimate(block);
        let stable_frequency = self.stabilizer.push(frequency);
        BlockAnalysis {
            volume: mean_volume(block.samples()),
            frequency,
            stable_frequency,
            symbol: self.table.classify(stable_frequency),
        }
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.stabilizer.reset();
    }

    /// The note table used for classification.
    pub fn table(&self) -> &NoteTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::NoteSymbol;

    fn tone(bin: usize, len: usize) -> AudioBlock {
        let samples: Vec<i16> = (0..len)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * bin as f32 * i as f32 / len as f32;
                (6000.0 * phase.sin()) as i16
            })
            .collect();
        AudioBlock::new(samples)
    }

    #[test]
    fn tone_blocks_classify_to_their_note() {
        let config = RecognizerConfig::default();
        let mut pipeline = NotePipeline::from_config(&config).unwrap();

        // Bin 88 of a 4096-point FFT at 44.1 kHz is ~947 Hz.
        let analysis = pipeline.process(&tone(88, config.block_size));
        assert_eq!(analysis.symbol, Some(NoteSymbol::D));
        assert!(analysis.volume > config.volume_floor);
        assert_eq!(analysis.frequency, analysis.stable_frequency);
    }

    #[test]
    fn silence_and_outliers_are_smoothed_away() {
        let config = RecognizerConfig::default();
        let mut pipeline = NotePipeline::from_config(&config).unwrap();

        for _ in 0..4 {
            pipeline.process(&tone(102, config.block_size)); // ~1098 Hz, E
        }
        let outlier = pipeline.process(&tone(150, config.block_size)); // ~1615 Hz, G
        assert_eq!(outlier.symbol, Some(NoteSymbol::E));

        let silent = pipeline.process(&AudioBlock::new(vec![0i16; config.block_size]));
        assert_eq!(silent.frequency, None);
        assert_eq!(silent.symbol, None);

        pipeline.reset();
        let fresh = pipeline.process(&tone(150, config.block_size));
        assert_eq!(fresh.symbol, Some(NoteSymbol::G));
    }
}
