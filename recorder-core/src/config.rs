//! Recognizer configuration.
//!
//! Everything here is fixed once the recognizer is built. Configs can be saved
//! to and loaded from JSON so a calibrated note table survives restarts.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use crate::audio::{BLOCK_SIZE, SAMPLE_RATE};
use crate::detector::DetectorTimings;
use crate::error::{ConfigError, Result};
use crate::notes::{NoteRange, NoteTable, DEFAULT_NOTE_RANGES};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Capture rate in Hz.
    pub sample_rate: u32,
    /// Samples per analysed block.
    pub block_size: usize,
    /// Mean absolute sample value below which a block is silence.
    pub volume_floor: f32,
    /// Lowest plausible instrument frequency in Hz.
    pub min_frequency: f32,
    /// Highest plausible instrument frequency in Hz.
    pub max_frequency: f32,
    /// Estimates kept for median smoothing.
    pub stabilizer_window: usize,
    pub min_note_ms: u64,
    pub dropout_tolerance_ms: u64,
    pub silence_threshold_ms: u64,
    pub notes: Vec<NoteRange>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let timings = DetectorTimings::default();
        Self {
            sample_rate: SAMPLE_RATE,
            block_size: BLOCK_SIZE,
            volume_floor: 200.0,
            min_frequency: 500.0,
            max_frequency: 3000.0,
            stabilizer_window: 5,
            min_note_ms: timings.min_note.as_millis() as u64,
            dropout_tolerance_ms: timings.dropout_tolerance.as_millis() as u64,
            silence_threshold_ms: timings.silence_threshold.as_millis() as u64,
            notes: DEFAULT_NOTE_RANGES.to_vec(),
        }
    }
}

impl RecognizerConfig {
    /// Debounce durations for the note detector.
    pub fn timings(&self) -> DetectorTimings {
        DetectorTimings {
            min_note: Duration::from_millis(self.min_note_ms),
            dropout_tolerance: Duration::from_millis(self.dropout_tolerance_ms),
            silence_threshold: Duration::from_millis(self.silence_threshold_ms),
        }
    }

    /// Builds the validated note table.
    pub fn note_table(&self) -> Result<NoteTable, ConfigError> {
        NoteTable::new(self.notes.iter().copied())
    }

    /// Checks every setting. Called by the recognizer before it runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 || self.block_size == 0 {
            return Err(ConfigError::EmptyAudioFormat);
        }
        if !self.volume_floor.is_finite() || self.volume_floor < 0.0 {
            return Err(ConfigError::InvalidVolumeFloor(self.volume_floor));
        }
        if !self.min_frequency.is_finite()
            || !self.max_frequency.is_finite()
            || self.min_frequency < 0.0
            || self.min_frequency > self.max_frequency
        {
            return Err(ConfigError::InvalidFrequencyBounds {
                min: self.min_frequency,
                max: self.max_frequency,
            });
        }
        if self.stabilizer_window == 0 {
            return Err(ConfigError::EmptyStabilizerWindow);
        }
        self.timings().validate()?;
        self.note_table()?;
        Ok(())
    }

    /// Loads a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let config: RecognizerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecognizerError;
    use crate::notes::NoteSymbol;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("recorder-core-{}-{}", std::process::id(), name))
    }

    #[test]
    fn defaults_are_valid() {
        let config = RecognizerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timings(), DetectorTimings::default());
        assert_eq!(config.note_table().unwrap(), NoteTable::default());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut config = RecognizerConfig::default();
        config.silence_threshold_ms = 20;
        assert!(matches!(config.validate(), Err(ConfigError::SilenceBelowDropout { .. })));

        let mut config = RecognizerConfig::default();
        config.stabilizer_window = 0;
        assert_eq!(config.validate(), Err(ConfigError::EmptyStabilizerWindow));

        let mut config = RecognizerConfig::default();
        config.block_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::EmptyAudioFormat));

        let mut config = RecognizerConfig::default();
        config.volume_floor = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidVolumeFloor(-1.0)));

        let mut config = RecognizerConfig::default();
        config.volume_floor = f32::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidVolumeFloor(_))));

        let mut config = RecognizerConfig::default();
        config.volume_floor = 0.0;
        config.validate().unwrap();

        let mut config = RecognizerConfig::default();
        config.min_frequency = 4000.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFrequencyBounds { .. })));

        let mut config = RecognizerConfig::default();
        config.notes.push(NoteRange::new(NoteSymbol::B, 850.0, 950.0));
        assert!(matches!(config.validate(), Err(ConfigError::OverlappingRanges { .. })));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RecognizerConfig =
            serde_json::from_str(r#"{ "volume_floor": 120.0, "notes": [{ "symbol": "B", "low": 600.0, "high": 700.0 }] }"#)
                .unwrap();
        assert_eq!(config.volume_floor, 120.0);
        assert_eq!(config.block_size, BLOCK_SIZE);
        assert_eq!(config.note_table().unwrap().classify(Some(650.0)), Some(NoteSymbol::B));
    }

    #[test]
    fn config_file_round_trip() {
        let path = temp_path("round-trip.json");
        let mut config = RecognizerConfig::default();
        config.volume_floor = 150.0;
        config.save(&path).unwrap();
        let loaded = RecognizerConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn loading_an_invalid_file_reports_the_problem() {
        let path = temp_path("inverted.json");
        std::fs::write(&path, r#"{ "notes": [{ "symbol": "C", "low": 900.0, "high": 800.0 }] }"#).unwrap();
        let result = RecognizerConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            result,
            Err(RecognizerError::Config(ConfigError::InvalidRange { symbol: NoteSymbol::C, .. }))
        ));

        assert!(matches!(
            RecognizerConfig::load(temp_path("missing.json")),
            Err(RecognizerError::Io(_))
        ));
    }
}
