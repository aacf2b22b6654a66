//! # Error Types
//!
//! Configuration problems are detected once, when the recognizer is built.
//! Device problems split into a fatal open failure and transient read failures
//! that the recognition loop absorbs.

use thiserror::Error;

use crate::notes::NoteSymbol;

/// Invalid configuration. Always reported at construction, never while running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("note table is empty")]
    EmptyNoteTable,
    #[error("range for {symbol} is invalid: {low} Hz .. {high} Hz")]
    InvalidRange { symbol: NoteSymbol, low: f32, high: f32 },
    #[error("ranges for {first} and {second} overlap")]
    OverlappingRanges { first: NoteSymbol, second: NoteSymbol },
    #[error("{0} appears more than once in the note table")]
    DuplicateSymbol(NoteSymbol),
    #[error("silence threshold ({silence_ms} ms) is shorter than the dropout tolerance ({dropout_ms} ms)")]
    SilenceBelowDropout { silence_ms: u128, dropout_ms: u128 },
    #[error("stabilizer window must hold at least one estimate")]
    EmptyStabilizerWindow,
    #[error("sample rate and block size must be non-zero")]
    EmptyAudioFormat,
    #[error("volume floor must be a finite, non-negative value, got {0}")]
    InvalidVolumeFloor(f32),
    #[error("plausible frequency bounds are invalid: {min} Hz .. {max} Hz")]
    InvalidFrequencyBounds { min: f32, max: f32 },
    #[error("audio source delivers {source_rate} Hz / {source_block} samples, config expects {config_rate} Hz / {config_block} samples")]
    SourceMismatch {
        source_rate: u32,
        source_block: usize,
        config_rate: u32,
        config_block: usize,
    },
}

/// Errors surfaced by the recognizer and its audio sources.
#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The audio device could not be opened. Fatal to `start()`.
    #[error("could not open audio input: {0}")]
    DeviceOpen(String),
    /// A single block could not be read. The loop skips it and carries on.
    #[error("audio read failed: {0}")]
    Read(String),
    /// The recognition thread panicked and the audio source went down with it.
    #[error("recognition thread panicked; the audio source is gone")]
    WorkerLost,
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config format error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = RecognizerError> = std::result::Result<T, E>;
