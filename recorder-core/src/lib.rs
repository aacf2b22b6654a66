// recorder-core/src/lib.rs

//! The core logic for the recorder note controller.
//! This crate turns live audio into completed note events: frequency
//! estimation, smoothing, note classification and note boundary detection,
//! driven by a background recognition loop. It contains no transport or
//! input-injection code.

pub mod audio;
pub mod commands;
pub mod config;
pub mod detector;
pub mod error;
pub mod fft;
pub mod notes;
pub mod pipeline;
pub mod pitch;
pub mod recognizer;
pub mod stabilizer;

pub use audio::{AudioBlock, AudioSource, CpalSource};
pub use commands::Command;
pub use config::RecognizerConfig;
pub use detector::{DetectorTimings, NoteBoundaryDetector, NoteEvent};
pub use error::{ConfigError, RecognizerError};
pub use notes::{NoteRange, NoteSymbol, NoteTable};
pub use recognizer::{ChannelListener, Clock, LoopStats, MonotonicClock, NoteListener, NoteRecognitionLoop};

/// Represents the result of analysing a single audio block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockAnalysis {
    /// Mean absolute sample value of the block.
    pub volume: f32,
    /// The raw dominant frequency in Hz.
    pub frequency: Option<f32>,
    /// The frequency after median smoothing.
    pub stable_frequency: Option<f32>,
    /// The note the smoothed frequency falls into.
    pub symbol: Option<NoteSymbol>,
}
