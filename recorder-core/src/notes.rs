//! # Note Classification Module
//!
//! Maps a stabilized frequency onto the small alphabet of recorder notes the
//! controller understands. Each symbol owns one inclusive frequency range and
//! the ranges never overlap, so the lookup does not depend on table order.
//!
//! ## Features
//! - Closed alphabet of natural note letters
//! - Table validation (inverted, overlapping and duplicate ranges)
//! - Default ranges calibrated for a soprano recorder at 44.1 kHz

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// A note letter. The configured table decides which of these are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteSymbol {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteSymbol {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteSymbol::C => "C",
            NoteSymbol::D => "D",
            NoteSymbol::E => "E",
            NoteSymbol::F => "F",
            NoteSymbol::G => "G",
            NoteSymbol::A => "A",
            NoteSymbol::B => "B",
        }
    }
}

impl fmt::Display for NoteSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One symbol and the frequencies (Hz, both ends inclusive) that select it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteRange {
    pub symbol: NoteSymbol,
    pub low: f32,
    pub high: f32,
}

impl NoteRange {
    pub const fn new(symbol: NoteSymbol, low: f32, high: f32) -> Self {
        Self { symbol, low, high }
    }

    pub fn contains(&self, frequency: f32) -> bool {
        self.low <= frequency && frequency <= self.high
    }
}

/// Ranges measured with the calibration mode on the reference recorder.
pub const DEFAULT_NOTE_RANGES: [NoteRange; 6] = [
    NoteRange::new(NoteSymbol::C, 500.0, 790.0),
    NoteRange::new(NoteSymbol::A, 800.0, 881.0),
    NoteRange::new(NoteSymbol::D, 900.0, 1000.0),
    NoteRange::new(NoteSymbol::E, 1001.0, 1200.0),
    NoteRange::new(NoteSymbol::F, 1210.0, 1300.0),
    NoteRange::new(NoteSymbol::G, 1310.0, 3000.0),
];

/// A validated symbol → frequency range table.
///
/// Ranges are kept sorted by their lower bound. Gaps between ranges classify
/// as "no note".
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTable {
    ranges: Vec<NoteRange>,
}

impl NoteTable {
    /// Builds a table, rejecting empty, inverted, overlapping or duplicated entries.
    pub fn new(ranges: impl IntoIterator<Item = NoteRange>) -> Result<Self, ConfigError> {
        let mut ranges: Vec<NoteRange> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Err(ConfigError::EmptyNoteTable);
        }

        for range in &ranges {
            if !range.low.is_finite() || !range.high.is_finite() || range.low > range.high {
                return Err(ConfigError::InvalidRange {
                    symbol: range.symbol,
                    low: range.low,
                    high: range.high,
                });
            }
        }

        for (i, range) in ranges.iter().enumerate() {
            if ranges[..i].iter().any(|other| other.symbol == range.symbol) {
                return Err(ConfigError::DuplicateSymbol(range.symbol));
            }
        }

        ranges.sort_by(|a, b| a.low.total_cmp(&b.low));
        // Bounds are inclusive, so touching ranges share a value and overlap too.
        for pair in ranges.windows(2) {
            if pair[1].low <= pair[0].high {
                return Err(ConfigError::OverlappingRanges {
                    first: pair[0].symbol,
                    second: pair[1].symbol,
                });
            }
        }

        Ok(Self { ranges })
    }

    /// Returns the symbol whose range contains `frequency`.
    pub fn classify(&self, frequency: Option<f32>) -> Option<NoteSymbol> {
        let frequency = frequency?;
        self.ranges
            .iter()
            .find(|range| range.contains(frequency))
            .map(|range| range.symbol)
    }

    pub fn ranges(&self) -> &[NoteRange] {
        &self.ranges
    }
}

impl Default for NoteTable {
    fn default() -> Self {
        Self {
            ranges: {
                let mut ranges = DEFAULT_NOTE_RANGES.to_vec();
                ranges.sort_by(|a, b| a.low.total_cmp(&b.low));
                ranges
            },
        }
    }
}
