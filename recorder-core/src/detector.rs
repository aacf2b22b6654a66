//! # Note Boundary Detection
//!
//! Turns the per-block stream of classified symbols into completed notes.
//!
//! The detector is either idle or tracking one active run of a symbol. A run
//! ends when a different symbol is detected, or when nothing has been
//! detected for `silence_threshold`. Short gaps (dropouts from breathing or
//! tonguing) keep the run alive and runs shorter than `min_note` are dropped.
//! The same symbol coming back always continues its run.
//!
//! Timestamps are offsets from an arbitrary origin and must not decrease.

use log::{debug, trace};
use std::time::Duration;

use crate::error::ConfigError;
use crate::notes::NoteSymbol;

/// Debounce durations, fixed for the lifetime of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorTimings {
    /// Shortest run that counts as a played note.
    pub min_note: Duration,
    /// Gaps shorter than this are dropouts inside a note.
    pub dropout_tolerance: Duration,
    /// A gap this long ends the note.
    pub silence_threshold: Duration,
}

impl DetectorTimings {
    /// Checks that a gap can be a dropout before it becomes silence.
    ///
    /// # Returns
    /// * `Ok(())` - `silence_threshold` is at least `dropout_tolerance`
    /// * `Err(ConfigError::SilenceBelowDropout)` - The bands are inverted
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.silence_threshold < self.dropout_tolerance {
            return Err(ConfigError::SilenceBelowDropout {
                silence_ms: self.silence_threshold.as_millis(),
                dropout_ms: self.dropout_tolerance.as_millis(),
            });
        }
        Ok(())
    }
}

impl Default for DetectorTimings {
    fn default() -> Self {
        Self {
            min_note: Duration::from_millis(50),
            dropout_tolerance: Duration::from_millis(50),
            silence_threshold: Duration::from_millis(100),
        }
    }
}

/// A completed note, handed to the listener exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub symbol: NoteSymbol,
    /// Time from the first to the closing detection, never below `min_note`.
    pub duration: Duration,
    /// Timestamp of the first detection of the run.
    pub started_at: Duration,
}

/// The run currently being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNote {
    pub symbol: NoteSymbol,
    pub started_at: Duration,
}

/// Detector state: the active run (if any) and when a symbol was last seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteSession {
    pub active: Option<ActiveNote>,
    pub last_seen: Duration,
}

/// How a gap in detection is being treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gap {
    Dropout,
    Tolerated,
    Silence,
}

#[derive(Debug, Clone)]
pub struct NoteBoundaryDetector {
    timings: DetectorTimings,
    session: NoteSession,
}

impl NoteBoundaryDetector {
    /// Creates an idle detector.
    ///
    /// # Arguments
    /// * `timings` - Debounce durations, validated here
    pub fn new(timings: DetectorTimings) -> Result<Self, ConfigError> {
        timings.validate()?;
        Ok(Self {
            timings,
            session: NoteSession::default(),
        })
    }

    /// Feeds one classification and returns the note it completed, if any.
    ///
    /// # Arguments
    /// * `symbol` - The note heard in this block, or `None` for no note
    /// * `now` - Timestamp of the block; never earlier than the previous tick
    ///
    /// # Returns
    /// * `Some(event)` - The tick closed a run that lasted at least `min_note`
    /// * `None` - Nothing completed; at most one note is completed per tick
    pub fn tick(&mut self, symbol: Option<NoteSymbol>, now: Duration) -> Option<NoteEvent> {
        let Some(active) = self.session.active else {
            if let Some(symbol) = symbol {
                self.begin(symbol, now);
            }
            return None;
        };

        if symbol == Some(active.symbol) {
            // The run continues however long the gap since it was last heard.
            self.session.last_seen = now;
            return None;
        }

        // Silence ends the run at its last detection, even when the gap held
        // no empty ticks and a new symbol is what revealed it.
        if self.gap(now) == Gap::Silence {
            let event = self.finish();
            if let Some(symbol) = symbol {
                self.begin(symbol, now);
            }
            return event;
        }

        match symbol {
            None => {
                trace!("gap of {:?} treated as {:?}", self.silence_at(now), self.gap(now));
                None
            }
            Some(symbol) => {
                let event = self.completed(active, now.saturating_sub(active.started_at));
                debug!("note changed {} -> {}", active.symbol, symbol);
                self.begin(symbol, now);
                event
            }
        }
    }

    /// Closes the active run as if silence had just been confirmed.
    pub fn finish(&mut self) -> Option<NoteEvent> {
        let active = self.session.active.take()?;
        self.completed(active, self.session.last_seen.saturating_sub(active.started_at))
    }

    /// Current run and last detection time.
    pub fn session(&self) -> &NoteSession {
        &self.session
    }

    pub fn timings(&self) -> &DetectorTimings {
        &self.timings
    }

    /// Drops any run in progress without emitting it.
    pub fn reset(&mut self) {
        self.session = NoteSession::default();
    }

    fn begin(&mut self, symbol: NoteSymbol, now: Duration) {
        debug!("note started: {} at {:?}", symbol, now);
        self.session.active = Some(ActiveNote { symbol, started_at: now });
        self.session.last_seen = now;
    }

    fn silence_at(&self, now: Duration) -> Duration {
        now.saturating_sub(self.session.last_seen)
    }

    fn gap(&self, now: Duration) -> Gap {
        let silence = self.silence_at(now);
        if silence < self.timings.dropout_tolerance {
            Gap::Dropout
        } else if silence < self.timings.silence_threshold {
            Gap::Tolerated
        } else {
            Gap::Silence
        }
    }

    fn completed(&self, active: ActiveNote, duration: Duration) -> Option<NoteEvent> {
        if duration < self.timings.min_note {
            debug!("discarding {} after {:?}: too short", active.symbol, duration);
            return None;
        }
        Some(NoteEvent {
            symbol: active.symbol,
            duration,
            started_at: active.started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use NoteSymbol::{A, B, C, D, E, F, G};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn detector() -> NoteBoundaryDetector {
        NoteBoundaryDetector::new(DetectorTimings::default()).unwrap()
    }

    /// Runs a scripted `(symbol, millis)` sequence and collects every emission.
    fn run(detector: &mut NoteBoundaryDetector, script: &[(Option<NoteSymbol>, u64)]) -> Vec<NoteEvent> {
        script
            .iter()
            .filter_map(|&(symbol, at)| detector.tick(symbol, ms(at)))
            .collect()
    }

    fn event(symbol: NoteSymbol, started_at: u64, duration: u64) -> NoteEvent {
        NoteEvent {
            symbol,
            duration: ms(duration),
            started_at: ms(started_at),
        }
    }

    #[test]
    fn silence_below_dropout_is_a_configuration_error() {
        let timings = DetectorTimings {
            min_note: ms(50),
            dropout_tolerance: ms(80),
            silence_threshold: ms(60),
        };
        assert_eq!(
            NoteBoundaryDetector::new(timings).unwrap_err(),
            ConfigError::SilenceBelowDropout { silence_ms: 60, dropout_ms: 80 }
        );
    }

    #[test]
    fn note_of_exactly_min_duration_is_emitted() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(C), 0), (Some(C), 50), (None, 100), (None, 150)]);
        assert_eq!(events, vec![event(C, 0, 50)]);
    }

    #[test]
    fn note_just_under_min_duration_is_dropped() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(C), 0), (Some(C), 49), (None, 100), (None, 149)]);
        assert!(events.is_empty());
        assert_eq!(det.session().active, None);

        // Same by a symbol change.
        let mut det = detector();
        let events = run(&mut det, &[(Some(C), 0), (Some(D), 49)]);
        assert!(events.is_empty());
        assert_eq!(det.session().active, Some(ActiveNote { symbol: D, started_at: ms(49) }));
    }

    #[test]
    fn short_dropout_does_not_split_a_note() {
        let mut det = detector();
        let events = run(
            &mut det,
            &[
                (Some(A), 0),
                (Some(A), 40),
                (None, 65), // 25 ms without a detection
                (Some(A), 70),
                (Some(A), 120),
                (None, 170),
                (None, 220),
            ],
        );
        assert_eq!(events, vec![event(A, 0, 120)]);
    }

    #[test]
    fn tolerance_band_keeps_the_note_alive() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(E), 0), (Some(E), 60), (None, 120), (None, 150)]);
        assert!(events.is_empty());
        assert!(det.session().active.is_some());
        assert_eq!(run(&mut det, &[(Some(E), 155), (Some(E), 200)]), vec![]);
        assert_eq!(det.finish(), Some(event(E, 0, 200)));
    }

    #[test]
    fn silence_closes_at_last_detection() {
        let mut det = detector();
        let events = run(
            &mut det,
            &[(Some(G), 0), (Some(G), 93), (None, 186), (None, 279), (Some(F), 372), (Some(F), 465)],
        );
        // G closed at 279 ms but lasted only until its last detection at 93 ms.
        assert_eq!(events, vec![event(G, 0, 93)]);
        assert_eq!(det.finish(), Some(event(F, 372, 93)));
    }

    #[test]
    fn symbol_change_closes_at_the_change() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(C), 0), (Some(C), 60), (Some(D), 90), (Some(D), 200)]);
        assert_eq!(events, vec![event(C, 0, 90)]);
        assert_eq!(det.session().active, Some(ActiveNote { symbol: D, started_at: ms(90) }));
    }

    #[test]
    fn scripted_phrase_with_silence_between_notes() {
        let mut det = detector();
        let events = run(
            &mut det,
            &[(Some(A), 0), (Some(A), 60), (None, 110), (Some(B), 200), (Some(B), 260)],
        );
        assert_eq!(events, vec![event(A, 0, 60)]);
        // B is still pending until the next qualifying tick or a flush.
        assert_eq!(det.session().active, Some(ActiveNote { symbol: B, started_at: ms(200) }));
        assert_eq!(det.finish(), Some(event(B, 200, 60)));
        assert_eq!(det.finish(), None);
    }

    #[test]
    fn returning_symbol_continues_the_run_after_a_long_gap() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(C), 0), (Some(C), 80), (Some(C), 300), (Some(C), 380)]);
        assert!(events.is_empty());
        assert_eq!(det.session().active, Some(ActiveNote { symbol: C, started_at: ms(0) }));
        assert_eq!(det.finish(), Some(event(C, 0, 380)));
    }

    #[test]
    fn sustained_note_at_block_spacing_is_one_event() {
        // 4096 samples at 44.1 kHz arrive about every 93 ms.
        let mut det = detector();
        let events = run(
            &mut det,
            &[(Some(A), 0), (Some(A), 93), (None, 186), (Some(A), 279), (Some(A), 372)],
        );
        assert!(events.is_empty());
        assert_eq!(det.finish(), Some(event(A, 0, 372)));

        // Jitter pushing a block past the silence threshold.
        let mut det = detector();
        let events = run(&mut det, &[(Some(A), 0), (Some(A), 93), (Some(A), 194), (Some(A), 287)]);
        assert!(events.is_empty());
        assert_eq!(det.finish(), Some(event(A, 0, 287)));
    }

    #[test]
    fn new_symbol_after_a_long_gap_closes_at_last_detection() {
        let mut det = detector();
        let events = run(&mut det, &[(Some(D), 0), (Some(D), 70), (Some(E), 300)]);
        assert_eq!(events, vec![event(D, 0, 70)]);
        assert_eq!(det.session().active, Some(ActiveNote { symbol: E, started_at: ms(300) }));
    }

    #[test]
    fn idle_silence_is_a_no_op() {
        let mut det = detector();
        assert!(run(&mut det, &[(None, 0), (None, 500), (None, 1000)]).is_empty());
        assert_eq!(*det.session(), NoteSession::default());
        assert_eq!(det.finish(), None);
    }

    #[test]
    fn each_note_is_emitted_once() {
        let mut det = detector();
        let mut script = vec![(Some(D), 0), (Some(D), 100)];
        script.extend((2..20).map(|i| (None, i * 100)));
        assert_eq!(run(&mut det, &script), vec![event(D, 0, 100)]);
        assert_eq!(det.finish(), None);
    }
}
