//! # Note Recognition Loop
//!
//! Runs the analysis pipeline against an audio source on a dedicated thread
//! and hands every completed note to a listener.
//!
//! ## Architecture
//! - **Caller thread**: `start()` opens the source and spawns the worker,
//!   `stop()` signals it and joins.
//! - **Worker thread**: owns the source, pipeline, detector and listener;
//!   blocks on the source, ticks the detector, calls the listener inline.
//! - **Communication**: a crossbeam channel carries the shutdown signal; the
//!   worker state travels back to the caller through the join handle.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::AudioSource;
use crate::config::RecognizerConfig;
use crate::detector::{NoteBoundaryDetector, NoteEvent};
use crate::error::{ConfigError, RecognizerError, Result};
use crate::pipeline::NotePipeline;

/// Pause after a failed read so a broken device doesn't spin the thread.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Source of tick timestamps.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin. Must not decrease.
    fn now(&self) -> Duration;
}

/// Wall-clock time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Receives completed notes, in order, on the recognition thread.
///
/// Calls block the loop, so implementations should return quickly. Errors
/// and panics are logged and swallowed; they never stop recognition.
pub trait NoteListener: Send {
    fn on_note_completed(&mut self, event: &NoteEvent) -> anyhow::Result<()>;
}

impl<F> NoteListener for F
where
    F: FnMut(&NoteEvent) -> anyhow::Result<()> + Send,
{
    fn on_note_completed(&mut self, event: &NoteEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Forwards notes into a channel for consumption on another thread.
#[derive(Debug, Clone)]
pub struct ChannelListener(pub Sender<NoteEvent>);

impl NoteListener for ChannelListener {
    fn on_note_completed(&mut self, event: &NoteEvent) -> anyhow::Result<()> {
        self.0
            .send(*event)
            .map_err(|_| anyhow::anyhow!("note receiver disconnected"))
    }
}

/// Counters for one start/stop run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub blocks_processed: u64,
    pub read_errors: u64,
    pub notes_emitted: u64,
    pub listener_failures: u64,
}

/// Everything the recognition thread owns while running.
struct Worker<S, L> {
    source: S,
    listener: L,
    pipeline: NotePipeline,
    detector: NoteBoundaryDetector,
    clock: Arc<dyn Clock>,
    stats: LoopStats,
}

struct RunningWorker<S, L> {
    shutdown_tx: Sender<()>,
    handle: JoinHandle<Worker<S, L>>,
}

/// Background note recognition over one audio source.
pub struct NoteRecognitionLoop<S, L>
where
    S: AudioSource + Send + 'static,
    L: NoteListener + 'static,
{
    idle: Option<Worker<S, L>>,
    running: Option<RunningWorker<S, L>>,
}

impl<S, L> NoteRecognitionLoop<S, L>
where
    S: AudioSource + Send + 'static,
    L: NoteListener + 'static,
{
    /// Validates `config` against itself and the source. Nothing is opened yet.
    pub fn new(config: &RecognizerConfig, source: S, listener: L) -> Result<Self> {
        config.validate()?;
        if source.sample_rate() != config.sample_rate || source.block_size() != config.block_size {
            return Err(ConfigError::SourceMismatch {
                source_rate: source.sample_rate(),
                source_block: source.block_size(),
                config_rate: config.sample_rate,
                config_block: config.block_size,
            }
            .into());
        }

        let worker = Worker {
            source,
            listener,
            pipeline: NotePipeline::from_config(config)?,
            detector: NoteBoundaryDetector::new(config.timings())?,
            clock: Arc::new(MonotonicClock::new()),
            stats: LoopStats::default(),
        };
        Ok(Self {
            idle: Some(worker),
            running: None,
        })
    }

    /// Replaces the timestamp source. Takes effect on the next `start()`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        if let Some(worker) = self.idle.as_mut() {
            worker.clock = clock;
        }
        self
    }

    /// Opens the source and starts recognizing. Does nothing if already running.
    ///
    /// # Returns
    /// * `Ok(())` - The loop is running
    /// * `Err(RecognizerError::DeviceOpen)` - The source failed to open; the loop
    ///   stays stopped and `start()` may be retried
    /// * `Err(RecognizerError::WorkerLost)` - An earlier run panicked and the
    ///   source was lost with it
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() && !self.is_running() {
            // The thread died on its own; reap it before starting again.
            self.stop();
        }
        if self.running.is_some() {
            debug!("note recognition already running");
            return Ok(());
        }

        let mut worker = self.idle.take().ok_or(RecognizerError::WorkerLost)?;

        if let Err(e) = worker.source.open() {
            error!("could not start note recognition: {}", e);
            self.idle = Some(worker);
            return Err(e);
        }

        worker.pipeline.reset();
        worker.detector.reset();
        worker.stats = LoopStats::default();

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let handle = thread::Builder::new()
            .name("note-recognition".into())
            .spawn(move || worker.run(shutdown_rx))?;

        self.running = Some(RunningWorker { shutdown_tx, handle });
        info!("note recognition started");
        Ok(())
    }

    /// Stops the loop and waits for it to exit.
    ///
    /// A note still in progress is delivered before this returns; no listener
    /// call happens afterwards and the source is closed.
    pub fn stop(&mut self) -> LoopStats {
        let Some(running) = self.running.take() else {
            return LoopStats::default();
        };

        let _ = running.shutdown_tx.send(());
        match running.handle.join() {
            Ok(mut worker) => {
                let stats = std::mem::take(&mut worker.stats);
                self.idle = Some(worker);
                info!("note recognition stopped");
                stats
            }
            Err(_) => {
                error!("note recognition thread panicked");
                LoopStats::default()
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// The listener, while the loop is stopped.
    pub fn listener(&self) -> Option<&L> {
        self.idle.as_ref().map(|worker| &worker.listener)
    }

    /// The audio source, while the loop is stopped.
    pub fn source(&self) -> Option<&S> {
        self.idle.as_ref().map(|worker| &worker.source)
    }
}

impl<S, L> Drop for NoteRecognitionLoop<S, L>
where
    S: AudioSource + Send + 'static,
    L: NoteListener + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S, L> Worker<S, L>
where
    S: AudioSource,
    L: NoteListener,
{
    fn run(mut self, shutdown_rx: Receiver<()>) -> Self {
        debug!("recognition thread running");
        loop {
            // A message or a dropped sender both mean stop.
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            let symbol = match self.source.next_block() {
                Ok(block) => {
                    self.stats.blocks_processed += 1;
                    let analysis = self.pipeline.process(&block);
                    trace!(
                        "volume {:.0}, frequency {:?}, stable {:?}, note {:?}",
                        analysis.volume,
                        analysis.frequency,
                        analysis.stable_frequency,
                        analysis.symbol
                    );
                    analysis.symbol
                }
                Err(e) => {
                    warn!("skipping audio block: {}", e);
                    self.stats.read_errors += 1;
                    thread::sleep(READ_ERROR_BACKOFF);
                    None
                }
            };

            let now = self.clock.now();
            if let Some(event) = self.detector.tick(symbol, now) {
                self.deliver(event);
            }
        }

        if let Some(event) = self.detector.finish() {
            self.deliver(event);
        }
        self.source.close();
        debug!("recognition thread finished: {:?}", self.stats);
        self
    }

    fn deliver(&mut self, event: NoteEvent) {
        info!("note played: {} ({} ms)", event.symbol, event.duration.as_millis());
        self.stats.notes_emitted += 1;

        let listener = &mut self.listener;
        match panic::catch_unwind(AssertUnwindSafe(|| listener.on_note_completed(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("note listener failed: {:#}", e);
                self.stats.listener_failures += 1;
            }
            Err(_) => {
                error!("note listener panicked");
                self.stats.listener_failures += 1;
            }
        }
    }
}
