//! # recorder-listen
//!
//! Headless front end for the recorder note controller. Listens to the default
//! input device and writes one JSON command per completed note to stdout,
//! e.g. `{"action":"move_up"}`, for a relay process to forward.
//!
//! ## Modes
//! - **Listen** (default): note recognition → commands on stdout
//! - **Calibrate**: per-block volume, raw frequency and note, to tune the note table
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level).

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use recorder_core::{
    pipeline::NotePipeline, pitch::FrequencyEstimator, stabilizer::FrequencyStabilizer, AudioSource, Command,
    CpalSource, NoteEvent, NoteRecognitionLoop, RecognizerConfig,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON recognizer config; the built-in recorder calibration when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Write the default config to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Print per-block volume and frequency instead of sending commands
    #[arg(long)]
    calibrate: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.write_config {
        RecognizerConfig::default()
            .save(path)
            .with_context(|| format!("could not write config to {}", path.display()))?;
        info!("wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => RecognizerConfig::load(path)
            .with_context(|| format!("could not load config from {}", path.display()))?,
        None => RecognizerConfig::default(),
    };

    info!("note mappings:");
    for range in &config.notes {
        info!("  {}: {}-{} Hz", range.symbol, range.low, range.high);
    }

    let source = CpalSource::new(config.sample_rate, config.block_size);
    if args.calibrate {
        calibrate(&config, source)
    } else {
        listen(&config, source)
    }
}

/// Runs note recognition until Enter (or EOF) on stdin.
fn listen(config: &RecognizerConfig, source: CpalSource) -> Result<()> {
    let listener = |event: &NoteEvent| -> Result<()> {
        match Command::for_note(event.symbol) {
            Some(command) => {
                info!("note {} ({} ms) -> {:?}", event.symbol, event.duration.as_millis(), command);
                write_command(command)
            }
            None => {
                warn!("no command bound to note {}", event.symbol);
                Ok(())
            }
        }
    };

    let mut recognizer = NoteRecognitionLoop::new(config, source, listener)?;
    recognizer
        .start()
        .context("note recognition could not start")?;

    info!("play your recorder notes; press Enter to stop");
    wait_for_enter();

    let stats = recognizer.stop();
    write_command(Command::Exit)?;
    info!(
        "stopped after {} blocks: {} notes, {} read errors, {} listener failures",
        stats.blocks_processed, stats.notes_emitted, stats.read_errors, stats.listener_failures
    );
    Ok(())
}

/// Prints what the recognizer hears, block by block, until Enter.
fn calibrate(config: &RecognizerConfig, mut source: CpalSource) -> Result<()> {
    // Report the full spectrum range so out-of-range notes are visible too.
    let estimator = FrequencyEstimator::new(
        config.sample_rate,
        config.block_size,
        config.volume_floor,
        0.0,
        config.sample_rate as f32 / 2.0,
    );
    let mut pipeline = NotePipeline::new(estimator, FrequencyStabilizer::new(1), config.note_table()?);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            wait_for_enter();
            stop.store(true, Ordering::SeqCst);
        });
    }

    source.open().context("could not open audio input")?;
    info!("play each note steadily; press Enter to stop");

    while !stop.load(Ordering::SeqCst) {
        match source.next_block() {
            Ok(block) => {
                let analysis = pipeline.process(&block);
                let frequency = analysis
                    .frequency
                    .map_or_else(|| "-".to_string(), |f| format!("{f:.1} Hz"));
                let note = analysis.symbol.map_or("-", |s| s.as_str());
                println!("volume {:>7.0} | {:>10} | {}", analysis.volume, frequency, note);
            }
            Err(e) => warn!("{}", e),
        }
    }

    source.close();
    Ok(())
}

fn write_command(command: Command) -> Result<()> {
    let line = command.to_json_line()?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(line.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn wait_for_enter() {
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
