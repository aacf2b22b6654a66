//! # Audio Capture Module
//!
//! This module defines the block-oriented audio input the recognizer consumes
//! and a CPAL-backed implementation for the default input device.
//!
//! ## Features
//! - `AudioSource` trait: open, blocking block reads, close
//! - Default input device capture with i16 or f32 sample formats
//! - Re-chunking of device callbacks into fixed-size blocks
//! - Stream ownership on a dedicated capture thread

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{RecognizerError, Result};

/// Default capture rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Default number of samples per block (~93 ms at 44.1 kHz).
///
/// Larger blocks give finer frequency bins but delay note detection.
pub const BLOCK_SIZE: usize = 4096;

/// Blocks buffered between the device callback and the reader.
const QUEUE_DEPTH: usize = 32;

/// Longest a read waits for the device before reporting a transient error.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// One fixed-size block of mono 16-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlock {
    samples: Arc<[i16]>,
}

impl AudioBlock {
    /// Wraps samples without copying them again when cloned.
    ///
    /// # Arguments
    /// * `samples` - Mono 16-bit samples, e.g. a `Vec<i16>`
    pub fn new(samples: impl Into<Arc<[i16]>>) -> Self {
        Self { samples: samples.into() }
    }

    /// The samples in capture order.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for a block without samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A producer of fixed-size audio blocks.
///
/// Sample rate and block size are fixed when the source is created.
pub trait AudioSource {
    /// Acquires the device. Failure here is fatal to the caller's `start()`.
    fn open(&mut self) -> Result<()>;

    /// Blocks until the next block is available.
    ///
    /// Errors are transient: the caller may keep reading.
    fn next_block(&mut self) -> Result<AudioBlock>;

    /// Releases the device. Safe to call when not open.
    fn close(&mut self);

    fn sample_rate(&self) -> u32;

    fn block_size(&self) -> usize;
}

/// Live capture from the default input device.
///
/// CPAL streams can't move between threads, so the stream is built and kept
/// alive on a capture thread; blocks reach the reader through a channel.
#[derive(Debug)]
pub struct CpalSource {
    sample_rate: u32,
    block_size: usize,
    capture: Option<CaptureThread>,
}

#[derive(Debug)]
struct CaptureThread {
    blocks: Receiver<Vec<i16>>,
    shutdown_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl CpalSource {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
            capture: None,
        }
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new(SAMPLE_RATE, BLOCK_SIZE)
    }
}

impl AudioSource for CpalSource {
    fn open(&mut self) -> Result<()> {
        if self.capture.is_some() {
            return Ok(());
        }

        let (block_tx, block_rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let (sample_rate, block_size) = (self.sample_rate, self.block_size);

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match start_stream(block_tx, sample_rate, block_size) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until asked to stop (or the source is dropped).
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    warn!("error pausing input stream: {}", e);
                }
                drop(stream);
                debug!("capture thread finished");
            })
            .map_err(|e| RecognizerError::DeviceOpen(format!("could not spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.capture = Some(CaptureThread {
                    blocks: block_rx,
                    shutdown_tx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(RecognizerError::DeviceOpen("capture thread exited during setup".into()))
            }
        }
    }

    fn next_block(&mut self) -> Result<AudioBlock> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| RecognizerError::Read("audio source is not open".into()))?;

        match capture.blocks.recv_timeout(READ_TIMEOUT) {
            Ok(samples) => Ok(AudioBlock::new(samples)),
            Err(RecvTimeoutError::Timeout) => {
                Err(RecognizerError::Read(format!("no audio within {READ_TIMEOUT:?}")))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(RecognizerError::Read("input stream closed".into()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            let _ = capture.shutdown_tx.send(());
            if capture.handle.join().is_err() {
                error!("capture thread panicked");
            }
            info!("audio input closed");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens the default input device and starts streaming blocks into `sender`.
fn start_stream(sender: Sender<Vec<i16>>, sample_rate: u32, block_size: usize) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RecognizerError::DeviceOpen("no input device available".into()))?;

    info!("using audio input device: {}", device.name().map_err(open_err)?);

    let configs = device
        .supported_input_configs()
        .map_err(open_err)?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, sample_rate).ok_or_else(|| {
        RecognizerError::DeviceOpen(format!("no i16/f32 input format supports {sample_rate} Hz"))
    })?;

    let format = supported_config.sample_format();
    let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    info!("capturing {} Hz, {} channel(s), {:?}", sample_rate, channels, format);

    let stream = match format {
        SampleFormat::I16 => build_stream::<i16, _>(&device, &config, sender, channels, block_size, |s| s),
        SampleFormat::F32 => build_stream::<f32, _>(&device, &config, sender, channels, block_size, f32_to_i16),
        other => return Err(RecognizerError::DeviceOpen(format!("unsupported sample format {other:?}"))),
    }?;

    stream.play().map_err(open_err)?;
    Ok(stream)
}

fn build_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sender: Sender<Vec<i16>>,
    channels: usize,
    block_size: usize,
    convert: F,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    F: Fn(T) -> i16 + Send + 'static,
{
    // This buffer accumulates callback data until a full block is available.
    let mut audio_buffer: Vec<i16> = Vec::with_capacity(block_size * 2);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Only the first channel of each frame is used.
                audio_buffer.extend(data.chunks(channels.max(1)).map(|frame| convert(frame[0])));

                while audio_buffer.len() >= block_size {
                    let block: Vec<i16> = audio_buffer.drain(..block_size).collect();
                    // Drop the block if the reader is behind.
                    let _ = sender.try_send(block);
                }
            },
            |err| error!("an error occurred on the audio stream: {}", err),
            None,
        )
        .map_err(open_err)
}

fn open_err(e: impl std::fmt::Display) -> RecognizerError {
    RecognizerError::DeviceOpen(e.to_string())
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Picks a config that can run at `target_rate`, preferring native i16 and
/// fewer channels.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| (c.sample_format() != SampleFormat::I16, c.channels()))
}
