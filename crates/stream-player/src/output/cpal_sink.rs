//! [`AudioSink`] backed by a CPAL output stream.
//!
//! CPAL streams are not `Send`, so each opened sink owns a dedicated output
//! thread that builds the stream, keeps it alive, and drops it on close. PCM
//! written by the player is converted to `f32`, resampled when the device cannot
//! run at the source rate, and queued for the device callback.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded};

use super::AudioSink;
use super::device::{pick_buffer_size, pick_device, pick_output_config};
use super::queue::{SampleQueue, calc_max_buffered_samples};
use super::resample::StreamResampler;
use crate::config::OutputConfig;

pub struct CpalSink {
    cfg: OutputConfig,
    gain: Arc<AtomicU32>,
    active: Option<ActiveOutput>,
}

struct ActiveOutput {
    queue: Arc<SampleQueue>,
    bits: u16,
    src_channels: usize,
    device_rate: u32,
    resampler: Option<StreamResampler>,
    shutdown_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// What the output thread reports once its stream is running.
struct StreamReady {
    queue: Arc<SampleQueue>,
    device_rate: u32,
    device_channels: u16,
}

impl CpalSink {
    pub fn new(cfg: OutputConfig) -> Self {
        Self {
            cfg,
            gain: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            active: None,
        }
    }

    fn start(&self, bits: u16, channels: u16, sample_rate: u32) -> Result<ActiveOutput> {
        if !matches!(bits, 8 | 16 | 24 | 32) {
            return Err(anyhow!("unsupported PCM bit depth: {bits}"));
        }
        let src_channels = usize::from(channels.max(1));
        let (ready_tx, ready_rx) = bounded::<Result<StreamReady, String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let cfg = self.cfg.clone();
        let gain = self.gain.clone();
        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                output_thread(cfg, src_channels, sample_rate, gain, ready_tx, shutdown_rx)
            })?;

        let ready = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(msg)) => {
                let _ = thread.join();
                return Err(anyhow!(msg));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(anyhow!("audio output thread exited during setup"));
            }
        };

        let resampler = if ready.device_rate != sample_rate {
            match StreamResampler::new(
                sample_rate,
                ready.device_rate,
                src_channels,
                self.cfg.resample_chunk_frames,
            ) {
                Ok(rs) => Some(rs),
                Err(e) => {
                    ready.queue.close();
                    let _ = shutdown_tx.send(());
                    let _ = thread.join();
                    return Err(e);
                }
            }
        } else {
            None
        };
        tracing::info!(
            bits,
            channels,
            src_rate = sample_rate,
            device_rate = ready.device_rate,
            device_channels = ready.device_channels,
            resampling = resampler.is_some(),
            "audio output opened"
        );

        Ok(ActiveOutput {
            queue: ready.queue,
            bits,
            src_channels,
            device_rate: ready.device_rate,
            resampler,
            shutdown_tx,
            thread,
        })
    }

    fn stop_active(&mut self, drain: bool) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        if drain {
            if let Some(rs) = active.resampler.as_mut() {
                match rs.flush() {
                    Ok(tail) => {
                        active.queue.push_blocking(&tail);
                    }
                    Err(e) => tracing::warn!("resampler flush error: {e:#}"),
                }
            }
            let frames = active.queue.len_frames() as f64;
            let timeout = Duration::from_secs_f64(frames / f64::from(active.device_rate.max(1)))
                + Duration::from_millis(500);
            if !active.queue.wait_drained(timeout) {
                tracing::warn!("audio output did not drain in time");
            }
        }
        active.queue.close();
        let _ = active.shutdown_tx.send(());
        if active.thread.join().is_err() {
            tracing::error!("audio output thread panicked");
        }
        tracing::debug!(drained = drain, "audio output closed");
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop_active(false);
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, bits_per_sample: u16, channels: u16, sample_rate: u32) -> bool {
        self.stop_active(false);
        match self.start(bits_per_sample, channels, sample_rate) {
            Ok(active) => {
                self.active = Some(active);
                true
            }
            Err(e) => {
                tracing::warn!("audio output open failed: {e:#}");
                false
            }
        }
    }

    fn write(&mut self, pcm: &[u8]) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let samples = pcm_to_f32(pcm, active.bits);
        let samples = match active.resampler.as_mut() {
            Some(rs) => match rs.process(&samples) {
                Ok(out) => out,
                Err(e) => {
                    tracing::warn!("resampler process error: {e:#}");
                    return false;
                }
            },
            None => samples,
        };
        debug_assert_eq!(active.queue.channels(), active.src_channels);
        active.queue.push_blocking(&samples)
    }

    fn close(&mut self) {
        self.stop_active(false);
    }

    fn set_volume(&mut self, scale: f64) {
        self.gain.store((scale.clamp(0.0, 1.0) as f32).to_bits(), Ordering::Relaxed);
    }

    fn drain(&mut self) {
        self.stop_active(true);
    }
}

fn output_thread(
    cfg: OutputConfig,
    src_channels: usize,
    src_rate: u32,
    gain: Arc<AtomicU32>,
    ready_tx: Sender<Result<StreamReady, String>>,
    shutdown_rx: Receiver<()>,
) {
    let stream = match build_for_device(&cfg, src_channels, src_rate, gain) {
        Ok((stream, ready)) => {
            let _ = ready_tx.send(Ok(ready));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(format!("{e:#}")));
            return;
        }
    };
    // Closed or disconnected both mean tear down.
    let _ = shutdown_rx.recv();
    drop(stream);
}

fn build_for_device(
    cfg: &OutputConfig,
    src_channels: usize,
    src_rate: u32,
    gain: Arc<AtomicU32>,
) -> Result<(cpal::Stream, StreamReady)> {
    let host = cpal::default_host();
    let device = pick_device(&host, cfg.device.as_deref())?;
    let supported = pick_output_config(&device, src_rate)?;
    let sample_format = supported.sample_format();
    let mut config: cpal::StreamConfig = supported.config();
    if let Some(size) = pick_buffer_size(&supported) {
        config.buffer_size = size;
    }
    let device_rate = config.sample_rate;

    let queue = Arc::new(SampleQueue::new(
        src_channels,
        calc_max_buffered_samples(device_rate, src_channels, cfg.buffer_seconds),
    ));
    let stream = build_output_stream(
        &device,
        &config,
        sample_format,
        &queue,
        gain,
        cfg.refill_max_frames,
    )?;
    stream.play()?;

    Ok((
        stream,
        StreamReady {
            queue,
            device_rate,
            device_channels: config.channels,
        },
    ))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    gain: Arc<AtomicU32>,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, queue, gain, refill_max_frames)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, queue, gain, refill_max_frames)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, queue, gain, refill_max_frames)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, queue, gain, refill_max_frames)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    gain: Arc<AtomicU32>,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = usize::from(config.channels.max(1));
    let refill_max_frames = refill_max_frames.max(1);
    let queue_cb = queue.clone();
    let mut local = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let g = f32::from_bits(gain.load(Ordering::Relaxed));
            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if local.pos >= local.src.len() {
                    local.pos = 0;
                    match queue_cb.pop_up_to(refill_max_frames) {
                        Some(v) => local.src = v,
                        None => {
                            local.src.clear();
                            data[frame * channels_out..]
                                .fill(<T as cpal::Sample>::from_sample::<f32>(0.0));
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let s = next_sample_mapped(&mut local, channels_out, ch) * g;
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample::<f32>(s);
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Samples pulled from the queue but not yet handed to the device.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Next output sample for `dst_ch`, mapping mono and stereo in either direction.
///
/// `pos` advances once per destination frame, after its last channel.
fn next_sample_mapped(st: &mut LocalBuffer, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }
    let frame_start = st.pos;
    let get = |ch: usize, st: &LocalBuffer| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };
    let out = match (st.src_channels, dst_channels) {
        (2, 1) => 0.5 * (get(0, st) + get(1, st)),
        (1, _) => get(0, st),
        _ => get(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };
    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}

/// Decode interleaved native-endian signed PCM (unsigned for 8-bit) into `f32`.
fn pcm_to_f32(pcm: &[u8], bits: u16) -> Vec<f32> {
    match bits {
        8 => pcm.iter().map(|b| (f32::from(*b) - 128.0) / 128.0).collect(),
        16 => pcm
            .chunks_exact(2)
            .map(|c| f32::from(i16::from_ne_bytes([c[0], c[1]])) / 32_768.0)
            .collect(),
        24 => pcm
            .chunks_exact(3)
            .map(|c| {
                let raw = if cfg!(target_endian = "little") {
                    i32::from_le_bytes([0, c[0], c[1], c[2]])
                } else {
                    i32::from_be_bytes([c[0], c[1], c[2], 0])
                };
                (raw >> 8) as f32 / 8_388_608.0
            })
            .collect(),
        32 => pcm
            .chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        _ => Vec::new(),
    }
}
