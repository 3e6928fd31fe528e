//! Consumer side: feeds downloaded bytes to the decoder and decoded PCM to the sink.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use crate::controls::{Command, Controls, PlaybackState};
use crate::decode::{AudioFormat, DecodeEvent, FeedDecoder};
use crate::output::AudioSink;
use crate::stream_buffer::StreamBuffer;
use crate::sync::{lock, panic_message};

/// Volume changes smaller than this are not forwarded to the sink.
pub(crate) const VOLUME_EPSILON: f64 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exit {
    EndOfStream,
    Stopped,
    DecodeFailed,
    SinkFailed,
    Panicked,
}

pub(crate) struct Player {
    buffer: Arc<StreamBuffer>,
    controls: Arc<Controls>,
    decoder: Box<dyn FeedDecoder>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    chunk_bytes: usize,
}

/// Per-track loop state.
struct Cursor {
    offset: u64,
    format: Option<AudioFormat>,
    sink_open: bool,
    applied_volume: f64,
    /// A seek was applied and progress stays suppressed until a frame decodes.
    awaiting_frame: bool,
}

impl Player {
    pub(crate) fn new(
        buffer: Arc<StreamBuffer>,
        controls: Arc<Controls>,
        decoder: Box<dyn FeedDecoder>,
        sink: Arc<Mutex<Box<dyn AudioSink>>>,
        chunk_bytes: usize,
    ) -> Self {
        Self {
            buffer,
            controls,
            decoder,
            sink,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Play the buffer until it runs out or a stop is requested.
    ///
    /// Always ends in `Idle` with a `playback_finished` notification.
    pub(crate) fn run(mut self) {
        let sink_handle = self.sink.clone();
        let mut sink = lock(&sink_handle);
        let mut pos = Cursor {
            offset: 0,
            format: None,
            sink_open: false,
            applied_volume: self.controls.volume(),
            awaiting_frame: false,
        };

        let attempt = catch_unwind(AssertUnwindSafe(|| match self.decoder.open() {
            Ok(()) => self.consume(&mut pos, &mut **sink),
            Err(e) => {
                tracing::warn!(error = %e, "decoder open failed");
                Exit::DecodeFailed
            }
        }));
        let exit = attempt.unwrap_or_else(|payload| {
            tracing::error!(panic = %panic_message(&*payload), "playback panicked; ending track");
            Exit::Panicked
        });

        if pos.sink_open {
            if exit == Exit::EndOfStream {
                sink.drain();
            } else {
                sink.close();
            }
        }
        drop(sink);

        tracing::info!(exit = ?exit, offset = pos.offset, "playback finished");
        self.controls.set_state(PlaybackState::Idle);
        self.controls.notify(|d| d.playback_finished());
    }

    fn consume(&mut self, pos: &mut Cursor, sink: &mut dyn AudioSink) -> Exit {
        loop {
            if let Some(secs) = self.controls.take_seek() {
                self.apply_seek(pos, secs);
            }

            let offset = pos.offset;
            let controls = &self.controls;
            let view = self.buffer.wait_until(|v| match controls.command() {
                Command::Stop | Command::Seek(_) => true,
                Command::Pause => controls.state() != PlaybackState::Paused,
                Command::Proceed => {
                    controls.state() == PlaybackState::Paused || v.len > offset || v.finished
                }
            });

            match self.controls.command() {
                Command::Stop => return Exit::Stopped,
                Command::Seek(_) => continue,
                Command::Pause => {
                    if self.controls.state() != PlaybackState::Paused {
                        self.controls.set_state(PlaybackState::Paused);
                        tracing::debug!(offset = pos.offset, "playback paused");
                    }
                    continue;
                }
                Command::Proceed => {}
            }
            if self.controls.state() == PlaybackState::Paused {
                self.controls.set_state(PlaybackState::Playing);
                tracing::debug!(offset = pos.offset, "playback resumed");
            }

            let chunk = self.buffer.read_at(pos.offset, self.chunk_bytes);
            if chunk.is_empty() {
                if view.finished && view.len <= pos.offset {
                    return Exit::EndOfStream;
                }
                continue;
            }
            pos.offset += chunk.len() as u64;
            if let Err(e) = self.decoder.feed(&chunk) {
                tracing::warn!(error = %e, "decoder rejected input");
                return Exit::DecodeFailed;
            }

            if let Some(exit) = self.drain_decoder(pos, sink) {
                return exit;
            }
            self.publish_progress(pos.offset);
        }
    }

    /// Hand every frame the decoder can currently produce to the sink.
    fn drain_decoder(&mut self, pos: &mut Cursor, sink: &mut dyn AudioSink) -> Option<Exit> {
        loop {
            if self.controls.is_stopping() {
                return Some(Exit::Stopped);
            }
            let event = match self.decoder.decode_next() {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "decode error; ending track");
                    return Some(Exit::DecodeFailed);
                }
            };
            match event {
                DecodeEvent::NeedMoreInput => return None,
                DecodeEvent::NewFormat(format) => {
                    if pos.sink_open {
                        sink.close();
                        pos.sink_open = false;
                    }
                    if !sink.open(format.bits_per_sample, format.channels, format.sample_rate) {
                        tracing::warn!(format = ?format, "audio sink open failed; ending track");
                        return Some(Exit::SinkFailed);
                    }
                    pos.sink_open = true;
                    pos.format = Some(format);
                    pos.applied_volume = self.controls.volume();
                    sink.set_volume(pos.applied_volume);
                    self.controls.set_state(PlaybackState::Playing);
                    tracing::info!(
                        channels = format.channels,
                        rate = format.sample_rate,
                        bits = format.bits_per_sample,
                        "playback started"
                    );
                    self.controls.notify(|d| d.playback_started());
                }
                DecodeEvent::Frame(pcm) => {
                    if pos.awaiting_frame {
                        // First frame after a seek confirms the new position.
                        pos.awaiting_frame = false;
                        self.controls.set_report_progress(true);
                    }
                    let volume = self.controls.volume();
                    if (volume - pos.applied_volume).abs() >= VOLUME_EPSILON {
                        sink.set_volume(volume);
                        pos.applied_volume = volume;
                    }
                    if pos.sink_open && !sink.write(&pcm) {
                        tracing::warn!("audio sink rejected samples; ending track");
                        return Some(Exit::SinkFailed);
                    }
                }
            }
        }
    }

    fn publish_progress(&self, offset: u64) {
        if !self.controls.report_progress() {
            return;
        }
        let Some(total) = self.buffer.expected_total() else {
            return;
        };
        let fraction = (offset as f64 / total as f64).min(1.0);
        self.controls.progress().publish(fraction);
        self.controls.notify(|d| d.playback_progress());
    }

    fn apply_seek(&mut self, pos: &mut Cursor, secs: f64) {
        if !secs.is_finite() {
            tracing::debug!(secs, "seek to a non-finite time; ignored");
            self.controls.set_report_progress(true);
            return;
        }
        let Some(format) = pos.format else {
            tracing::debug!(secs, "seek before format is known; ignored");
            self.controls.set_report_progress(true);
            return;
        };
        let sample = (f64::from(format.sample_rate) * secs.max(0.0)) as u64;
        let committed = self.buffer.len();
        match self.decoder.feed_seek(sample) {
            Some(target) if target <= committed => {
                self.decoder.restart_at(target);
                tracing::debug!(secs, from = pos.offset, to = target, "seek applied");
                pos.offset = target;
                pos.awaiting_frame = true;
            }
            other => {
                tracing::debug!(secs, target = ?other, committed, "seek out of range; ignored");
                self.controls.set_report_progress(true);
            }
        }
    }
}
