//! Command surface that wires a downloader and a player onto two worker queues.

use std::io;
use std::sync::{Arc, Mutex};

use crate::config::PlayerConfig;
use crate::controls::{Command, Controls, PlaybackState};
use crate::decode::{FeedDecoder, MpegFeedDecoder};
use crate::delegate::PlaybackDelegate;
use crate::downloader::Downloader;
use crate::net::{HttpTransport, Transport};
use crate::output::{AudioSink, CpalSink};
use crate::player::{Player, VOLUME_EPSILON};
use crate::stream_buffer::StreamBuffer;
use crate::sync::lock;
use crate::task_queue::{TaskQueue, Token};

/// Builds a fresh decoder for each track.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn FeedDecoder> + Send + Sync>;

/// Plays one remote track at a time.
///
/// Each `play_track` call gets its own [`StreamBuffer`], shared by a download job
/// and a playback job running on two dedicated queues. `stop` and `play_track`
/// only return once both jobs of the previous track have finished, so no
/// delegate callback from a torn-down track arrives after they return.
pub struct PlaybackController {
    transport: Arc<dyn Transport>,
    decoders: DecoderFactory,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    controls: Arc<Controls>,
    download_queue: TaskQueue,
    play_queue: TaskQueue,
    token: Token,
    buffer: Mutex<Option<Arc<StreamBuffer>>>,
    chunk_bytes: usize,
}

impl PlaybackController {
    pub fn new(
        transport: Arc<dyn Transport>,
        decoders: DecoderFactory,
        sink: Box<dyn AudioSink>,
        config: &PlayerConfig,
    ) -> io::Result<Self> {
        Ok(Self {
            transport,
            decoders,
            sink: Arc::new(Mutex::new(sink)),
            controls: Arc::new(Controls::new(
                config.initial_volume.clamp(0.0, 1.0),
                config.progress_capacity,
            )),
            download_queue: TaskQueue::new("stream-download")?,
            play_queue: TaskQueue::new("stream-play")?,
            token: Token::new(),
            buffer: Mutex::new(None),
            chunk_bytes: config.chunk_bytes,
        })
    }

    /// HTTP transport, MPEG decoder and the system audio output.
    pub fn with_system_output(config: &PlayerConfig) -> io::Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.http));
        let decoders: DecoderFactory =
            Arc::new(|| -> Box<dyn FeedDecoder> { Box::new(MpegFeedDecoder::new()) });
        let sink = Box::new(CpalSink::new(config.output.clone()));
        Self::new(transport, decoders, sink, config)
    }

    /// Tear down the current track, then start streaming `url`.
    pub fn play_track(&self, url: &str) {
        self.stop();

        let buffer = Arc::new(StreamBuffer::new());
        *lock(&self.buffer) = Some(buffer.clone());
        self.controls.set_state(PlaybackState::Playing);
        tracing::info!(url, "track queued");

        let downloader =
            Downloader::new(self.transport.clone(), buffer.clone(), self.controls.clone());
        let url = url.to_owned();
        self.download_queue
            .schedule_task(move || downloader.run(&url), self.token);

        let player = Player::new(
            buffer,
            self.controls.clone(),
            (self.decoders)(),
            self.sink.clone(),
            self.chunk_bytes,
        );
        self.play_queue.schedule_task(move || player.run(), self.token);
    }

    pub fn pause(&self) {
        self.controls.set_command(Command::Pause);
        self.wake();
    }

    pub fn resume(&self) {
        self.controls.set_command(Command::Proceed);
        self.wake();
    }

    /// Stop the current track and wait for both workers to go quiet.
    ///
    /// A no-op when nothing is playing. Blocks for as long as the network layer
    /// takes to honour the abort.
    pub fn stop(&self) {
        self.controls.set_command(Command::Stop);
        self.wake();
        self.download_queue.wait_idle();
        self.play_queue.wait_idle();

        let had_track = lock(&self.buffer).take().is_some();
        self.controls.reset_transient();
        self.controls.set_state(PlaybackState::Idle);
        if had_track {
            tracing::info!("track stopped");
        }
    }

    /// Jump to `seconds` from the start of the track.
    ///
    /// Ignored by the player when the stream format is not known yet or the
    /// target lies beyond the downloaded bytes.
    pub fn seek(&self, seconds: f64) {
        self.controls.set_report_progress(false);
        self.controls.progress().clear();
        self.controls.set_command(Command::Seek(seconds));
        self.wake();
    }

    /// Set the output volume in `[0, 1]`. Changes below 0.001 are dropped.
    pub fn change_volume(&self, scale: f64) {
        let scale = scale.clamp(0.0, 1.0);
        if (scale - self.controls.volume()).abs() < VOLUME_EPSILON {
            return;
        }
        self.controls.set_volume(scale);
        tracing::debug!(volume = scale, "volume changed");
    }

    /// Oldest unread playback progress in `[0, 1]`, or 0 when none is pending.
    pub fn get_last_progress(&self) -> f64 {
        self.controls.progress().pop_or_zero()
    }

    pub fn in_progress(&self) -> bool {
        self.controls.state() != PlaybackState::Idle
    }

    pub fn state(&self) -> PlaybackState {
        self.controls.state()
    }

    pub fn volume(&self) -> f64 {
        self.controls.volume()
    }

    /// Fraction of the current resource downloaded so far.
    pub fn download_progress(&self) -> f64 {
        self.controls.download_progress()
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn PlaybackDelegate>>) {
        self.controls.set_delegate(delegate);
    }

    fn wake(&self) {
        let buffer = lock(&self.buffer).clone();
        if let Some(buffer) = buffer {
            buffer.wake();
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.controls.set_command(Command::Stop);
        self.wake();
        self.download_queue.unregister(self.token);
        self.play_queue.unregister(self.token);
        self.download_queue.wait_idle();
        self.play_queue.wait_idle();
        self.download_queue.shutdown();
        self.play_queue.shutdown();
        self.controls.set_state(PlaybackState::Idle);
    }
}
