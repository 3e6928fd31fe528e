//! Command, state, and volume slots shared by the controller and both workers.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::delegate::PlaybackDelegate;
use crate::progress::ProgressRelay;
use crate::sync::{lock, read, write};

/// Observable playback state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

impl PlaybackState {
    fn to_u8(self) -> u8 {
        match self {
            PlaybackState::Idle => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Paused => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Idle,
        }
    }
}

/// Request observed by the consumer loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Command {
    Proceed,
    Pause,
    Stop,
    /// Target position in seconds.
    Seek(f64),
}

const CMD_PROCEED: u8 = 0;
const CMD_PAUSE: u8 = 1;
const CMD_STOP: u8 = 2;
const CMD_SEEK: u8 = 3;

pub(crate) struct Controls {
    command: AtomicU8,
    seek_target: AtomicU64,
    /// Pairs `command` with `seek_target` so a seek is never observed half-written.
    seek_lock: Mutex<()>,
    state: AtomicU8,
    volume: AtomicU64,
    report_progress: AtomicBool,
    download_progress: AtomicU64,
    progress: ProgressRelay,
    delegate: RwLock<Option<Arc<dyn PlaybackDelegate>>>,
}

impl Controls {
    pub(crate) fn new(initial_volume: f64, progress_capacity: usize) -> Self {
        Self {
            command: AtomicU8::new(CMD_PROCEED),
            seek_target: AtomicU64::new(0f64.to_bits()),
            seek_lock: Mutex::new(()),
            state: AtomicU8::new(PlaybackState::Idle.to_u8()),
            volume: AtomicU64::new(initial_volume.to_bits()),
            report_progress: AtomicBool::new(true),
            download_progress: AtomicU64::new(0f64.to_bits()),
            progress: ProgressRelay::new(progress_capacity),
            delegate: RwLock::new(None),
        }
    }

    pub(crate) fn command(&self) -> Command {
        match self.command.load(Ordering::Acquire) {
            CMD_PAUSE => Command::Pause,
            CMD_STOP => Command::Stop,
            CMD_SEEK => {
                let _g = lock(&self.seek_lock);
                match self.command.load(Ordering::Acquire) {
                    CMD_SEEK => {
                        Command::Seek(f64::from_bits(self.seek_target.load(Ordering::Acquire)))
                    }
                    CMD_PAUSE => Command::Pause,
                    CMD_STOP => Command::Stop,
                    _ => Command::Proceed,
                }
            }
            _ => Command::Proceed,
        }
    }

    pub(crate) fn set_command(&self, cmd: Command) {
        let _g = lock(&self.seek_lock);
        let tag = match cmd {
            Command::Proceed => CMD_PROCEED,
            Command::Pause => CMD_PAUSE,
            Command::Stop => CMD_STOP,
            Command::Seek(secs) => {
                self.seek_target.store(secs.to_bits(), Ordering::Release);
                CMD_SEEK
            }
        };
        self.command.store(tag, Ordering::Release);
    }

    /// Consume a pending seek, reverting the slot to `Proceed`.
    pub(crate) fn take_seek(&self) -> Option<f64> {
        let _g = lock(&self.seek_lock);
        if self.command.load(Ordering::Acquire) != CMD_SEEK {
            return None;
        }
        self.command.store(CMD_PROCEED, Ordering::Release);
        Some(f64::from_bits(self.seek_target.load(Ordering::Acquire)))
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.command.load(Ordering::Acquire) == CMD_STOP
    }

    pub(crate) fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn volume(&self) -> f64 {
        f64::from_bits(self.volume.load(Ordering::Acquire))
    }

    pub(crate) fn set_volume(&self, volume: f64) {
        self.volume.store(volume.to_bits(), Ordering::Release);
    }

    pub(crate) fn report_progress(&self) -> bool {
        self.report_progress.load(Ordering::Acquire)
    }

    pub(crate) fn set_report_progress(&self, on: bool) {
        self.report_progress.store(on, Ordering::Release);
    }

    pub(crate) fn download_progress(&self) -> f64 {
        f64::from_bits(self.download_progress.load(Ordering::Acquire))
    }

    pub(crate) fn set_download_progress(&self, fraction: f64) {
        self.download_progress.store(fraction.to_bits(), Ordering::Release);
    }

    pub(crate) fn progress(&self) -> &ProgressRelay {
        &self.progress
    }

    pub(crate) fn set_delegate(&self, delegate: Option<Arc<dyn PlaybackDelegate>>) {
        *write(&self.delegate) = delegate;
    }

    /// Invoke `f` on the current delegate, outside the delegate lock.
    pub(crate) fn notify(&self, f: impl FnOnce(&dyn PlaybackDelegate)) {
        let delegate = read(&self.delegate).clone();
        if let Some(delegate) = delegate {
            f(delegate.as_ref());
        }
    }

    /// Clear per-track counters after the workers quiesced.
    pub(crate) fn reset_transient(&self) {
        self.set_command(Command::Proceed);
        self.set_report_progress(true);
        self.set_download_progress(0.0);
        self.progress.clear();
    }
}
