//! Bounded queue of interleaved `f32` samples between `AudioSink::write` and the
//! device callback.
//!
//! The writer blocks while the queue is full, which paces decoding to real time.
//! The callback side never blocks.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::sync::{lock, wait};

pub(crate) struct SampleQueue {
    channels: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct QueueInner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// Queue capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive targets fall back to two seconds.
pub(crate) fn calc_max_buffered_samples(
    rate_hz: u32,
    channels: usize,
    buffer_seconds: f32,
) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SampleQueue {
    pub(crate) fn new(channels: usize, max_buffered_samples: usize) -> Self {
        Self {
            channels: channels.max(1),
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(1),
        }
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    pub(crate) fn len_frames(&self) -> usize {
        lock(&self.inner).samples.len() / self.channels
    }

    /// Stop accepting samples and wake every waiter. Idempotent.
    pub(crate) fn close(&self) {
        let mut g = lock(&self.inner);
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Append samples, blocking while the queue is full.
    ///
    /// Returns false if the queue was closed before everything was queued.
    pub(crate) fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = lock(&self.inner);
            while g.samples.len() >= self.max_buffered_samples && !g.closed {
                g = wait(&self.cv, g);
            }
            if g.closed {
                return false;
            }
            let room = self.max_buffered_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Take up to `max_frames` whole frames without blocking.
    pub(crate) fn pop_up_to(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = lock(&self.inner);
        let take = (g.samples.len() / self.channels).min(max_frames) * self.channels;
        if take == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Discard everything buffered.
    pub(crate) fn clear(&self) {
        lock(&self.inner).samples.clear();
        self.cv.notify_all();
    }

    /// Wait until the consumer emptied the queue, it was closed, or `timeout` passed.
    ///
    /// Returns true when the queue drained.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = lock(&self.inner);
        loop {
            if g.samples.len() < self.channels {
                return true;
            }
            if g.closed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            g = match self.cv.wait_timeout(g, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
