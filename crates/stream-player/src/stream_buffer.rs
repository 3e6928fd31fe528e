//! In-memory append-only byte log shared by the downloader and the decoder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::sync::{lock, wait};

struct BufferInner {
    data: Vec<u8>,
    finished: bool,
}

/// Snapshot of the writer side, handed to [`StreamBuffer::wait_until`] predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferView {
    /// Bytes committed so far.
    pub len: u64,
    /// The writer will not append any more.
    pub finished: bool,
}

/// Single-writer, single-reader growable byte log.
///
/// Bytes below [`StreamBuffer::len`] never change, so the reader can address them by
/// offset while the writer keeps appending. One mutex/condvar pair covers the data
/// and the finished flag.
pub struct StreamBuffer {
    inner: Mutex<BufferInner>,
    cv: Condvar,
    /// 0 while unknown.
    expected_total: AtomicU64,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                data: Vec::new(),
                finished: false,
            }),
            cv: Condvar::new(),
            expected_total: AtomicU64::new(0),
        }
    }

    /// Extend the log and wake waiting readers.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut g = lock(&self.inner);
        g.data.extend_from_slice(bytes);
        drop(g);
        self.cv.notify_all();
    }

    /// Copy out up to `max_len` committed bytes starting at `offset`. Never blocks.
    pub fn read_at(&self, offset: u64, max_len: usize) -> Vec<u8> {
        let g = lock(&self.inner);
        let len = g.data.len();
        let Ok(start) = usize::try_from(offset) else {
            return Vec::new();
        };
        if start >= len {
            return Vec::new();
        }
        let end = start.saturating_add(max_len).min(len);
        g.data[start..end].to_vec()
    }

    /// Exact number of committed bytes (the writer cursor).
    pub fn len(&self) -> u64 {
        lock(&self.inner).data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_expected_total(&self, total: u64) {
        self.expected_total.store(total, Ordering::Release);
    }

    pub fn expected_total(&self) -> Option<u64> {
        match self.expected_total.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    /// Mark the writer side as done and wake readers.
    pub fn finish(&self) {
        let mut g = lock(&self.inner);
        g.finished = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.inner).finished
    }

    pub fn view(&self) -> BufferView {
        let g = lock(&self.inner);
        BufferView {
            len: g.data.len() as u64,
            finished: g.finished,
        }
    }

    /// Block until `ready` returns true for the current writer state.
    ///
    /// The predicate runs under the buffer lock; state it reads from outside the
    /// buffer must be changed before calling [`StreamBuffer::wake`].
    pub fn wait_until<F>(&self, mut ready: F) -> BufferView
    where
        F: FnMut(BufferView) -> bool,
    {
        let mut g = lock(&self.inner);
        loop {
            let view = BufferView {
                len: g.data.len() as u64,
                finished: g.finished,
            };
            if ready(view) {
                return view;
            }
            g = wait(&self.cv, g);
        }
    }

    /// Wake every waiter so it re-evaluates its predicate.
    pub fn wake(&self) {
        // Taking the lock orders this wakeup after any in-progress predicate check.
        let g = lock(&self.inner);
        drop(g);
        self.cv.notify_all();
    }
}
