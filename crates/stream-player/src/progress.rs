//! Small latest-wins relay for playback progress values.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// Bounded FIFO of progress fractions. Publishing never blocks: when full, the
/// oldest value is dropped to make room.
pub struct ProgressRelay {
    tx: Sender<f64>,
    rx: Receiver<f64>,
}

impl ProgressRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub fn publish(&self, value: f64) {
        let mut value = value;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return,
                Err(TrySendError::Full(v)) => {
                    let _ = self.rx.try_recv();
                    value = v;
                }
                // Both ends live in `self`.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Oldest pending value, or 0 when nothing is buffered.
    pub fn pop_or_zero(&self) -> f64 {
        self.rx.try_recv().unwrap_or(0.0)
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
