//! Single-worker FIFO executor with token-gated (soft) cancellation.
//!
//! Every closure is submitted together with the [`Token`] of its owner. The worker
//! dequeues items strictly in submission order and runs an item only if its token
//! is still registered at dequeue time. Unregistering a token therefore turns all
//! not-yet-started work of that owner into no-ops without reordering the queue;
//! a closure that was already dequeued keeps running to completion.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use crate::sync::{lock, panic_message, wait};

/// Opaque identity used to gate whether a queued closure may execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(u64);

impl Token {
    /// Allocate a process-unique token.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Token(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    items: VecDeque<(Job, Token)>,
    tokens: HashSet<Token>,
    running: bool,
    shutdown: bool,
}

struct QueueShared {
    state: Mutex<QueueState>,
    cv: Condvar,
}

/// FIFO executor backed by exactly one worker thread.
pub struct TaskQueue {
    name: String,
    shared: Arc<QueueShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TaskQueue {
    /// Spawn the worker thread for a new queue.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                tokens: HashSet::new(),
                running: false,
                shutdown: false,
            }),
            cv: Condvar::new(),
        });

        let shared_for_worker = shared.clone();
        let name_for_worker = name.clone();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_main(&shared_for_worker, &name_for_worker))?;
        let worker_id = worker.thread().id();
        tracing::debug!(queue = %name, "task queue started");

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register `token` as live (idempotent) and append `job` behind all earlier work.
    ///
    /// Work submitted after [`TaskQueue::shutdown`] is dropped without running.
    pub fn schedule_task<F>(&self, job: F, token: Token)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut g = lock(&self.shared.state);
        if g.shutdown {
            drop(g);
            tracing::debug!(queue = %self.name, "schedule after shutdown ignored");
            return;
        }
        g.tokens.insert(token);
        g.items.push_back((Box::new(job), token));
        drop(g);
        self.shared.cv.notify_all();
    }

    /// Remove `token` from the live set. Queued items keep their position but will be
    /// skipped when the worker reaches them.
    pub fn unregister(&self, token: Token) {
        let mut g = lock(&self.shared.state);
        g.tokens.remove(&token);
    }

    pub fn is_registered(&self, token: Token) -> bool {
        lock(&self.shared.state).tokens.contains(&token)
    }

    /// Items submitted but not yet dequeued.
    pub fn len(&self) -> usize {
        lock(&self.shared.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until the queue is empty and no closure is executing.
    ///
    /// Called from the worker thread itself this returns immediately, since the
    /// calling closure would otherwise wait on its own completion.
    pub fn wait_idle(&self) {
        if thread::current().id() == self.worker_id {
            tracing::debug!(queue = %self.name, "wait_idle called from worker; skipping");
            return;
        }
        let mut g = lock(&self.shared.state);
        while !g.shutdown && (g.running || !g.items.is_empty()) {
            g = wait(&self.shared.cv, g);
        }
        // After shutdown only the in-flight closure matters.
        while g.running {
            g = wait(&self.shared.cv, g);
        }
    }

    /// Stop the worker after its current closure and join it. Safe to call repeatedly.
    ///
    /// Items still queued are discarded without running.
    pub fn shutdown(&self) {
        {
            let mut g = lock(&self.shared.state);
            g.shutdown = true;
        }
        self.shared.cv.notify_all();

        let handle = lock(&self.worker).take();
        let Some(handle) = handle else {
            return;
        };
        if thread::current().id() == self.worker_id {
            // Dropping the last owner from inside a closure: detach instead of self-joining.
            tracing::debug!(queue = %self.name, "task queue shut down from its own worker");
        } else if handle.join().is_err() {
            tracing::error!(queue = %self.name, "task queue worker panicked");
        }

        let leftover = std::mem::take(&mut lock(&self.shared.state).items);
        if !leftover.is_empty() {
            tracing::debug!(
                queue = %self.name,
                discarded = leftover.len(),
                "task queue discarded pending work"
            );
        }
        drop(leftover);
        tracing::debug!(queue = %self.name, "task queue stopped");
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(shared: &QueueShared, name: &str) {
    loop {
        let (job, runnable) = {
            let mut g = lock(&shared.state);
            loop {
                if g.shutdown {
                    return;
                }
                if let Some((job, token)) = g.items.pop_front() {
                    let runnable = g.tokens.contains(&token);
                    g.running = runnable;
                    break (job, runnable);
                }
                g = wait(&shared.cv, g);
            }
        };

        if runnable {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                tracing::error!(
                    queue = name,
                    panic = %panic_message(payload.as_ref()),
                    "scheduled closure panicked"
                );
            }
        } else {
            // Dropped outside the lock: captured state may reach back into the queue.
            drop(job);
            tracing::trace!(queue = name, "skipped closure of unregistered owner");
        }

        lock(&shared.state).running = false;
        shared.cv.notify_all();
    }
}
