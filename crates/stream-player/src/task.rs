//! Typed, repeatable units of work bound to a [`TaskQueue`].
//!
//! A [`Task`] holds one job closure and hands out results strictly in invocation
//! order: each [`Task::run`] pushes a fresh pending result, each [`Task::get`]
//! blocks on the oldest one.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crossbeam_channel::{Receiver, bounded};

use crate::error::TaskError;
use crate::sync::{lock, panic_message, read, write};
use crate::task_queue::{TaskQueue, Token};

/// Cancellation flag handed to every job invocation; set when the task is torn down.
pub type CancelFlag = AtomicBool;

type JobFn<A, R> = dyn Fn(&CancelFlag, A) -> anyhow::Result<R> + Send + Sync;
type CompletionFn = dyn Fn() + Send + Sync;

struct TaskShared<A, R> {
    job: RwLock<Option<Arc<JobFn<A, R>>>>,
    completion: RwLock<Option<Arc<CompletionFn>>>,
    cancel: CancelFlag,
}

/// A reusable job with FIFO result retrieval.
///
/// `A` is the argument value passed to each invocation (use a tuple for several
/// arguments), `R` the result type.
pub struct Task<A, R> {
    token: Token,
    queue: Arc<TaskQueue>,
    shared: Arc<TaskShared<A, R>>,
    pending: Mutex<VecDeque<Receiver<Result<R, TaskError>>>>,
}

impl<A, R> Task<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            token: Token::new(),
            queue,
            shared: Arc::new(TaskShared {
                job: RwLock::new(None),
                completion: RwLock::new(None),
                cancel: AtomicBool::new(false),
            }),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Install the job run by later [`Task::run`] calls.
    pub fn set_job<F>(&self, job: F) -> &Self
    where
        F: Fn(&CancelFlag, A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        *write(&self.shared.job) = Some(Arc::new(job));
        self
    }

    /// Install a hook invoked after every invocation, whether it succeeded or not.
    pub fn set_completion_handler<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        *write(&self.shared.completion) = Some(Arc::new(handler));
        self
    }

    /// Enqueue one invocation and return immediately.
    ///
    /// Without a job installed this does nothing, and a later `get` yields the default.
    pub fn run(&self, args: A) -> &Self {
        let Some(job) = read(&self.shared.job).clone() else {
            tracing::debug!("task run without a job; ignored");
            return self;
        };

        let (tx, rx) = bounded(1);
        lock(&self.pending).push_back(rx);

        let shared = self.shared.clone();
        self.queue.schedule_task(
            move || {
                let outcome = match catch_unwind(AssertUnwindSafe(|| job(&shared.cancel, args))) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(TaskError::Failed(format!("{err:#}"))),
                    Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                };
                // The receiver is gone when nobody waits for this result any more.
                let _ = tx.send(outcome);

                let completion = read(&shared.completion).clone();
                if let Some(completion) = completion {
                    completion();
                }
            },
            self.token,
        );
        self
    }

    /// Block until the oldest outstanding invocation finishes and return its result.
    ///
    /// With nothing outstanding this returns `R::default()` instead of blocking.
    pub fn get(&self) -> Result<R, TaskError>
    where
        R: Default,
    {
        let next = lock(&self.pending).pop_front();
        match next {
            None => Ok(R::default()),
            Some(rx) => rx.recv().unwrap_or(Err(TaskError::Cancelled)),
        }
    }

    /// Number of invocations whose result has not been retrieved yet.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Relaxed)
    }

    pub fn token(&self) -> Token {
        self.token
    }
}

impl<A, R> Drop for Task<A, R> {
    fn drop(&mut self) {
        self.shared.cancel.store(true, Ordering::Relaxed);
        self.queue.unregister(self.token);
    }
}
