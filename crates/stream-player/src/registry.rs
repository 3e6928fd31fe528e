//! Process-wide table of shared tasks keyed by an explicit signature string.
//!
//! Every call site asking for the same key receives the same [`Task`] object and
//! therefore shares its result queue: a `get()` from one caller may consume the
//! result of another caller's `run()` if both use the same key. Pick keys that are
//! unique per logical operation.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::TaskError;
use crate::sync::lock;
use crate::task::Task;
use crate::task_queue::TaskQueue;

/// Type-erased view of a registered task.
trait ErasedTask: Send + Sync {
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn type_label(&self) -> &'static str;
    fn pending(&self) -> usize;
}

impl<A, R> ErasedTask for Task<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_label(&self) -> &'static str {
        type_name::<Task<A, R>>()
    }

    fn pending(&self) -> usize {
        Task::pending(self)
    }
}

struct RegistryInner {
    queue: Option<Arc<TaskQueue>>,
    tasks: HashMap<String, Arc<dyn ErasedTask>>,
}

/// Lazily creates exactly one [`Task`] per signature key, all sharing one queue.
pub struct TaskRegistry {
    name: String,
    inner: Mutex<RegistryInner>,
}

impl TaskRegistry {
    /// An isolated registry; its queue thread is spawned on first use.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(RegistryInner {
                queue: None,
                tasks: HashMap::new(),
            }),
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static TaskRegistry {
        static GLOBAL: OnceLock<TaskRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| TaskRegistry::new("task-registry"))
    }

    /// Return the task registered under `key`, creating it on first request.
    ///
    /// Requesting an existing key with different argument or result types fails with
    /// [`TaskError::SignatureMismatch`].
    pub fn task<A, R>(&self, key: &str) -> Result<Arc<Task<A, R>>, TaskError>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        let mut g = lock(&self.inner);
        if let Some(existing) = g.tasks.get(key) {
            let registered = existing.type_label();
            return existing
                .clone()
                .as_any()
                .downcast::<Task<A, R>>()
                .map_err(|_| TaskError::SignatureMismatch {
                    key: key.to_string(),
                    registered,
                    requested: type_name::<Task<A, R>>(),
                });
        }

        let queue = match &g.queue {
            Some(queue) => queue.clone(),
            None => {
                let queue = Arc::new(
                    TaskQueue::new(self.name.clone())
                        .map_err(|e| TaskError::QueueUnavailable(e.to_string()))?,
                );
                g.queue = Some(queue.clone());
                queue
            }
        };

        let task = Arc::new(Task::<A, R>::new(queue));
        g.tasks.insert(key.to_string(), task.clone());
        tracing::debug!(registry = %self.name, key, "task registered");
        Ok(task)
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).tasks.contains_key(key)
    }

    /// Outstanding results for `key`, or `None` when no task is registered under it.
    pub fn pending(&self, key: &str) -> Option<usize> {
        lock(&self.inner).tasks.get(key).map(|t| t.pending())
    }

    /// Drop every registered task and stop the shared queue.
    ///
    /// Callers still holding an `Arc<Task>` keep a usable handle, but work they
    /// schedule afterwards is discarded.
    pub fn shutdown(&self) {
        let (tasks, queue) = {
            let mut g = lock(&self.inner);
            (std::mem::take(&mut g.tasks), g.queue.take())
        };
        drop(tasks);
        if let Some(queue) = queue {
            queue.shutdown();
        }
        tracing::debug!(registry = %self.name, "task registry shut down");
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
