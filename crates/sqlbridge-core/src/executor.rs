//! Executors: where completion handlers run.

use std::fmt;
use std::sync::Arc;

/// A unit of work posted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A scheduling context that runs posted tasks.
///
/// `post` must never run the task inline: callers rely on the task running
/// after `post` returns, on whichever thread drives the executor.
pub trait Executor: Send + Sync + 'static {
    fn post(&self, task: Task);

    /// Whether the calling thread is currently driving this executor.
    fn running_in_this_thread(&self) -> bool;

    /// Identity of the underlying context. Handles to the same context
    /// report the same id.
    fn id(&self) -> u64;

    /// An asynchronous operation that will eventually post to this executor
    /// has started.
    fn on_work_started(&self) {}

    /// The operation announced by `on_work_started` has posted its
    /// completion or been abandoned.
    fn on_work_finished(&self) {}
}

/// Cloneable, type-erased executor handle.
#[derive(Clone)]
pub struct AnyExecutor {
    inner: Arc<dyn Executor>,
}

impl AnyExecutor {
    pub fn new<E: Executor>(executor: E) -> Self {
        Self {
            inner: Arc::new(executor),
        }
    }

    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.post(Box::new(f));
    }

    pub fn running_in_this_thread(&self) -> bool {
        self.inner.running_in_this_thread()
    }

    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Announce outstanding work until the returned guard is dropped.
    pub fn work(&self) -> WorkGuard {
        self.inner.on_work_started();
        WorkGuard {
            executor: Some(self.clone()),
        }
    }
}

impl PartialEq for AnyExecutor {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AnyExecutor {}

impl fmt::Debug for AnyExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyExecutor").field("id", &self.id()).finish()
    }
}

/// Keeps an executor's context from running out of work.
#[derive(Debug)]
pub struct WorkGuard {
    executor: Option<AnyExecutor>,
}

impl WorkGuard {
    /// Release the work early.
    pub fn reset(&mut self) {
        if let Some(executor) = self.executor.take() {
            executor.inner.on_work_finished();
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.reset();
    }
}
