//! Fixed-size worker thread pool for drivers without native async support.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub threads: usize,
    /// Name given to each worker thread
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            threads: default_worker_threads(),
            thread_name: "sqlbridge-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with the given number of threads.
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    /// Set the number of threads. Zero is treated as one.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// The hardware concurrency, with a floor of 1.
#[must_use]
pub fn default_worker_threads() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// How a submitted job came to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// On a worker thread.
    Worker,
    /// Inline on the submitting thread, because the pool no longer accepts
    /// work. The job should fail its operation instead of doing it.
    Rejected,
}

type Job = Box<dyn FnOnce(Admission) + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    accepting: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    completed: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerPoolStats {
    /// Threads that were successfully started
    pub threads: usize,
    /// Jobs waiting for a worker
    pub queued: usize,
    /// Jobs that have finished on a worker
    pub completed: usize,
    pub accepting: bool,
}

/// A fixed set of threads draining one FIFO job queue.
///
/// Shutdown stops admission, lets every queued job run, then joins the
/// threads. Jobs submitted after that run inline with
/// [`Admission::Rejected`].
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                accepting: true,
            }),
            available: Condvar::new(),
            completed: AtomicUsize::new(0),
        });

        let wanted = config.threads.max(1);
        let mut handles = Vec::with_capacity(wanted);
        for index in 0..wanted {
            let worker = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || worker_loop(&worker));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::error!(index, error = %e, "failed to spawn worker thread"),
            }
        }
        if handles.is_empty() {
            // Nothing could run queued jobs; reject everything instead.
            shared.lock().accepting = false;
        }

        tracing::debug!(
            threads = handles.len(),
            name = %config.thread_name,
            "worker pool started"
        );

        Self {
            shared,
            handles: Mutex::new(handles),
            config,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Queue a job. If the pool has been shut down the job runs right away
    /// on the calling thread with [`Admission::Rejected`].
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce(Admission) + Send + 'static,
    {
        let mut queue = self.shared.lock();
        if !queue.accepting {
            drop(queue);
            tracing::warn!("job submitted to a stopped worker pool");
            job(Admission::Rejected);
            return;
        }
        queue.jobs.push_back(Box::new(job));
        drop(queue);
        self.shared.available.notify_one();
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let queue = self.shared.lock();
        WorkerPoolStats {
            threads: self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            queued: queue.jobs.len(),
            completed: self.shared.completed.load(Ordering::Acquire),
            accepting: queue.accepting,
        }
    }

    /// Stop accepting jobs, drain the queue and join every worker.
    ///
    /// Safe to call more than once and from a worker thread; a worker never
    /// joins itself.
    pub fn shutdown(&self) {
        self.shared.lock().accepting = false;
        self.shared.available.notify_all();

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            return;
        }
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("worker thread panicked outside a job");
            }
        }
        tracing::debug!(
            completed = self.shared.completed.load(Ordering::Acquire),
            "worker pool stopped"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if !queue.accepting {
                    return;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if catch_unwind(AssertUnwindSafe(|| job(Admission::Worker))).is_err() {
            tracing::error!(
                thread = thread::current().name().unwrap_or("<unnamed>"),
                "worker job panicked"
            );
        }
        shared.completed.fetch_add(1, Ordering::AcqRel);
    }
}
