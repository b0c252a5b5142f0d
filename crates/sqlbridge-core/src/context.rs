//! The execution context: a task queue driven by `run`, plus the services
//! that live as long as it does.

use crate::executor::{AnyExecutor, Executor, Task, WorkGuard};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static RUNNING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// A service owned by an [`IoContext`].
///
/// `shutdown` runs when the context is dropped, in reverse order of
/// registration. After it returns the service must not start new work.
pub trait ContextService: Send + Sync + 'static {
    fn shutdown(&self);
}

struct QueueState {
    tasks: VecDeque<Task>,
    /// Operations in flight that will post later.
    outstanding: usize,
    stopped: bool,
    /// The owning `IoContext` is gone; posted tasks are dropped unrun.
    closed: bool,
}

struct ContextInner {
    id: u64,
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl ContextInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Registration {
    type_id: TypeId,
    any: Arc<dyn Any + Send + Sync>,
    service: Arc<dyn ContextService>,
}

/// A single-queue execution context.
///
/// Tasks posted through [`IoContext::executor`] run on whichever thread
/// calls [`run`](IoContext::run) or [`poll`](IoContext::poll). `run` keeps
/// going while tasks are queued or work is outstanding (see
/// [`WorkGuard`]), and returns once both are exhausted or the context is
/// stopped.
pub struct IoContext {
    inner: Arc<ContextInner>,
    services: Mutex<Vec<Registration>>,
}

impl IoContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    outstanding: 0,
                    stopped: false,
                    closed: false,
                }),
                ready: Condvar::new(),
            }),
            services: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A handle for posting work to this context.
    pub fn executor(&self) -> AnyExecutor {
        AnyExecutor::new(ContextExecutor {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Keep `run` from returning until the guard is dropped.
    pub fn work_guard(&self) -> WorkGuard {
        self.executor().work()
    }

    /// Run tasks until there is nothing queued and nothing outstanding, or
    /// until the context is stopped. Returns the number of tasks run.
    pub fn run(&self) -> usize {
        let _running = RunningGuard::enter(self.inner.id);
        let mut executed = 0;
        while let Some(task) = self.next_task(true) {
            task();
            executed += 1;
        }
        executed
    }

    /// Run the tasks that are ready without blocking.
    pub fn poll(&self) -> usize {
        let _running = RunningGuard::enter(self.inner.id);
        let mut executed = 0;
        while let Some(task) = self.next_task(false) {
            task();
            executed += 1;
        }
        executed
    }

    /// Make `run` return as soon as possible. Queued tasks are kept.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        state.stopped = true;
        drop(state);
        self.inner.ready.notify_all();
    }

    /// Clear a previous `stop` so the context can run again.
    pub fn restart(&self) {
        self.inner.lock().stopped = false;
    }

    pub fn stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    fn next_task(&self, block: bool) -> Option<Task> {
        let mut state = self.inner.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if !block || state.outstanding == 0 {
                return None;
            }
            state = self
                .inner
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Get the service of type `S`, creating it with `make` on first use.
    ///
    /// Concurrent first callers may each run `make`; exactly one result is
    /// kept and returned to all of them.
    pub fn use_service<S, F>(&self, make: F) -> Arc<S>
    where
        S: ContextService,
        F: FnOnce() -> S,
    {
        if let Some(existing) = self.service::<S>() {
            return existing;
        }
        let created = Arc::new(make());
        let mut services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = find::<S>(&services) {
            return existing;
        }
        register(&mut services, &created);
        tracing::debug!(
            context = self.inner.id,
            service = std::any::type_name::<S>(),
            "service registered"
        );
        created
    }

    /// Register a pre-built service. Returns the service back if one of the
    /// same type is already registered.
    pub fn install_service<S: ContextService>(&self, service: S) -> Result<Arc<S>, S> {
        let mut services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
        if find::<S>(&services).is_some() {
            return Err(service);
        }
        let service = Arc::new(service);
        register(&mut services, &service);
        Ok(service)
    }

    /// The registered service of type `S`, if any.
    pub fn service<S: ContextService>(&self) -> Option<Arc<S>> {
        let services = self.services.lock().unwrap_or_else(PoisonError::into_inner);
        find::<S>(&services)
    }
}

impl Default for IoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        let services = std::mem::take(
            &mut *self.services.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for registration in services.iter().rev() {
            registration.service.shutdown();
        }

        let abandoned = {
            let mut state = self.inner.lock();
            state.closed = true;
            std::mem::take(&mut state.tasks)
        };
        self.inner.ready.notify_all();
        tracing::debug!(
            context = self.inner.id,
            services = services.len(),
            abandoned = abandoned.len(),
            "context dropped"
        );
        // Tasks may release work guards on this context when dropped.
        drop(abandoned);
    }
}

fn find<S: ContextService>(services: &[Registration]) -> Option<Arc<S>> {
    services
        .iter()
        .find(|r| r.type_id == TypeId::of::<S>())
        .and_then(|r| Arc::clone(&r.any).downcast::<S>().ok())
}

fn register<S: ContextService>(services: &mut Vec<Registration>, service: &Arc<S>) {
    services.push(Registration {
        type_id: TypeId::of::<S>(),
        any: Arc::clone(service) as Arc<dyn Any + Send + Sync>,
        service: Arc::clone(service) as Arc<dyn ContextService>,
    });
}

struct ContextExecutor {
    inner: Arc<ContextInner>,
}

impl Executor for ContextExecutor {
    fn post(&self, task: Task) {
        let mut state = self.inner.lock();
        if state.closed {
            drop(state);
            tracing::debug!(context = self.inner.id, "task posted after context was dropped");
            drop(task);
            return;
        }
        if state.stopped {
            tracing::warn!(context = self.inner.id, "task posted to stopped context");
        }
        state.tasks.push_back(task);
        drop(state);
        self.inner.ready.notify_one();
    }

    fn running_in_this_thread(&self) -> bool {
        RUNNING.with(|running| running.borrow().contains(&self.inner.id))
    }

    fn id(&self) -> u64 {
        self.inner.id
    }

    fn on_work_started(&self) {
        self.inner.lock().outstanding += 1;
    }

    fn on_work_finished(&self) {
        let mut state = self.inner.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        let idle = state.outstanding == 0;
        drop(state);
        if idle {
            self.inner.ready.notify_all();
        }
    }
}

/// Marks the current thread as driving a context for the guard's lifetime.
struct RunningGuard;

impl RunningGuard {
    fn enter(id: u64) -> Self {
        RUNNING.with(|running| running.borrow_mut().push(id));
        RunningGuard
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        RUNNING.with(|running| {
            running.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_run_executes_posted_tasks_in_order() {
        let ctx = IoContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            ctx.executor().post(move || seen.lock().unwrap().push(i));
        }
        assert_eq!(ctx.run(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(ctx.run(), 0);
    }

    #[test]
    fn test_running_in_this_thread_only_inside_run() {
        let ctx = IoContext::new();
        let executor = ctx.executor();
        assert!(!executor.running_in_this_thread());

        let inside = Arc::new(AtomicBool::new(false));
        let home = executor.clone();
        let flag = Arc::clone(&inside);
        executor.post(move || flag.store(home.running_in_this_thread(), Ordering::SeqCst));
        ctx.run();
        assert!(inside.load(Ordering::SeqCst));
    }

    #[test]
    fn test_work_guard_keeps_run_alive() {
        let ctx = IoContext::new();
        let executor = ctx.executor();
        let guard = ctx.work_guard();

        let poster = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            executor.post(|| {});
            drop(guard);
        });

        assert_eq!(ctx.run(), 1);
        poster.join().unwrap();
    }

    #[test]
    fn test_stop_and_restart() {
        let ctx = IoContext::new();
        ctx.executor().post(|| {});
        ctx.stop();
        assert_eq!(ctx.run(), 0);
        ctx.restart();
        assert_eq!(ctx.poll(), 1);
    }

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_post_to_stopped_context_warns_and_keeps_task() {
        let ctx = IoContext::new();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            ctx.stop();
            ctx.executor().post(|| {});
        });

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("WARN"), "got {logged:?}");
        assert!(logged.contains("task posted to stopped context"));
        ctx.restart();
        assert_eq!(ctx.poll(), 1);
    }

    #[test]
    fn test_executor_identity() {
        let a = IoContext::new();
        let b = IoContext::new();
        assert_eq!(a.executor(), a.executor());
        assert_ne!(a.executor(), b.executor());
    }

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ContextService for Recorder {
        fn shutdown(&self) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    struct Other(Recorder);

    impl ContextService for Other {
        fn shutdown(&self) {
            self.0.shutdown();
        }
    }

    #[test]
    fn test_services_are_unique_and_shut_down_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let ctx = IoContext::new();
            let first = ctx.use_service(|| Recorder {
                name: "first",
                log: Arc::clone(&log),
            });
            let again = ctx.use_service::<Recorder, _>(|| unreachable!());
            assert!(Arc::ptr_eq(&first, &again));

            let second = Other(Recorder {
                name: "second",
                log: Arc::clone(&log),
            });
            assert!(ctx.install_service(second).is_ok());
            let dup = Other(Recorder {
                name: "dup",
                log: Arc::clone(&log),
            });
            assert!(ctx.install_service(dup).is_err());
        }
        assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
    }

    /// Sets its flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_drop_releases_queued_and_late_tasks() {
        let ctx = IoContext::new();
        let executor = ctx.executor();
        let ran = Arc::new(AtomicBool::new(false));

        let queued = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&queued));
        let guard = executor.work();
        let seen = Arc::clone(&ran);
        executor.post(move || {
            let _flag = flag;
            drop(guard);
            seen.store(true, Ordering::SeqCst);
        });

        drop(ctx);
        assert!(queued.load(Ordering::SeqCst));

        let late = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&late));
        let seen = Arc::clone(&ran);
        executor.post(move || {
            let _flag = flag;
            seen.store(true, Ordering::SeqCst);
        });
        assert!(late.load(Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));
    }
}
