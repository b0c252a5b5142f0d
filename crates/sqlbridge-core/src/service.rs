//! Per-context owner of a driver and its worker pool.

use crate::context::{ContextService, IoContext};
use crate::driver::Driver;
use crate::error::{Error, ErrorCode, FrameworkErrc};
use crate::worker::{Admission, WorkerPool, WorkerPoolConfig, WorkerPoolStats};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Owns the driver instance shared by every connection on one context.
///
/// The worker pool is started by the first asynchronous operation that
/// needs it, exactly once even when several connections race to be first.
/// Synchronous operations never touch the pool.
pub struct Service<D: Driver> {
    driver: Arc<D>,
    pool: OnceLock<WorkerPool>,
    pool_config: WorkerPoolConfig,
    pools_created: AtomicUsize,
    shut_down: AtomicBool,
    /// Serializes pool creation against `shutdown`.
    lifecycle: Mutex<()>,
}

impl<D: Driver> Service<D> {
    /// Create a service using the driver's own pool settings.
    pub fn new(driver: D) -> Self {
        let pool_config = driver.pool_config();
        Self::with_config(driver, pool_config)
    }

    pub fn with_config(driver: D, pool_config: WorkerPoolConfig) -> Self {
        tracing::debug!(
            driver = driver.name(),
            threads = pool_config.threads,
            "service created"
        );
        Self {
            driver: Arc::new(driver),
            pool: OnceLock::new(),
            pool_config,
            pools_created: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// The context's service for `D`, created with `D::default()` on first
    /// use.
    pub fn obtain(ctx: &IoContext) -> Arc<Self>
    where
        D: Default,
    {
        ctx.use_service(|| Self::new(D::default()))
    }

    /// Register a configured driver with the context before any connection
    /// is made.
    #[allow(clippy::result_large_err)]
    pub fn install(
        ctx: &IoContext,
        driver: D,
        pool_config: WorkerPoolConfig,
    ) -> crate::Result<Arc<Self>> {
        let name = driver.name();
        ctx.install_service(Self::with_config(driver, pool_config))
            .map_err(|_| Error::Custom(format!("a {name} service is already installed on this context")))
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn pool_config(&self) -> &WorkerPoolConfig {
        &self.pool_config
    }

    pub fn pool_started(&self) -> bool {
        self.pool.get().is_some()
    }

    /// How many worker pools this service has started. Never more than one.
    pub fn pools_created(&self) -> usize {
        self.pools_created.load(Ordering::Acquire)
    }

    pub fn pool_stats(&self) -> Option<WorkerPoolStats> {
        self.pool.get().map(WorkerPool::stats)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Handle for running blocking driver work off the caller's thread.
    pub fn offload(&self) -> Offload<'_, D> {
        Offload { service: self }
    }

    /// The running pool, started on first use. `None` once the service is
    /// shut down and no pool was ever started.
    fn pool(&self) -> Option<&WorkerPool> {
        if let Some(pool) = self.pool.get() {
            return Some(pool);
        }
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_shut_down() {
            return None;
        }
        Some(self.pool.get_or_init(|| {
            self.pools_created.fetch_add(1, Ordering::AcqRel);
            tracing::info!(
                driver = self.driver.name(),
                threads = self.pool_config.threads,
                "starting worker pool"
            );
            WorkerPool::new(self.pool_config.clone())
        }))
    }

    /// Stop accepting asynchronous work, let queued work finish and join
    /// the workers. Connections must not be used afterwards.
    pub fn shutdown(&self) {
        {
            let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        // A pool started before the flag was set is visible here.
        if let Some(pool) = self.pool.get() {
            pool.shutdown();
        }
        tracing::debug!(driver = self.driver.name(), "service shut down");
    }
}

impl<D: Driver> ContextService for Service<D> {
    fn shutdown(&self) {
        Service::shutdown(self);
    }
}

impl<D: Driver> std::fmt::Debug for Service<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("driver", &self.driver.name())
            .field("pool_started", &self.pool_started())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Runs blocking driver work on the service's worker pool.
pub struct Offload<'a, D: Driver> {
    service: &'a Service<D>,
}

impl<D: Driver> Offload<'_, D> {
    /// Queue `work`, starting the pool if needed.
    ///
    /// `work` receives the driver on a worker thread, or
    /// [`FrameworkErrc::ShutDown`] on the calling thread if the service no
    /// longer accepts work. Either way it runs exactly once, so it can
    /// always deliver its completion.
    pub fn run<F>(&self, work: F)
    where
        F: FnOnce(Result<&D, ErrorCode>) + Send + 'static,
    {
        let pool = match self.service.pool() {
            Some(pool) if !self.service.is_shut_down() => pool,
            _ => {
                tracing::warn!(driver = self.service.driver.name(), "work offered after shutdown");
                work(Err(FrameworkErrc::ShutDown.into()));
                return;
            }
        };
        // Racing a shutdown that already holds this pool ends in `Rejected`.
        let driver = Arc::clone(&self.service.driver);
        pool.submit(move |admission| match admission {
            Admission::Worker => work(Ok(&driver)),
            Admission::Rejected => work(Err(FrameworkErrc::ShutDown.into())),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::empty::EmptyDriver;
    use std::sync::Barrier;
    use std::sync::mpsc;
    use std::time::Duration;

    fn service() -> Service<EmptyDriver> {
        Service::with_config(EmptyDriver, WorkerPoolConfig::new(2))
    }

    #[test]
    fn test_pool_is_lazy() {
        let service = service();
        assert!(!service.pool_started());
        assert!(service.pool_stats().is_none());

        let (tx, rx) = mpsc::channel();
        service.offload().run(move |driver| tx.send(driver.is_ok()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(service.pool_started());
        assert_eq!(service.pools_created(), 1);
    }

    #[test]
    fn test_concurrent_first_offloads_create_one_pool() {
        let service = Arc::new(service());
        let barrier = Arc::new(Barrier::new(8));
        let (tx, rx) = mpsc::channel();

        std::thread::scope(|s| {
            for _ in 0..8 {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                let tx = tx.clone();
                s.spawn(move || {
                    barrier.wait();
                    service.offload().run(move |_| tx.send(()).unwrap());
                });
            }
        });
        for _ in 0..8 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(service.pools_created(), 1);
    }

    #[test]
    fn test_shutdown_drains_then_rejects() {
        let service = service();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            service.offload().run(move |driver| {
                std::thread::sleep(Duration::from_millis(1));
                tx.send((i, driver.is_ok())).unwrap();
            });
        }
        service.shutdown();
        let drained: Vec<_> = rx.try_iter().collect();
        assert_eq!(drained.len(), 10);
        assert!(drained.iter().all(|(_, ok)| *ok));

        let caller = std::thread::current().id();
        service.offload().run(move |driver| {
            assert_eq!(std::thread::current().id(), caller);
            assert_eq!(driver.err(), Some(FrameworkErrc::ShutDown.into()));
            tx.send((99, false)).unwrap();
        });
        assert_eq!(rx.try_recv().unwrap(), (99, false));
    }

    #[test]
    fn test_services_are_per_context() {
        let a = IoContext::new();
        let b = IoContext::new();
        let sa = Service::<EmptyDriver>::obtain(&a);
        assert!(Arc::ptr_eq(&sa, &Service::<EmptyDriver>::obtain(&a)));
        assert!(!Arc::ptr_eq(&sa, &Service::<EmptyDriver>::obtain(&b)));
    }

    #[test]
    fn test_install_rejects_duplicates() {
        let ctx = IoContext::new();
        let installed = Service::install(&ctx, EmptyDriver, WorkerPoolConfig::new(1)).unwrap();
        assert_eq!(installed.pool_config().threads, 1);
        assert!(Arc::ptr_eq(&installed, &Service::<EmptyDriver>::obtain(&ctx)));
        assert!(Service::install(&ctx, EmptyDriver, WorkerPoolConfig::new(1)).is_err());
    }

    #[test]
    fn test_context_drop_shuts_service_down() {
        let ctx = IoContext::new();
        let service = Service::<EmptyDriver>::obtain(&ctx);
        drop(ctx);
        assert!(service.is_shut_down());
    }

    #[test]
    fn test_shutdown_before_first_offload_never_starts_a_pool() {
        let service = service();
        service.shutdown();

        let (tx, rx) = mpsc::channel();
        service.offload().run(move |driver| tx.send(driver.err()).unwrap());
        assert_eq!(rx.try_recv().unwrap(), Some(FrameworkErrc::ShutDown.into()));
        assert!(!service.pool_started());
        assert_eq!(service.pools_created(), 0);
    }

    #[test]
    fn test_first_offloads_racing_shutdown_leave_no_live_pool() {
        for _ in 0..20 {
            let service = Arc::new(service());
            let barrier = Arc::new(Barrier::new(5));
            let (tx, rx) = mpsc::channel();

            std::thread::scope(|s| {
                for _ in 0..4 {
                    let service = Arc::clone(&service);
                    let barrier = Arc::clone(&barrier);
                    let tx = tx.clone();
                    s.spawn(move || {
                        barrier.wait();
                        service.offload().run(move |_| tx.send(()).unwrap());
                    });
                }
                barrier.wait();
                service.shutdown();
            });

            // every job ran exactly once, admitted or rejected
            for _ in 0..4 {
                rx.recv_timeout(Duration::from_secs(5)).unwrap();
            }
            if let Some(stats) = service.pool_stats() {
                assert!(!stats.accepting);
            }
            assert!(service.pools_created() <= 1);
        }
    }
}
