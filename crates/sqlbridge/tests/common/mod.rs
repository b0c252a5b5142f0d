#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use sqlbridge::{Error, IoContext, Outcome};
use std::future::Future;

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see
/// it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

/// Run `ctx` on a background thread for as long as `f` runs on this one,
/// then let it drain.
pub fn with_running_context<R>(ctx: &IoContext, f: impl FnOnce() -> R) -> R {
    let guard = ctx.work_guard();
    std::thread::scope(|s| {
        let runner = s.spawn(|| ctx.run());
        let out = f();
        drop(guard);
        runner.join().expect("context runner panicked");
        out
    })
}
