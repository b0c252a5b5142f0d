//! Core types and the driver framework for sqlbridge.
//!
//! This crate provides the backend-independent pieces:
//!
//! - `Value`, `Adaptor` and `Row` for moving data in and out of a database
//! - `Driver`, the contract a backend implements
//! - `Service` and `Connection`, the per-context driver owner and the
//!   caller-facing handle
//! - completion tokens that let every asynchronous operation be used as a
//!   callback, a blocking future, or an awaitable `Outcome`
//! - `Program` and `RowHandler`, which route result rows to a consumer

// Re-export asupersync's outcome type; `Suspend` completions resolve to it
pub use asupersync::Outcome;

pub mod adaptor;
pub mod allocator;
pub mod bind;
pub mod completion;
pub mod connection;
pub mod context;
pub mod driver;
pub mod empty;
pub mod error;
pub mod executor;
pub mod program;
pub mod row;
pub mod service;
pub mod types;
pub mod value;
pub mod worker;

pub use adaptor::Adaptor;
pub use allocator::{AnyAllocator, BufferAllocator, RecyclingAllocator, SystemAllocator};
pub use bind::{BoundHandler, Lit, Placeholder, SlotList, SlotPosition, bind_handler, lit};
pub use completion::{
    BindAllocator, BindExecutor, Completion, CompletionArgs, CompletionToken, Deferred,
    ErasedHandler, Handler, Suspend, Suspended, TokenContext, UseFuture, bind_allocator,
    bind_executor,
};
pub use connection::Connection;
pub use context::{ContextService, IoContext};
pub use driver::Driver;
pub use empty::{EmptyConnection, EmptyDriver, EmptyStatement};
pub use error::{
    BindError, DriverError, Error, ErrorCategory, ErrorCode, FatalError, FrameworkErrc,
    InvalidAccess, Result, RowWidthError, TypeError,
};
pub use executor::{AnyExecutor, Executor, Task, WorkGuard};
pub use program::{
    Collect, First, ForEach, IgnoreResults, IntoVec, PreparedStatement, Program, Query, QueryRef,
    RowHandler, collect, dispatch_row, first, for_each, ignore_results, into_vec, result,
};
pub use row::{ColumnInfo, FromRow, Row};
pub use service::{Offload, Service};
pub use types::ValueType;
pub use value::{FromValue, IntoValue, Value};
pub use worker::{Admission, WorkerPool, WorkerPoolConfig, WorkerPoolStats, default_worker_threads};
