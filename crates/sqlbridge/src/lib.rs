//! sqlbridge - one connection API over many database client libraries.
//!
//! A backend implements [`Driver`]; callers use [`Connection`], which gives
//! every operation in three forms:
//!
//! - `try_connect`, `try_execute`, ... return the driver's [`ErrorCode`]
//! - `connect`, `execute`, ... return an [`Error`] carrying the backend's
//!   message
//! - `async_connect`, `async_execute`, ... run the blocking work on the
//!   driver's worker pool and complete through a token: a callback, a
//!   [`UseFuture`] deferred result, or a [`Suspend`] future to `.await`
//!
//! Results flow through a [`Program`]: a query paired with a
//! [`RowHandler`] that receives each row, converted to the shape it asks
//! for.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbridge::prelude::*;
//!
//! let ctx = IoContext::new();
//! let conn = Connection::<Sqlite>::new(&ctx);
//! conn.connect(":memory:")?;
//! conn.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
//! conn.execute("INSERT INTO notes (body) VALUES ('first'), ('second')")?;
//!
//! // Synchronous
//! let notes = conn.query(Program::new(
//!     "SELECT id, body FROM notes",
//!     collect::<(i64, String)>(),
//! ))?;
//!
//! // Callback, run on the context's executor
//! conn.async_query(
//!     Program::new("SELECT count(*) FROM notes", first::<i64>()),
//!     |count: Option<i64>, ec: ErrorCode| println!("{count:?} {ec}"),
//! );
//! ctx.run();
//! ```
//!
//! # Features
//!
//! - **sqlite** (default): the SQLite driver, re-exported as [`sqlite`]

// Re-export all public types from sub-crates
pub use sqlbridge_core::{
    adaptor, allocator, bind, completion, connection, context, driver, empty, error, executor,
    program, row, service, types, value, worker,
};
pub use sqlbridge_core::{
    // Data model
    Adaptor, ColumnInfo, FromRow, FromValue, IntoValue, Row, Value, ValueType,
    // Errors
    Error, ErrorCategory, ErrorCode, FrameworkErrc, Result,
    // Execution context and worker pool
    Admission, AnyExecutor, ContextService, Executor, IoContext, WorkGuard, WorkerPool,
    WorkerPoolConfig, WorkerPoolStats,
    // Allocators
    AnyAllocator, BufferAllocator, RecyclingAllocator, SystemAllocator,
    // Completion layer
    BindAllocator, BindExecutor, BoundHandler, Completion, CompletionArgs, CompletionToken,
    Deferred, ErasedHandler, Handler, Lit, Outcome, Placeholder, Suspend, Suspended,
    TokenContext, UseFuture, bind_allocator, bind_executor, bind_handler, lit,
    // Drivers and connections
    Connection, Driver, EmptyConnection, EmptyDriver, EmptyStatement, Offload, Service,
    // Result dispatch
    Collect, First, ForEach, IgnoreResults, IntoVec, PreparedStatement, Program, Query,
    QueryRef, RowHandler, collect, dispatch_row, first, for_each, ignore_results, into_vec,
    result,
};

#[cfg(feature = "sqlite")]
pub use sqlbridge_sqlite as sqlite;
#[cfg(feature = "sqlite")]
pub use sqlbridge_sqlite::{
    OpenFlags, Sqlite, SqliteConfig, SqliteConnectionExt, SqliteErrc, SqliteStatement,
};

/// Everything most programs need.
///
/// ```ignore
/// use sqlbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bind::{_1, _2, _3};
    pub use crate::{
        Adaptor, Connection, Error, ErrorCode, FromRow, FromValue, FrameworkErrc, Handler,
        IntoValue, IoContext, Outcome, PreparedStatement, Program, Row, RowHandler,
        Suspend, UseFuture, Value, bind_allocator, bind_executor, bind_handler, collect, first,
        for_each, ignore_results, into_vec,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{Sqlite, SqliteConfig, SqliteConnectionExt, SqliteErrc};
}
