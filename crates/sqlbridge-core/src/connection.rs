//! Caller-facing database connection.
//!
//! A [`Connection`] ties one driver-specific resource to the [`Service`]
//! of an [`IoContext`] and to the executor its asynchronous completions
//! run on. Every operation comes in three forms:
//!
//! - `try_<op>` returns the driver's [`ErrorCode`] on failure and never
//!   builds an [`Error`];
//! - `<op>` returns an [`Error`] carrying the operation label and the
//!   backend's message text;
//! - `async_<op>` takes a [`CompletionToken`] and delivers the error code
//!   through the completion.
//!
//! A connection is not synchronized: callers keep at most one operation in
//! flight per connection.

use crate::allocator::AnyAllocator;
use crate::bind::_2;
use crate::completion::{CompletionToken, TokenContext};
use crate::context::IoContext;
use crate::driver::Driver;
use crate::error::{Error, ErrorCode};
use crate::executor::AnyExecutor;
use crate::program::{IgnoreResults, Program, Query, RowHandler, result};
use crate::service::Service;
use std::fmt;
use std::sync::Arc;

/// A connection through driver `D`.
pub struct Connection<D: Driver> {
    service: Arc<Service<D>>,
    implementation: Arc<D::Implementation>,
    executor: AnyExecutor,
    allocator: AnyAllocator,
}

impl<D: Driver + Default> Connection<D> {
    /// Create a connection whose completions run on `ctx`.
    #[must_use]
    pub fn new(ctx: &IoContext) -> Self {
        Self::with_executor(ctx, ctx.executor())
    }

    /// Create a connection on `ctx`'s service whose completions run on
    /// `executor`.
    #[must_use]
    pub fn with_executor(ctx: &IoContext, executor: AnyExecutor) -> Self {
        Self::from_service(Service::obtain(ctx), executor)
    }
}

impl<D: Driver> Connection<D> {
    /// Create a connection on an existing service.
    #[must_use]
    pub fn from_service(service: Arc<Service<D>>, executor: AnyExecutor) -> Self {
        let implementation = Arc::new(service.driver().create_implementation());
        Self {
            service,
            implementation,
            executor,
            allocator: AnyAllocator::default(),
        }
    }

    /// Use `allocator` for the intermediate buffers of asynchronous
    /// operations, unless a completion token brings its own.
    #[must_use]
    pub fn with_allocator(mut self, allocator: AnyAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn executor(&self) -> &AnyExecutor {
        &self.executor
    }

    pub fn allocator(&self) -> &AnyAllocator {
        &self.allocator
    }

    pub fn service(&self) -> &Arc<Service<D>> {
        &self.service
    }

    pub fn driver(&self) -> &D {
        self.service.driver()
    }

    /// The driver-specific resource behind this connection.
    pub fn implementation(&self) -> &D::Implementation {
        &self.implementation
    }

    /// Backend message for the most recent failure.
    pub fn last_error(&self) -> String {
        self.driver().last_error(&self.implementation)
    }

    fn token_context(&self, operation: &'static str) -> TokenContext {
        TokenContext {
            executor: self.executor.clone(),
            allocator: self.allocator.clone(),
            operation,
        }
    }

    fn fail(&self, operation: &'static str, code: ErrorCode) -> Error {
        let message = if code.is_in(self.driver().error_category()) {
            self.last_error()
        } else {
            code.message()
        };
        tracing::debug!(
            driver = self.driver().name(),
            operation,
            code = code.value(),
            %message,
            "operation failed"
        );
        Error::from_code(operation, code, message)
    }

    pub fn try_connect(&self, arg: impl Into<D::ConnectArg>) -> Result<(), ErrorCode> {
        self.driver().connect(&self.implementation, &arg.into())
    }

    #[allow(clippy::result_large_err)]
    pub fn connect(&self, arg: impl Into<D::ConnectArg>) -> crate::Result<()> {
        self.try_connect(arg).map_err(|code| self.fail("connect()", code))
    }

    /// Completes with `(ErrorCode,)`.
    pub fn async_connect<T>(&self, arg: impl Into<D::ConnectArg>, token: T) -> T::Output
    where
        T: CompletionToken<(ErrorCode,)>,
    {
        let (completion, output) = token.materialize(self.token_context("connect()"));
        self.driver().async_connect(
            self.service.offload(),
            Arc::clone(&self.implementation),
            arg.into(),
            completion,
        );
        output
    }

    pub fn try_disconnect(&self) -> Result<(), ErrorCode> {
        self.driver().disconnect(&self.implementation)
    }

    #[allow(clippy::result_large_err)]
    pub fn disconnect(&self) -> crate::Result<()> {
        self.try_disconnect()
            .map_err(|code| self.fail("disconnect()", code))
    }

    /// Completes with `(ErrorCode,)`.
    pub fn async_disconnect<T>(&self, token: T) -> T::Output
    where
        T: CompletionToken<(ErrorCode,)>,
    {
        let (completion, output) = token.materialize(self.token_context("disconnect()"));
        self.driver().async_disconnect(
            self.service.offload(),
            Arc::clone(&self.implementation),
            completion,
        );
        output
    }

    pub fn try_prepare(&self, sql: &str) -> Result<D::Statement, ErrorCode> {
        self.driver().prepare(&self.implementation, sql)
    }

    #[allow(clippy::result_large_err)]
    pub fn prepare(&self, sql: &str) -> crate::Result<D::Statement> {
        self.try_prepare(sql).map_err(|code| self.fail("prepare()", code))
    }

    /// Completes with `(statement, ErrorCode)`. The statement is empty when
    /// the code is an error.
    pub fn async_prepare<T>(&self, sql: impl Into<String>, token: T) -> T::Output
    where
        T: CompletionToken<(D::Statement, ErrorCode)>,
    {
        let (completion, output) = token.materialize(self.token_context("prepare()"));
        self.driver().async_prepare(
            self.service.offload(),
            Arc::clone(&self.implementation),
            sql.into(),
            completion,
        );
        output
    }

    /// Run a query and discard any rows it returns.
    pub fn try_execute<Q>(&self, query: Q) -> Result<(), ErrorCode>
    where
        Q: Query<D::Statement>,
    {
        let mut program = Program::new(query, IgnoreResults);
        self.driver().execute(&self.implementation, &mut program)
    }

    #[allow(clippy::result_large_err)]
    pub fn execute<Q>(&self, query: Q) -> crate::Result<()>
    where
        Q: Query<D::Statement>,
    {
        self.try_execute(query)
            .map_err(|code| self.fail("execute()", code))
    }

    /// Completes with `(ErrorCode,)`.
    pub fn async_execute<Q, T>(&self, query: Q, token: T) -> T::Output
    where
        Q: Query<D::Statement> + 'static,
        T: CompletionToken<(ErrorCode,)>,
    {
        let (completion, output) = token.materialize(self.token_context("execute()"));
        self.driver().async_execute(
            self.service.offload(),
            Arc::clone(&self.implementation),
            Program::new(query, IgnoreResults),
            completion.rebind((_2,)),
        );
        output
    }

    /// Run a program and return its handler's result.
    pub fn try_query<Q, H>(&self, program: Program<Q, H>) -> Result<H::Output, ErrorCode>
    where
        Q: Query<D::Statement>,
        H: RowHandler,
    {
        let mut program = program;
        self.driver().execute(&self.implementation, &mut program)?;
        Ok(result(program.into_handler()))
    }

    #[allow(clippy::result_large_err)]
    pub fn query<Q, H>(&self, program: Program<Q, H>) -> crate::Result<H::Output>
    where
        Q: Query<D::Statement>,
        H: RowHandler,
    {
        self.try_query(program)
            .map_err(|code| self.fail("query()", code))
    }

    /// Completes with `(result, ErrorCode)`. The handler sees each row on
    /// the completion's executor.
    pub fn async_query<Q, H, T>(&self, program: Program<Q, H>, token: T) -> T::Output
    where
        Q: Query<D::Statement> + 'static,
        H: RowHandler + Send + 'static,
        H::Output: Send + 'static,
        T: CompletionToken<(H::Output, ErrorCode)>,
    {
        let (completion, output) = token.materialize(self.token_context("query()"));
        self.driver().async_execute(
            self.service.offload(),
            Arc::clone(&self.implementation),
            program,
            completion,
        );
        output
    }
}

impl<D: Driver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("driver", &self.driver().name())
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{Suspend, UseFuture};
    use crate::empty::{EmptyDriver, EmptyStatement};
    use crate::error::FrameworkErrc;
    use crate::program::collect;
    use crate::row::Row;
    use asupersync::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_sync_forms() {
        let ctx = IoContext::new();
        let conn = Connection::<EmptyDriver>::new(&ctx);
        conn.try_connect(()).unwrap();
        conn.connect(()).unwrap();
        let stmt = conn.prepare("SELECT 1").unwrap();
        assert_eq!(crate::PreparedStatement::sql(&stmt), "SELECT 1");
        conn.execute(stmt).unwrap();
        conn.execute("DELETE FROM nothing").unwrap();
        let rows: Vec<Row> = conn.query(Program::new("SELECT 1", collect::<Row>())).unwrap();
        assert!(rows.is_empty());
        conn.disconnect().unwrap();
    }

    #[test]
    fn test_connections_share_one_service() {
        let ctx = IoContext::new();
        let a = Connection::<EmptyDriver>::new(&ctx);
        let b = Connection::<EmptyDriver>::new(&ctx);
        assert!(Arc::ptr_eq(a.service(), b.service()));
        assert_eq!(a.executor(), &ctx.executor());
    }

    #[test]
    fn test_async_execute_completes_once_on_executor() {
        let ctx = IoContext::new();
        let conn = Connection::<EmptyDriver>::new(&ctx);
        conn.connect(()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let executor = conn.executor().clone();

        conn.async_execute("SELECT 1", move |code: ErrorCode| {
            assert!(code.is_ok());
            assert!(executor.running_in_this_thread());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        ctx.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!conn.service().pool_started());
    }

    #[test]
    fn test_async_prepare_with_future() {
        let ctx = IoContext::new();
        let conn = Connection::<EmptyDriver>::new(&ctx);
        conn.connect(()).unwrap();
        let deferred = conn.async_prepare("SELECT 2", UseFuture);
        ctx.run();
        let stmt: EmptyStatement = deferred.wait().unwrap();
        assert_eq!(crate::PreparedStatement::sql(&stmt), "SELECT 2");
    }

    #[test]
    fn test_async_query_with_suspend() {
        let ctx = IoContext::new();
        let conn = Connection::<EmptyDriver>::new(&ctx);
        conn.connect(()).unwrap();
        let suspended = conn.async_query(Program::new("SELECT 3", collect::<i64>()), Suspend);
        ctx.run();
        match futures::executor::block_on(suspended) {
            Outcome::Ok(rows) => assert!(rows.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_disconnected_errors_use_framework_message() {
        let ctx = IoContext::new();
        let conn = Connection::<EmptyDriver>::new(&ctx);
        let code = conn.try_execute("SELECT 1").unwrap_err();
        assert_eq!(code, FrameworkErrc::NotConnected);

        let err = conn.execute("SELECT 1").unwrap_err();
        assert_eq!(err.code(), code);
        assert_eq!(err.operation(), Some("execute()"));
        assert_eq!(err.to_string(), "execute(): connection is not open");

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        conn.async_execute("SELECT 1", move |code: ErrorCode| {
            *slot.lock().unwrap() = Some(code);
        });
        ctx.run();
        assert_eq!(seen.lock().unwrap().unwrap(), FrameworkErrc::NotConnected);
    }
}
