//! The contract every database backend implements.

use crate::completion::Completion;
use crate::error::{ErrorCategory, ErrorCode};
use crate::program::{PreparedStatement, Program, Query, RowHandler, dispatch_row, result};
use crate::row::Row;
use crate::service::Offload;
use crate::worker::WorkerPoolConfig;
use std::sync::Arc;

/// A database backend.
///
/// A driver is stateless apart from what it keeps in its
/// [`Implementation`](Driver::Implementation), the per-connection resource
/// (a native handle, a socket, and so on). One driver instance is shared by
/// every connection on an [`IoContext`](crate::IoContext) through its
/// [`Service`](crate::Service).
///
/// The synchronous operations report failure as an [`ErrorCode`] in the
/// driver's own [`ErrorCategory`] and never panic on backend errors.
///
/// The asynchronous operations have default bodies that run the
/// synchronous operation on the service's worker pool and post the
/// completion back to the caller's executor. A backend with a native
/// asynchronous API overrides them.
pub trait Driver: Send + Sync + Sized + 'static {
    /// Per-connection resource.
    type Implementation: Send + Sync + 'static;

    /// What `connect` needs, e.g. a path or a URL.
    type ConnectArg: Send + 'static;

    type Statement: PreparedStatement;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// The category this driver's error codes belong to.
    fn error_category(&self) -> &'static dyn ErrorCategory;

    /// Worker pool settings used when the service starts its pool.
    fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
    }

    fn create_implementation(&self) -> Self::Implementation;

    fn connect(
        &self,
        implementation: &Self::Implementation,
        arg: &Self::ConnectArg,
    ) -> Result<(), ErrorCode>;

    fn disconnect(&self, implementation: &Self::Implementation) -> Result<(), ErrorCode>;

    fn prepare(
        &self,
        implementation: &Self::Implementation,
        sql: &str,
    ) -> Result<Self::Statement, ErrorCode>;

    /// Run the program's query, passing each result row through
    /// [`dispatch_row`]. A row the handler rejects stops execution and its
    /// error's code is returned.
    fn execute<Q, H>(
        &self,
        implementation: &Self::Implementation,
        program: &mut Program<Q, H>,
    ) -> Result<(), ErrorCode>
    where
        Q: Query<Self::Statement>,
        H: RowHandler;

    /// Backend message for the most recent failure on this connection.
    fn last_error(&self, implementation: &Self::Implementation) -> String;

    fn async_connect(
        &self,
        offload: Offload<'_, Self>,
        implementation: Arc<Self::Implementation>,
        arg: Self::ConnectArg,
        completion: Completion<(ErrorCode,)>,
    ) {
        offload.run(move |driver| {
            let code = match driver {
                Ok(driver) => ErrorCode::from_result(&driver.connect(&implementation, &arg)),
                Err(code) => code,
            };
            completion.complete((code,));
        });
    }

    fn async_disconnect(
        &self,
        offload: Offload<'_, Self>,
        implementation: Arc<Self::Implementation>,
        completion: Completion<(ErrorCode,)>,
    ) {
        offload.run(move |driver| {
            let code = match driver {
                Ok(driver) => ErrorCode::from_result(&driver.disconnect(&implementation)),
                Err(code) => code,
            };
            completion.complete((code,));
        });
    }

    /// On failure the completion receives an empty statement.
    fn async_prepare(
        &self,
        offload: Offload<'_, Self>,
        implementation: Arc<Self::Implementation>,
        sql: String,
        completion: Completion<(Self::Statement, ErrorCode)>,
    ) {
        offload.run(move |driver| {
            let args = match driver.and_then(|driver| driver.prepare(&implementation, &sql)) {
                Ok(statement) => (statement, ErrorCode::success()),
                Err(code) => (Self::Statement::default(), code),
            };
            completion.complete(args);
        });
    }

    /// Rows are fetched into a buffer from the completion's allocator on the
    /// worker thread, then dispatched to the handler on the completion's
    /// executor, so the handler never runs on a worker.
    fn async_execute<Q, H>(
        &self,
        offload: Offload<'_, Self>,
        implementation: Arc<Self::Implementation>,
        program: Program<Q, H>,
        completion: Completion<(H::Output, ErrorCode)>,
    ) where
        Q: Query<Self::Statement> + 'static,
        H: RowHandler + Send + 'static,
        H::Output: Send + 'static,
    {
        offload.run(move |driver| {
            let allocator = completion.allocator().clone();
            let (query, handler) = program.into_parts();
            let mut buffered = Program::new(
                query,
                BufferRows {
                    rows: allocator.row_buffer(0),
                },
            );
            let code = match driver {
                Ok(driver) => ErrorCode::from_result(&driver.execute(&implementation, &mut buffered)),
                Err(code) => code,
            };
            let mut rows = buffered.into_handler().rows;

            completion.complete_with(move || {
                let mut handler = handler;
                let mut code = code;
                for row in rows.drain(..) {
                    if let Err(e) = dispatch_row(&mut handler, row) {
                        code = e.code();
                        break;
                    }
                }
                allocator.recycle(rows);
                (result(handler), code)
            });
        });
    }
}

/// Collects native rows on a worker for later dispatch.
struct BufferRows {
    rows: Vec<Row>,
}

impl RowHandler for BufferRows {
    type Row = Row;
    type Output = ();

    fn handle(&mut self, row: Row) -> crate::Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(self) {}
}
