//! A driver with no backend.
//!
//! [`EmptyDriver`] accepts every query and returns no rows. Its
//! asynchronous operations complete without a worker pool, which makes it
//! useful for exercising the completion machinery on its own.

use crate::completion::Completion;
use crate::driver::Driver;
use crate::error::{ErrorCategory, ErrorCode, FrameworkErrc};
use crate::program::{PreparedStatement, Program, Query, QueryRef, RowHandler, result};
use crate::service::Offload;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The no-op driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDriver;

/// Per-connection state: only whether `connect` has been called.
#[derive(Debug, Default)]
pub struct EmptyConnection {
    connected: AtomicBool,
}

impl EmptyConnection {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// A statement that remembers its text.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmptyStatement {
    sql: String,
}

impl PreparedStatement for EmptyStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

struct EmptyCategory;

impl ErrorCategory for EmptyCategory {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn message(&self, value: i32) -> String {
        if value == 0 {
            "no error".to_string()
        } else {
            format!("empty driver error {value}")
        }
    }
}

fn ensure_connected(implementation: &EmptyConnection) -> Result<(), ErrorCode> {
    if implementation.is_connected() {
        Ok(())
    } else {
        Err(FrameworkErrc::NotConnected.into())
    }
}

impl Driver for EmptyDriver {
    type Implementation = EmptyConnection;
    type ConnectArg = ();
    type Statement = EmptyStatement;

    fn name(&self) -> &'static str {
        "empty"
    }

    fn error_category(&self) -> &'static dyn ErrorCategory {
        &EmptyCategory
    }

    fn create_implementation(&self) -> EmptyConnection {
        EmptyConnection::default()
    }

    fn connect(&self, implementation: &EmptyConnection, _arg: &()) -> Result<(), ErrorCode> {
        implementation.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self, implementation: &EmptyConnection) -> Result<(), ErrorCode> {
        implementation.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn prepare(&self, implementation: &EmptyConnection, sql: &str) -> Result<EmptyStatement, ErrorCode> {
        ensure_connected(implementation)?;
        Ok(EmptyStatement {
            sql: sql.to_string(),
        })
    }

    fn execute<Q, H>(
        &self,
        implementation: &EmptyConnection,
        program: &mut Program<Q, H>,
    ) -> Result<(), ErrorCode>
    where
        Q: Query<EmptyStatement>,
        H: RowHandler,
    {
        ensure_connected(implementation)?;
        match program.query().as_query() {
            QueryRef::Text(sql) => tracing::trace!(sql, "empty execute"),
            QueryRef::Statement(stmt) => tracing::trace!(sql = stmt.sql(), "empty execute"),
        }
        Ok(())
    }

    fn last_error(&self, _implementation: &EmptyConnection) -> String {
        "no error".to_string()
    }

    fn async_connect(
        &self,
        _offload: Offload<'_, Self>,
        implementation: Arc<EmptyConnection>,
        arg: (),
        completion: Completion<(ErrorCode,)>,
    ) {
        let code = ErrorCode::from_result(&self.connect(&implementation, &arg));
        completion.complete((code,));
    }

    fn async_disconnect(
        &self,
        _offload: Offload<'_, Self>,
        implementation: Arc<EmptyConnection>,
        completion: Completion<(ErrorCode,)>,
    ) {
        let code = ErrorCode::from_result(&self.disconnect(&implementation));
        completion.complete((code,));
    }

    fn async_prepare(
        &self,
        _offload: Offload<'_, Self>,
        implementation: Arc<EmptyConnection>,
        sql: String,
        completion: Completion<(EmptyStatement, ErrorCode)>,
    ) {
        let args = match self.prepare(&implementation, &sql) {
            Ok(statement) => (statement, ErrorCode::success()),
            Err(code) => (EmptyStatement::default(), code),
        };
        completion.complete(args);
    }

    fn async_execute<Q, H>(
        &self,
        _offload: Offload<'_, Self>,
        implementation: Arc<EmptyConnection>,
        program: Program<Q, H>,
        completion: Completion<(H::Output, ErrorCode)>,
    ) where
        Q: Query<EmptyStatement> + 'static,
        H: RowHandler + Send + 'static,
        H::Output: Send + 'static,
    {
        completion.complete_with(move || {
            let mut program = program;
            let code = ErrorCode::from_result(&EmptyDriver.execute(&implementation, &mut program));
            (result(program.into_handler()), code)
        });
    }
}
