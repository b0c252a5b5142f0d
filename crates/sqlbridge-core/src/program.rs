//! Result dispatch: a query paired with the consumer of its rows.
//!
//! A [`Program`] bundles what to run (query text, or a prepared statement
//! borrowed or owned) with a [`RowHandler`] that receives each row and may
//! produce an aggregate result at the end. Drivers feed rows through
//! [`dispatch_row`], which converts a row only when the handler asks for
//! something other than [`Row`], and finish with [`result`].

use crate::Result;
use crate::row::{FromRow, Row};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

/// A driver's compiled query.
///
/// `Default` yields the empty statement that stands in for a failed
/// `prepare`; it has no parameters and nothing to run.
pub trait PreparedStatement: Default + Send + 'static {
    /// Text of the query this statement was prepared from.
    fn sql(&self) -> &str;

    fn parameter_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.sql().is_empty()
    }
}

/// The query side of a program as a driver sees it.
pub enum QueryRef<'a, S> {
    Text(&'a str),
    Statement(&'a mut S),
}

impl<S: PreparedStatement> fmt::Debug for QueryRef<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRef::Text(sql) => f.debug_tuple("Text").field(sql).finish(),
            QueryRef::Statement(stmt) => f.debug_tuple("Statement").field(&stmt.sql()).finish(),
        }
    }
}

/// Anything a driver with statement type `S` can execute: query text, or a
/// statement held by value or by mutable reference.
pub trait Query<S>: Send {
    fn as_query(&mut self) -> QueryRef<'_, S>;
}

impl<S> Query<S> for &str {
    fn as_query(&mut self) -> QueryRef<'_, S> {
        QueryRef::Text(*self)
    }
}

impl<S> Query<S> for String {
    fn as_query(&mut self) -> QueryRef<'_, S> {
        QueryRef::Text(self.as_str())
    }
}

impl<S: PreparedStatement> Query<S> for S {
    fn as_query(&mut self) -> QueryRef<'_, S> {
        QueryRef::Statement(self)
    }
}

impl<S: PreparedStatement> Query<S> for &mut S {
    fn as_query(&mut self) -> QueryRef<'_, S> {
        QueryRef::Statement(self)
    }
}

/// Per-row consumer of a query's results.
pub trait RowHandler {
    /// The shape rows are delivered in. `Row` itself means no conversion.
    type Row: FromRow + 'static;

    /// Aggregate produced once all rows are consumed. `()` for handlers
    /// that only observe rows.
    type Output;

    #[allow(clippy::result_large_err)]
    fn handle(&mut self, row: Self::Row) -> Result<()>;

    fn finish(self) -> Self::Output;
}

/// Deliver one row to `handler`, converting it only if the handler does not
/// accept [`Row`] directly.
#[allow(clippy::result_large_err)]
pub fn dispatch_row<H: RowHandler>(handler: &mut H, row: Row) -> Result<()> {
    let mut slot = Some(row);
    let native = (&mut slot as &mut dyn Any).downcast_mut::<Option<H::Row>>();
    if let Some(row) = native.and_then(Option::take) {
        return handler.handle(row);
    }
    match slot {
        Some(row) => handler.handle(H::Row::from_row(row)?),
        None => Ok(()),
    }
}

/// The handler's aggregate result.
pub fn result<H: RowHandler>(handler: H) -> H::Output {
    handler.finish()
}

/// A query and its row handler, executed together.
pub struct Program<Q, H> {
    query: Q,
    handler: H,
}

impl<Q, H: RowHandler> Program<Q, H> {
    pub fn new(query: Q, handler: H) -> Self {
        Self { query, handler }
    }

    pub fn query(&mut self) -> &mut Q {
        &mut self.query
    }

    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Borrow the query and the handler at the same time, as a driver
    /// running the query needs to.
    pub fn parts_mut(&mut self) -> (&mut Q, &mut H) {
        (&mut self.query, &mut self.handler)
    }

    /// Split into the query and the handler.
    pub fn into_parts(self) -> (Q, H) {
        (self.query, self.handler)
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl<Q, H> fmt::Debug for Program<Q, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("query", &std::any::type_name::<Q>())
            .field("handler", &std::any::type_name::<H>())
            .finish()
    }
}

/// Handler that drops every row.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreResults;

impl RowHandler for IgnoreResults {
    type Row = Row;
    type Output = ();

    fn handle(&mut self, _row: Row) -> Result<()> {
        Ok(())
    }

    fn finish(self) {}
}

pub fn ignore_results() -> IgnoreResults {
    IgnoreResults
}

/// Calls a closure with each row converted to `T`.
pub struct ForEach<T, F> {
    f: F,
    _row: PhantomData<fn(T)>,
}

impl<T, F> RowHandler for ForEach<T, F>
where
    T: FromRow + 'static,
    F: FnMut(T),
{
    type Row = T;
    type Output = ();

    fn handle(&mut self, row: T) -> Result<()> {
        (self.f)(row);
        Ok(())
    }

    fn finish(self) {}
}

pub fn for_each<T, F>(f: F) -> ForEach<T, F>
where
    T: FromRow + 'static,
    F: FnMut(T),
{
    ForEach {
        f,
        _row: PhantomData,
    }
}

/// Collects every row, converted to `T`, into a `Vec`.
#[derive(Debug)]
pub struct Collect<T> {
    rows: Vec<T>,
}

impl<T> Default for Collect<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: FromRow + 'static> RowHandler for Collect<T> {
    type Row = T;
    type Output = Vec<T>;

    fn handle(&mut self, row: T) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(self) -> Vec<T> {
        self.rows
    }
}

pub fn collect<T: FromRow + 'static>() -> Collect<T> {
    Collect::default()
}

/// Appends every row, converted to `T`, to a caller-owned `Vec`.
#[derive(Debug)]
pub struct IntoVec<'a, T> {
    target: &'a mut Vec<T>,
}

impl<T: FromRow + 'static> RowHandler for IntoVec<'_, T> {
    type Row = T;
    type Output = ();

    fn handle(&mut self, row: T) -> Result<()> {
        self.target.push(row);
        Ok(())
    }

    fn finish(self) {}
}

pub fn into_vec<T: FromRow + 'static>(target: &mut Vec<T>) -> IntoVec<'_, T> {
    IntoVec { target }
}

/// Keeps the first row, converted to `T`, and skips the rest.
#[derive(Debug)]
pub struct First<T> {
    row: Option<T>,
}

impl<T> Default for First<T> {
    fn default() -> Self {
        Self { row: None }
    }
}

impl<T: FromRow + 'static> RowHandler for First<T> {
    type Row = T;
    type Output = Option<T>;

    fn handle(&mut self, row: T) -> Result<()> {
        if self.row.is_none() {
            self.row = Some(row);
        }
        Ok(())
    }

    fn finish(self) -> Option<T> {
        self.row
    }
}

pub fn first<T: FromRow + 'static>() -> First<T> {
    First::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONVERSIONS: AtomicUsize = AtomicUsize::new(0);

    /// Row shape that counts how often it is built from a row.
    #[derive(Debug, PartialEq)]
    struct Pair(i64, String);

    impl FromRow for Pair {
        fn from_row(row: Row) -> Result<Self> {
            CONVERSIONS.fetch_add(1, Ordering::SeqCst);
            let (a, b) = <(i64, String)>::from_row(row)?;
            Ok(Pair(a, b))
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new(
                vec!["id".into(), "name".into()],
                vec![Value::Integer(1), Value::Text("a".into())],
            ),
            Row::new(
                vec!["id".into(), "name".into()],
                vec![Value::Integer(2), Value::Text("b".into())],
            ),
        ]
    }

    fn run<H: RowHandler>(mut handler: H) -> Result<H::Output> {
        for row in rows() {
            dispatch_row(&mut handler, row)?;
        }
        Ok(result(handler))
    }

    #[test]
    fn test_native_rows_are_not_converted() {
        let before = CONVERSIONS.load(Ordering::SeqCst);
        let collected = run(collect::<Row>()).unwrap();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].get_named::<String>("name").unwrap(), "b");
        assert_eq!(CONVERSIONS.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_declared_shape_triggers_conversion_with_same_values() {
        let native = run(collect::<Row>()).unwrap();
        let converted = run(collect::<Pair>()).unwrap();
        assert_eq!(
            converted,
            vec![Pair(1, "a".into()), Pair(2, "b".into())]
        );
        for (row, pair) in native.iter().zip(&converted) {
            assert_eq!(row.get_as::<i64>(0).unwrap(), pair.0);
        }
    }

    #[test]
    fn test_conversion_failure_stops_dispatch() {
        let err = run(collect::<(i64,)>()).unwrap_err();
        assert!(matches!(err, Error::RowWidth(_)), "got {err:?}");
    }

    #[test]
    fn test_stock_handlers() {
        run(ignore_results()).unwrap();

        let mut names = Vec::new();
        run(for_each(|(_, name): (i64, String)| names.push(name))).unwrap();
        assert_eq!(names, vec!["a", "b"]);

        let mut ids: Vec<(i64, String)> = vec![(0, "seed".into())];
        run(into_vec(&mut ids)).unwrap();
        assert_eq!(ids.len(), 3);

        assert_eq!(run(first::<(i64, String)>()).unwrap(), Some((1, "a".into())));
    }

    #[derive(Default)]
    struct Stmt(String);

    impl PreparedStatement for Stmt {
        fn sql(&self) -> &str {
            &self.0
        }

        fn parameter_count(&self) -> usize {
            0
        }
    }

    fn describe<Q: Query<Stmt>>(mut q: Q) -> String {
        format!("{:?}", q.as_query())
    }

    #[test]
    fn test_query_forms() {
        assert_eq!(describe("SELECT 1"), "Text(\"SELECT 1\")");
        assert_eq!(describe(String::from("SELECT 2")), "Text(\"SELECT 2\")");
        assert_eq!(describe(Stmt("SELECT 3".into())), "Statement(\"SELECT 3\")");
        let mut stmt = Stmt("SELECT 4".into());
        assert_eq!(describe(&mut stmt), "Statement(\"SELECT 4\")");
        assert!(Stmt::default().is_empty());
    }

    #[test]
    fn test_program_parts() {
        let mut program = Program::new("SELECT 1", collect::<i64>());
        assert_eq!(*program.query(), "SELECT 1");
        program.handler().handle(5).unwrap();
        let (query, handler) = program.into_parts();
        assert_eq!(query, "SELECT 1");
        assert_eq!(result(handler), vec![5]);
    }
}
