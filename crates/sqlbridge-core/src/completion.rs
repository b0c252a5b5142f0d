//! Completion tokens: one asynchronous operation, three calling styles.
//!
//! Every `async_*` operation takes a [`CompletionToken`]. The token decides
//! what the call returns and how the result is delivered:
//!
//! - any [`Handler`] (including a plain closure with annotated argument
//!   types) is invoked with the completion arguments, and the call returns
//!   `()`;
//! - [`UseFuture`] makes the call return a [`Deferred`] that can be waited
//!   on from another thread;
//! - [`Suspend`] makes the call return a [`Suspended`] future that resolves
//!   to an [`Outcome`] when awaited.
//!
//! Whatever the style, the result is always posted to an executor: the
//! handler's own associated executor if it has one (see
//! [`bind_executor`]), otherwise the executor of the connection that
//! started the operation. The same lookup picks the allocator used for
//! intermediate buffers.
//!
//! A token that fits none of these styles is rejected at compile time by
//! the `CompletionToken` bound on the operation.

use crate::Result;
use crate::allocator::AnyAllocator;
use crate::bind::{BoundHandler, SlotList, bind_handler};
use crate::error::{Error, ErrorCode};
use crate::executor::{AnyExecutor, WorkGuard};
use asupersync::Outcome;
use futures::channel::oneshot;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A callable that receives an operation's completion arguments.
///
/// `Args` is always a tuple. Closures taking one to three arguments
/// implement this for the matching tuple.
pub trait Handler<Args>: Send + 'static {
    fn invoke(self, args: Args);

    /// Executor this handler must run on, overriding the connection's.
    fn associated_executor(&self) -> Option<AnyExecutor> {
        None
    }

    /// Allocator for buffers the operation keeps on this handler's behalf.
    fn associated_allocator(&self) -> Option<AnyAllocator> {
        None
    }
}

impl<F, A> Handler<(A,)> for F
where
    F: FnOnce(A) + Send + 'static,
{
    fn invoke(self, (a,): (A,)) {
        self(a);
    }
}

impl<F, A, B> Handler<(A, B)> for F
where
    F: FnOnce(A, B) + Send + 'static,
{
    fn invoke(self, (a, b): (A, B)) {
        self(a, b);
    }
}

impl<F, A, B, C> Handler<(A, B, C)> for F
where
    F: FnOnce(A, B, C) + Send + 'static,
{
    fn invoke(self, (a, b, c): (A, B, C)) {
        self(a, b, c);
    }
}

/// A boxed handler taking its arguments as one tuple.
pub struct ErasedHandler<Args> {
    f: Box<dyn FnOnce(Args) + Send>,
}

impl<Args: 'static> ErasedHandler<Args> {
    pub fn new<H: Handler<Args>>(handler: H) -> Self {
        Self {
            f: Box::new(move |args| handler.invoke(args)),
        }
    }

    /// Wrap a closure that takes the whole argument tuple.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(Args) + Send + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl<Args: Send + 'static> Handler<Args> for ErasedHandler<Args> {
    fn invoke(self, args: Args) {
        (self.f)(args);
    }
}

impl<Args> fmt::Debug for ErasedHandler<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandler").finish_non_exhaustive()
    }
}

/// A handler with an explicit executor attached.
#[derive(Debug, Clone)]
pub struct BindExecutor<H> {
    executor: AnyExecutor,
    handler: H,
}

/// Run `handler` on `executor` regardless of which connection completes it.
pub fn bind_executor<H>(executor: AnyExecutor, handler: H) -> BindExecutor<H> {
    BindExecutor { executor, handler }
}

impl<H, Args> Handler<Args> for BindExecutor<H>
where
    H: Handler<Args>,
{
    fn invoke(self, args: Args) {
        self.handler.invoke(args);
    }

    fn associated_executor(&self) -> Option<AnyExecutor> {
        Some(self.executor.clone())
    }

    fn associated_allocator(&self) -> Option<AnyAllocator> {
        self.handler.associated_allocator()
    }
}

/// A handler with an explicit allocator attached.
#[derive(Debug, Clone)]
pub struct BindAllocator<H> {
    allocator: AnyAllocator,
    handler: H,
}

/// Use `allocator` for the intermediate buffers of the operation `handler`
/// completes.
pub fn bind_allocator<H>(allocator: AnyAllocator, handler: H) -> BindAllocator<H> {
    BindAllocator { allocator, handler }
}

impl<H, Args> Handler<Args> for BindAllocator<H>
where
    H: Handler<Args>,
{
    fn invoke(self, args: Args) {
        self.handler.invoke(args);
    }

    fn associated_executor(&self) -> Option<AnyExecutor> {
        self.handler.associated_executor()
    }

    fn associated_allocator(&self) -> Option<AnyAllocator> {
        Some(self.allocator.clone())
    }
}

/// What an operation knows about its caller when it materializes a token.
#[derive(Debug, Clone)]
pub struct TokenContext {
    /// The connection's executor, used unless the token supplies its own.
    pub executor: AnyExecutor,
    pub allocator: AnyAllocator,
    /// Operation label, e.g. `"execute()"`.
    pub operation: &'static str,
}

/// The arguments an operation completes with: an [`ErrorCode`] last,
/// optionally preceded by one value.
pub trait CompletionArgs: Send + 'static {
    /// What the future-style tokens resolve to on success.
    type Value: Send + 'static;

    fn error_code(&self) -> ErrorCode;

    #[allow(clippy::result_large_err)]
    fn into_result(self, operation: &'static str) -> Result<Self::Value>;
}

impl CompletionArgs for (ErrorCode,) {
    type Value = ();

    fn error_code(&self) -> ErrorCode {
        self.0
    }

    fn into_result(self, operation: &'static str) -> Result<()> {
        let (code,) = self;
        if code.is_err() {
            return Err(Error::from_code(operation, code, code.message()));
        }
        Ok(())
    }
}

impl<T: Send + 'static> CompletionArgs for (T, ErrorCode) {
    type Value = T;

    fn error_code(&self) -> ErrorCode {
        self.1
    }

    fn into_result(self, operation: &'static str) -> Result<T> {
        let (value, code) = self;
        if code.is_err() {
            return Err(Error::from_code(operation, code, code.message()));
        }
        Ok(value)
    }
}

/// A materialized completion: the erased handler plus where it runs.
///
/// Holding a `Completion` counts as outstanding work on its executor, so
/// the executor's context keeps running until the completion is delivered
/// or dropped.
pub struct Completion<Args> {
    handler: ErasedHandler<Args>,
    executor: AnyExecutor,
    allocator: AnyAllocator,
    operation: &'static str,
    work: WorkGuard,
}

impl<Args: Send + 'static> Completion<Args> {
    pub fn new<H: Handler<Args>>(
        handler: H,
        executor: AnyExecutor,
        allocator: AnyAllocator,
        operation: &'static str,
    ) -> Self {
        let work = executor.work();
        Self {
            handler: ErasedHandler::new(handler),
            executor,
            allocator,
            operation,
            work,
        }
    }

    pub fn executor(&self) -> &AnyExecutor {
        &self.executor
    }

    pub fn allocator(&self) -> &AnyAllocator {
        &self.allocator
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Deliver `args` to the handler on the completion's executor.
    ///
    /// The handler never runs inside this call, even when the caller is
    /// already on the right executor.
    pub fn complete(self, args: Args) {
        self.complete_with(move || args);
    }

    /// Like [`complete`](Self::complete), but computes the arguments on
    /// the executor right before the handler runs.
    pub fn complete_with<F>(self, make_args: F)
    where
        F: FnOnce() -> Args + Send + 'static,
    {
        let Completion {
            handler,
            executor,
            work,
            operation,
            ..
        } = self;
        tracing::trace!(operation, executor = executor.id(), "posting completion");
        executor.post(move || {
            handler.invoke(make_args());
            drop(work);
        });
    }

    /// Re-express this completion with a different argument list.
    ///
    /// `slots` selects, for each of this completion's arguments, either a
    /// placeholder into the new argument list or a literal. The executor,
    /// allocator and outstanding work carry over unchanged.
    pub fn rebind<Late, S>(self, slots: S) -> Completion<Late>
    where
        BoundHandler<ErasedHandler<Args>, S>: Handler<Late>,
        S: SlotList,
        Late: Send + 'static,
    {
        let Completion {
            handler,
            executor,
            allocator,
            operation,
            work,
        } = self;
        Completion {
            handler: ErasedHandler::new(bind_handler(handler, slots)),
            executor,
            allocator,
            operation,
            work,
        }
    }
}

impl<Args> fmt::Debug for Completion<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("operation", &self.operation)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// How an asynchronous operation delivers its result.
pub trait CompletionToken<Args>: Sized {
    /// What the initiating call returns.
    type Output;

    fn materialize(self, cx: TokenContext) -> (Completion<Args>, Self::Output);
}

impl<H, Args> CompletionToken<Args> for H
where
    H: Handler<Args>,
    Args: Send + 'static,
{
    type Output = ();

    fn materialize(self, cx: TokenContext) -> (Completion<Args>, ()) {
        let executor = self.associated_executor().unwrap_or(cx.executor);
        let allocator = self.associated_allocator().unwrap_or(cx.allocator);
        (Completion::new(self, executor, allocator, cx.operation), ())
    }
}

/// Token that makes an operation return a [`Deferred`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UseFuture;

/// Token that makes an operation return a [`Suspended`] future.
#[derive(Debug, Clone, Copy, Default)]
pub struct Suspend;

fn channel_completion<Args: CompletionArgs>(
    cx: TokenContext,
) -> (Completion<Args>, oneshot::Receiver<Result<Args::Value>>) {
    let (tx, rx) = oneshot::channel();
    let operation = cx.operation;
    let completion = Completion::new(
        ErasedHandler::from_fn(move |args: Args| {
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(args.into_result(operation));
        }),
        cx.executor,
        cx.allocator,
        operation,
    );
    (completion, rx)
}

// Implemented per argument shape rather than for every `CompletionArgs` so
// that these impls stay disjoint from the `Handler` blanket impl.
impl CompletionToken<(ErrorCode,)> for UseFuture {
    type Output = Deferred<()>;

    fn materialize(self, cx: TokenContext) -> (Completion<(ErrorCode,)>, Deferred<()>) {
        let operation = cx.operation;
        let (completion, rx) = channel_completion(cx);
        (completion, Deferred { rx, operation })
    }
}

impl<T: Send + 'static> CompletionToken<(T, ErrorCode)> for UseFuture {
    type Output = Deferred<T>;

    fn materialize(self, cx: TokenContext) -> (Completion<(T, ErrorCode)>, Deferred<T>) {
        let operation = cx.operation;
        let (completion, rx) = channel_completion(cx);
        (completion, Deferred { rx, operation })
    }
}

impl CompletionToken<(ErrorCode,)> for Suspend {
    type Output = Suspended<()>;

    fn materialize(self, cx: TokenContext) -> (Completion<(ErrorCode,)>, Suspended<()>) {
        let (completion, rx) = channel_completion(cx);
        (completion, Suspended { rx })
    }
}

impl<T: Send + 'static> CompletionToken<(T, ErrorCode)> for Suspend {
    type Output = Suspended<T>;

    fn materialize(self, cx: TokenContext) -> (Completion<(T, ErrorCode)>, Suspended<T>) {
        let (completion, rx) = channel_completion(cx);
        (completion, Suspended { rx })
    }
}

/// The pending result of an operation started with [`UseFuture`].
///
/// The completion is delivered through the connection's executor, so some
/// thread must be running that executor's context for `wait` to return.
#[must_use = "the operation result is lost if the Deferred is dropped"]
pub struct Deferred<T> {
    rx: oneshot::Receiver<Result<T>>,
    operation: &'static str,
}

impl<T> Deferred<T> {
    /// Block the calling thread until the operation completes.
    #[allow(clippy::result_large_err)]
    pub fn wait(self) -> Result<T> {
        let operation = self.operation;
        futures::executor::block_on(self).inspect_err(|e| {
            if matches!(e, Error::Cancelled) {
                tracing::debug!(operation, "completion dropped before delivery");
            }
        })
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<T>> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// The suspension point of an operation started with [`Suspend`].
///
/// Resolves to `Outcome::Ok` with the operation's value, or `Outcome::Err`
/// carrying the error built from the completion's code. Unrecoverable
/// codes arrive as [`Error::Fatal`], and a completion that is dropped
/// without being delivered arrives as [`Error::Cancelled`].
#[must_use = "futures do nothing unless awaited"]
pub struct Suspended<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Suspended<T> {
    type Output = Outcome<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Outcome::Ok(value)),
            Poll::Ready(Ok(Err(e))) => Poll::Ready(Outcome::Err(e)),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Outcome::Err(Error::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Suspended<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suspended").finish_non_exhaustive()
    }
}
