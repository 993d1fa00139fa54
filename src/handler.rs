//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A server holds handlers of *different* types in one route table, so each
//! one is hidden behind a trait object (`dyn ErasedHandler<C>`), where `C` is
//! the context the handler receives: [`RequestContext`](crate::RequestContext)
//! for public routes, [`AuthenticatedContext`](crate::AuthenticatedContext)
//! for authenticated ones.
//!
//! ```text
//! async fn show(ctx: RequestContext) -> Result<(), Fault> { … }   ← user writes this
//!        ↓ server.get("/", show)
//! show.into_boxed_handler()                    ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                    ← stored as BoxedHandler<C>
//!        ↓
//! handler.call(ctx)  at request time           ← one vtable dispatch
//!        ↓
//! Box::pin(async { show(ctx).await.into_outcome() })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::fault::Fault;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler future.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<(), Fault>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler<C> {
    fn call(&self, ctx: C) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler<C> = Arc<dyn ErasedHandler<C> + Send + Sync + 'static>;

// ── Handler output ────────────────────────────────────────────────────────────

/// What a handler may return.
///
/// `()` for handlers that cannot fail, or `Result<(), E>` for any `E` that
/// converts into a [`Fault`].
pub trait HandlerOutput {
    fn into_outcome(self) -> Result<(), Fault>;
}

impl HandlerOutput for () {
    fn into_outcome(self) -> Result<(), Fault> { Ok(()) }
}

impl<E: Into<Fault>> HandlerOutput for Result<(), E> {
    fn into_outcome(self) -> Result<(), Fault> { self.map_err(Into::into) }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// Automatically satisfied for any `async fn` with the signature:
///
/// ```text
/// async fn name(ctx: C) -> impl HandlerOutput
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler<C>: private::Sealed<C> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler<C>;
}

mod private {
    pub trait Sealed<C> {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, C> private::Sealed<C> for F
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput + Send + 'static,
    C: Send + 'static,
{
}

impl<F, Fut, R, C> Handler<C> for F
where
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput + Send + 'static,
    C: Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler<C> {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R, C> ErasedHandler<C> for FnHandler<F>
where
    F: Fn(C) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutput + Send + 'static,
{
    fn call(&self, ctx: C) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
