//! Middleware trait and type erasure.
//!
//! # The onion
//!
//! A middleware receives the request [`Context`] and a [`Next`] handle to the
//! rest of the pipeline. Code before `next.run(ctx).await` runs on the way
//! in, code after it runs on the way out, in reverse registration order:
//!
//! ```text
//!  request ──▶ a ─▶ b ─▶ c ──┐
//!                            │
//! response ◀── a ◀─ b ◀─ c ◀─┘
//! ```
//!
//! Not calling `next` short-circuits everything downstream. Calling it a
//! second time resolves to [`Error::NextCalledMultipleTimes`](crate::Error)
//! and runs nothing.
//!
//! # How middleware is stored
//!
//! The pipeline holds middleware of different concrete types, so each one is
//! erased to `Arc<dyn Middleware>` ([`BoxedMiddleware`]) and returns a
//! [`BoxFuture`]. Closures go through [`from_fn`]:
//!
//! ```rust
//! use shallot::middleware::from_fn;
//!
//! let timing = from_fn(|ctx, next| Box::pin(async move {
//!     let start = std::time::Instant::now();
//!     next.run(ctx).await?;
//!     let ms = start.elapsed().as_millis().to_string();
//!     ctx.set("x-response-time", &ms)?;
//!     Ok(())
//! }));
//! # let _ = timing;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;

mod compose;

pub use compose::{compose, Composed};
pub(crate) use compose::Dispatch;

/// A heap-allocated, type-erased future borrowing from the request.
///
/// `'a` ties the future to the `&mut Context` it runs against, which is what
/// lets middleware keep using `ctx` after awaiting `next`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A type-erased middleware shared across concurrent requests.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// One layer of the request pipeline.
///
/// Implement this for middleware that carries configuration; use [`from_fn`]
/// for closures.
///
/// ```rust
/// use shallot::middleware::{BoxFuture, Middleware, Next};
/// use shallot::{Context, Result};
///
/// struct PoweredBy(&'static str);
///
/// impl Middleware for PoweredBy {
///     fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move {
///             ctx.set("x-powered-by", self.0)?;
///             next.run(ctx).await
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>>;

    /// Name used in debug logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handle to the remainder of the pipeline.
///
/// `Copy`, so calling it twice compiles. The second call fails at runtime.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    dispatch: &'a Dispatch<'a>,
    index: usize,
}

impl<'a> Next<'a> {
    pub(crate) fn new(dispatch: &'a Dispatch<'a>, index: usize) -> Self {
        Self { dispatch, index }
    }

    /// Runs every downstream middleware and resolves when they have all
    /// unwound.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, Result<()>>
    where
        'a: 'b,
    {
        self.dispatch.dispatch(self.index, ctx)
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

// ── Closures ──────────────────────────────────────────────────────────────────

/// Wraps a closure as a [`Middleware`].
///
/// The closure returns a boxed future, typically `Box::pin(async move { .. })`.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FromFn(f)
}

/// Middleware built from a closure by [`from_fn`].
pub struct FromFn<F>(F);

impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        (self.0)(ctx, next)
    }

    fn name(&self) -> &str {
        "from_fn"
    }
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FromFn")
    }
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        (**self).call(ctx, next)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
