//! Pipeline composition.
//!
//! [`compose`] turns an ordered list of middleware into one [`Composed`]
//! handler. Each invocation gets its own [`Dispatch`] with a fresh cursor, so
//! one `Composed` serves any number of concurrent requests.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::debug;

use super::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::context::Context;
use crate::error::{Error, Result};

/// Composes `middleware` into a single handler, outermost first.
pub fn compose(middleware: impl IntoIterator<Item = BoxedMiddleware>) -> Composed {
    Composed { stack: middleware.into_iter().collect() }
}

/// A composed pipeline. Cheap to clone, shares the stack.
///
/// A `Composed` is itself a [`Middleware`]: nested inside another pipeline,
/// its last layer continues into the outer pipeline's `next`.
#[derive(Clone)]
pub struct Composed {
    stack: Arc<[BoxedMiddleware]>,
}

impl Composed {
    /// Runs the whole pipeline against `ctx`.
    pub fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dispatch = Dispatch::new(&self.stack, None);
            dispatch.dispatch(0, ctx).await
        })
    }

    pub fn len(&self) -> usize { self.stack.len() }
    pub fn is_empty(&self) -> bool { self.stack.is_empty() }
}

impl Middleware for Composed {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let dispatch = Dispatch::new(&self.stack, Some(next));
            dispatch.dispatch(0, ctx).await
        })
    }

    fn name(&self) -> &str {
        "compose"
    }
}

impl fmt::Debug for Composed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stack.iter().map(|m| m.name()))
            .finish()
    }
}

/// Per-invocation dispatcher.
///
/// `cursor` is one past the highest index dispatched so far. Dispatching an
/// index below it means some `next` ran twice.
pub(crate) struct Dispatch<'a> {
    stack: &'a [BoxedMiddleware],
    tail: Option<Next<'a>>,
    cursor: AtomicUsize,
}

impl<'a> Dispatch<'a> {
    pub(crate) fn new(stack: &'a [BoxedMiddleware], tail: Option<Next<'a>>) -> Self {
        Self { stack, tail, cursor: AtomicUsize::new(0) }
    }

    pub(crate) fn dispatch<'b>(&'b self, index: usize, ctx: &'b mut Context) -> BoxFuture<'b, Result<()>>
    where
        'a: 'b,
    {
        let claimed = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                (index >= cursor).then_some(index + 1)
            });
        if claimed.is_err() {
            return Box::pin(async { Err(Error::NextCalledMultipleTimes) });
        }

        let Some(middleware) = self.stack.get(index) else {
            return match self.tail {
                Some(next) => next.run(ctx),
                None => Box::pin(async { Ok(()) }),
            };
        };
        debug!(index, middleware = middleware.name(), "dispatch");

        // A panic while building the future and one while polling it must
        // land in the same place: the returned future's `Err`.
        let next = Next::new(self, index + 1);
        let future = match panic::catch_unwind(AssertUnwindSafe(once(move || middleware.call(ctx, next)))) {
            Ok(future) => future,
            Err(payload) => return Box::pin(async move { Err(Error::from_panic(payload)) }),
        };
        Box::pin(async move {
            AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
        })
    }
}

/// Pins a closure to `FnOnce`, so it may hand out borrows of what it captured.
fn once<R, F: FnOnce() -> R>(f: F) -> F {
    f
}
