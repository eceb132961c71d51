//! Middleware composition: turns an ordered list of middleware plus a
//! terminal handler into one compiled chain.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

use crate::context::Context;
use crate::error::{should_stop_middleware_chain, Error};
use crate::handler::CanonicalHandler;

/// Priorities range 1..100; 1 is outermost. Unspecified middleware defaults
/// here.
pub const DEFAULT_PRIORITY: u8 = 50;

/// One middleware registration before composition: its priority, the order
/// it was declared in within its originating node (used as the composition
/// tie-breaker), and the factory-produced wrapper itself.
#[derive(Clone)]
pub struct MiddlewareEntry {
    pub priority: u8,
    pub execution_order: usize,
    pub middleware: Rc<dyn Middleware>,
}

/// A middleware wraps the next handler in the chain. `next` is the
/// continuation; implementations call it (or don't, to short-circuit) and
/// may inspect/mutate the context before and after.
pub trait Middleware {
    fn call(
        &self,
        ctx: Context,
        next: Next<'_>,
    ) -> LocalBoxFuture<'static, (Context, Result<(), Error>)>;
}

/// The continuation handed to a middleware's `call`. Wraps the remaining
/// chain (further middleware, then the terminal handler) as a single
/// callable.
pub struct Next<'a> {
    inner: &'a CanonicalHandler,
}

impl<'a> Next<'a> {
    pub fn call(&self, ctx: Context) -> LocalBoxFuture<'static, (Context, Result<(), Error>)> {
        (self.inner)(ctx)
    }
}

/// Builds the ordered middleware list for a route: concatenates the
/// accumulated parent-group list with the node's own list, or resets to
/// just the node's own list when `override_parent_mw` is set.
pub fn accumulate(
    parent: &[MiddlewareEntry],
    own: Vec<MiddlewareEntry>,
    override_parent_mw: bool,
) -> Vec<MiddlewareEntry> {
    if override_parent_mw {
        own
    } else {
        let mut combined = parent.to_vec();
        combined.extend(own);
        combined
    }
}

/// Stable-sorts by `(priority, execution_order)` ascending, then folds
/// right-to-left so the first entry after sorting becomes the outermost
/// wrapper.
pub fn compile(entries: Vec<MiddlewareEntry>, terminal: CanonicalHandler) -> CanonicalHandler {
    let mut sorted = entries;
    sorted.sort_by_key(|e| (e.priority, e.execution_order));

    sorted
        .into_iter()
        .rev()
        .fold(terminal, |inner: CanonicalHandler, entry| {
            let inner = Rc::new(inner);
            let mw = entry.middleware;
            Box::new(move |ctx: Context| {
                let inner = Rc::clone(&inner);
                let mw = Rc::clone(&mw);
                Box::pin(async move {
                    let next = Next { inner: &inner };
                    mw.call(ctx, next).await
                })
            })
        })
}

/// Wraps a "before/after"-style middleware function: runs `before`, calls
/// `next` unless `before` already signalled a terminal condition, then runs
/// `after` unless the chain is now terminal. This is the composition
/// wrapper referenced by the short-circuit rule: it consults
/// [`should_stop_middleware_chain`] both before invoking `next` and before
/// running the `after` stage.
pub struct BeforeAfter<B, A> {
    pub before: B,
    pub after: A,
}

impl<B, A> Middleware for BeforeAfter<B, A>
where
    B: Fn(&mut Context) -> Result<(), Error>,
    A: Fn(&mut Context, Result<(), &Error>) + Clone + 'static,
{
    fn call(
        &self,
        mut ctx: Context,
        next: Next<'_>,
    ) -> LocalBoxFuture<'static, (Context, Result<(), Error>)> {
        let before_result = (self.before)(&mut ctx);
        if should_stop_middleware_chain(before_result.as_ref().err(), ctx.response()) {
            return Box::pin(async move { (ctx, before_result) });
        }

        let fut = next.call(ctx);
        let after = self.after.clone();
        Box::pin(async move {
            let (mut ctx, result) = fut.await;
            after(&mut ctx, result.as_ref().map(|_| ()).map_err(|e| e));
            (ctx, result)
        })
    }
}
