use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::Result;

use super::context::Context;

/// A boxed future borrowing from the `&mut Context` passed to the closure
/// that produced it.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One link in a request's middleware chain. A middleware that wants the
/// chain to continue calls `ctx.next().await`; returning without calling it
/// short-circuits everything after it (including the terminal handler).
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut Context) -> Result<()>;
}

/// Wraps a plain async closure as a `Middleware`, for call sites that don't
/// need a named type.
pub struct FnMiddleware<F>(pub F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    async fn handle(&self, ctx: &mut Context) -> Result<()> {
        (self.0)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingMiddleware {
        order: Arc<AtomicUsize>,
        slot: usize,
    }

    #[async_trait]
    impl Middleware for RecordingMiddleware {
        async fn handle(&self, ctx: &mut Context) -> Result<()> {
            self.order.store(self.slot, Ordering::SeqCst);
            ctx.next().await
        }
    }

    struct ShortCircuitMiddleware;

    #[async_trait]
    impl Middleware for ShortCircuitMiddleware {
        async fn handle(&self, _ctx: &mut Context) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fn_middleware_wraps_a_closure() {
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = called.clone();
        fn constrain<F>(f: F) -> F
        where
            F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<()>>,
        {
            f
        }

        let mw = FnMiddleware(constrain(move |ctx: &mut Context| {
            let called = called2.clone();
            Box::pin(async move {
                called.store(1, Ordering::SeqCst);
                ctx.next().await
            })
        }));
        let mut ctx = Context::empty();
        // No chain installed, so next() hits the no-op tail position.
        let _ = mw.handle(&mut ctx).await;
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn short_circuit_middleware_compiles_as_trait_object() {
        let _mw: Box<dyn Middleware> = Box::new(ShortCircuitMiddleware);
    }
}
