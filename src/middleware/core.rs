use std::sync::Arc;

use crate::server::{IncomingRequest, ResponseAccumulator};

/// One entry in a request-handling chain.
///
/// A middleware inspects the request and the shared [`ResponseAccumulator`], then does
/// exactly one of:
///
/// - call [`Next::proceed`] to hand over to the next entry (or to the static fallback
///   after the last one);
/// - end the response with [`ResponseAccumulator::end`] so that nothing after it runs.
///
/// Middleware run on the connection's coroutine. Waiting on I/O, timers or channels
/// through `may` primitives (`may::coroutine::sleep`, `may::sync::mpsc`, `may::net`)
/// suspends only this request; the pipeline treats such middleware exactly like ones that
/// return immediately.
///
/// Any `Fn(&IncomingRequest, &mut ResponseAccumulator, &mut Next) -> anyhow::Result<()>`
/// closure is a middleware.
pub trait Middleware: Send + Sync {
    fn handle(
        &self,
        req: &IncomingRequest,
        res: &mut ResponseAccumulator,
        next: &mut Next,
    ) -> anyhow::Result<()>;
}

impl<F> Middleware for F
where
    F: Fn(&IncomingRequest, &mut ResponseAccumulator, &mut Next) -> anyhow::Result<()>
        + Send
        + Sync,
{
    fn handle(
        &self,
        req: &IncomingRequest,
        res: &mut ResponseAccumulator,
        next: &mut Next,
    ) -> anyhow::Result<()> {
        self(req, res, next)
    }
}

/// Continuation handed to each middleware invocation.
///
/// Proceeding records the request to continue; the pipeline acts on it once the
/// middleware returns, and only if the response has not ended by then.
#[derive(Debug, Default)]
pub struct Next {
    proceeded: bool,
}

impl Next {
    /// Pass control to the next middleware. Calling it more than once is harmless.
    pub fn proceed(&mut self) {
        self.proceeded = true;
    }

    #[must_use]
    pub fn has_proceeded(&self) -> bool {
        self.proceeded
    }
}

/// Wrap a closure as a shareable chain entry.
///
/// ```
/// use livepreview::middleware::from_fn;
///
/// let log_and_continue = from_fn(|req, _res, next| {
///     tracing::debug!(path = %req.path, "seen");
///     next.proceed();
///     Ok(())
/// });
/// # let _ = log_and_continue;
/// ```
pub fn from_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&IncomingRequest, &mut ResponseAccumulator, &mut Next) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}
