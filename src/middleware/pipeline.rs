use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use super::{Middleware, Next};
use crate::error::MiddlewareError;
use crate::server::{IncomingRequest, ResponseAccumulator};

/// Ordered, immutable list of middleware shared by every request of a server.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Arc<[Arc<dyn Middleware>]>,
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl From<Vec<Arc<dyn Middleware>>> for MiddlewareChain {
    fn from(entries: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            entries: entries.into(),
        }
    }
}

impl MiddlewareChain {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drive `ctx` through the chain, starting at its cursor.
    ///
    /// Returns [`Flow::Ended`] as soon as a middleware ends the response and
    /// [`Flow::Fallthrough`] when the cursor runs off the end of the chain. An error or
    /// panic aborts the chain; so does a middleware that neither proceeds nor ends,
    /// since nothing could ever resume that request.
    pub fn run(&self, ctx: &mut RequestContext) -> Result<Flow, MiddlewareError> {
        while let Some(middleware) = self.entries.get(ctx.cursor) {
            let index = ctx.cursor;
            let mut next = Next::default();
            let request = &ctx.request;
            let response = &mut ctx.response;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                middleware.handle(request, response, &mut next)
            }));
            match outcome {
                Err(payload) => {
                    return Err(MiddlewareError::Panicked {
                        index,
                        message: panic_message(payload.as_ref()),
                    })
                }
                Ok(Err(source)) => return Err(MiddlewareError::Failed { index, source }),
                Ok(Ok(())) => {}
            }

            if ctx.response.is_ended() {
                if next.has_proceeded() {
                    debug!(index, "continuation called on an ended response; ignored");
                }
                return Ok(Flow::Ended { index });
            }
            if !next.has_proceeded() {
                return Err(MiddlewareError::Stalled { index });
            }
            ctx.cursor += 1;
        }
        Ok(Flow::Fallthrough)
    }
}

/// How a chain run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The middleware at `index` ended the response.
    Ended { index: usize },
    /// Every middleware proceeded (or the chain is empty).
    Fallthrough,
}

/// Per-request state threaded through the chain.
#[derive(Debug)]
pub struct RequestContext {
    pub request: IncomingRequest,
    pub response: ResponseAccumulator,
    cursor: usize,
}

impl RequestContext {
    #[must_use]
    pub fn new(request: IncomingRequest) -> Self {
        Self {
            request,
            response: ResponseAccumulator::new(),
            cursor: 0,
        }
    }

    /// Index of the next middleware to run.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.response.is_ended()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
