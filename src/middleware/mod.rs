//! # Middleware Pipeline
//!
//! User-supplied functions interposed in front of the static fallback.
//!
//! ```text
//!  request ─▶ [mw 0] ─proceed─▶ [mw 1] ─proceed─▶ … ─▶ static fallback
//!                │                 │
//!               end               end
//!                ▼                 ▼
//!             flush             flush
//! ```
//!
//! All middleware of a request share one [`RequestContext`]: the response body written by
//! one entry is visible to, and may be extended by, every entry that runs after it until
//! the response is ended. The chain itself is frozen when the server is built and shared
//! read-only by all connections.

mod core;
mod pipeline;

pub use self::core::{from_fn, Middleware, Next};
pub use self::pipeline::{Flow, MiddlewareChain, RequestContext};
