//! # livepreview
//!
//! **livepreview** is a coroutine-powered development preview server for static-site build
//! tools. It serves a directory of generated files over HTTP, lets the build tool put a
//! chain of middleware in front of the files, and reloads connected browsers when the
//! output changes.
//!
//! ## Architecture
//!
//! - **[`server`]** - the [`DevServer`] facade, the port binder, and the per-connection
//!   service built on `may_minihttp`
//! - **[`middleware`]** - ordered middleware with a continuation/termination protocol
//! - **[`static_files`]** - URL path to file resolution
//! - **[`inject`]** - live-reload client snippet for HTML responses
//! - **[`reload`]** / **[`hot_reload`]** - change notifications and the directory watcher
//! - **[`environment`]** - base URL side channel
//! - **[`config`]**, **[`runtime_config`]**, **[`logging`]** - settings and observability
//! - **[`cli`]** - the `livepreview` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Browser
//!     participant Service as DevService<br/>(may_minihttp)
//!     participant Chain as MiddlewareChain
//!     participant Static as StaticFiles
//!     participant Inject as inject
//!
//!     Browser->>Service: GET /docs/
//!     alt /.livepreview/*
//!         Service-->>Browser: reload client / event frame
//!     end
//!     Service->>Chain: run(RequestContext)
//!     loop each middleware
//!         Chain->>Chain: handle(req, res, next)
//!         alt res.end()
//!             Chain-->>Service: Flow::Ended
//!         end
//!     end
//!     Chain-->>Service: Flow::Fallthrough
//!     Service->>Static: resolve("/docs/")
//!     Static-->>Service: docs/index.html
//!     Service->>Inject: inject_reload_client(body)
//!     Service-->>Browser: 200 text/html
//! ```
//!
//! ### Startup
//!
//! ```mermaid
//! stateDiagram-v2
//!     [*] --> Unbound
//!     Unbound --> Binding: serve(port)
//!     Binding --> Binding: AddrInUse (port + 1)
//!     Binding --> Bound
//!     Binding --> Failed
//!     Bound --> Closed: close()
//!     Failed --> Closed: close()
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use livepreview::{DevServer, ServerOptions};
//!
//! let server = DevServer::new("blog", "_site", ServerOptions::new().retry_count(5));
//! server.serve(8080)?;
//! println!("preview at {}", server.base_url()?);
//! // ... rebuild the site, then:
//! server.reload(["index.html"]);
//! server.close();
//! # Ok::<(), livepreview::ServeError>(())
//! ```
//!
//! ## Runtime Considerations
//!
//! livepreview uses the `may` coroutine runtime, not tokio. Every connection runs on its
//! own coroutine, and middleware run on that coroutine:
//!
//! - a middleware that waits on a `may` primitive (sleep, channel, socket) suspends only
//!   its own request;
//! - blocking std I/O in middleware blocks a runtime worker thread;
//! - coroutine stack size is configurable via `LIVEPREVIEW_STACK_SIZE`.

pub mod cli;
pub mod config;
pub mod environment;
pub mod error;
pub mod hot_reload;
pub mod inject;
pub mod logging;
pub mod middleware;
pub mod reload;
pub mod runtime_config;
pub mod server;
pub mod static_files;

pub use config::ServerConfig;
pub use error::{MiddlewareError, ResolveError, ServeError};
pub use logging::{Logger, SilentLogger, TracingLogger};
pub use middleware::{from_fn, Middleware, MiddlewareChain, Next};
pub use server::{DevServer, IncomingRequest, ResponseAccumulator, ServerOptions};
