//! Error types for the preview server.
//!
//! Startup failures ([`ServeError`]) are fatal to a session and are handed back to the
//! caller through [`DevServer::port`](crate::server::DevServer::port). Per-request
//! failures ([`MiddlewareError`], [`ResolveError`]) are turned into a 5xx/404 response for
//! that request only and never reach the listener.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failure to start (or keep) a serving session.
///
/// `Clone` because every caller blocked in `port()` receives its own copy of the
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeError {
    /// Every candidate port from `first` to `last` was in use.
    PortExhausted {
        /// Port originally requested
        first: u16,
        /// Last candidate that was tried
        last: u16,
        /// Number of bind attempts made
        attempts: u32,
    },
    /// The transport refused to bind for a reason other than the port being taken.
    Bind {
        /// Candidate port at the time of the failure
        port: u16,
        /// Kind of the underlying I/O error
        kind: io::ErrorKind,
        /// Rendered I/O error
        message: String,
    },
    /// `serve()` was called on a server that already has an active session.
    AlreadyServing,
    /// The session was closed before (or while) binding completed.
    Closed,
    /// `port_timeout()` gave up waiting.
    Timeout,
}

impl ServeError {
    pub(crate) fn bind(port: u16, err: &io::Error) -> Self {
        ServeError::Bind {
            port,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServeError::PortExhausted {
                first,
                last,
                attempts,
            } => write!(
                f,
                "tried {attempts} different ports ({first}-{last}) but they were all in use; \
                 raise port_reassignment_retry_count or pick another port"
            ),
            ServeError::Bind {
                port,
                kind,
                message,
            } => write!(f, "could not bind port {port} ({kind:?}): {message}"),
            ServeError::AlreadyServing => write!(f, "server is already serving"),
            ServeError::Closed => write!(f, "server was closed"),
            ServeError::Timeout => write!(f, "timed out waiting for the server to bind"),
        }
    }
}

impl std::error::Error for ServeError {}

/// A middleware aborted the chain for one request.
#[derive(Debug)]
pub enum MiddlewareError {
    /// The middleware at `index` returned an error.
    Failed {
        /// Position in the chain
        index: usize,
        /// Error returned by the middleware
        source: anyhow::Error,
    },
    /// The middleware at `index` panicked.
    Panicked {
        /// Position in the chain
        index: usize,
        /// Panic payload, when it was a string
        message: String,
    },
    /// The middleware at `index` returned without proceeding or ending the response.
    Stalled {
        /// Position in the chain
        index: usize,
    },
}

impl MiddlewareError {
    /// Position of the offending middleware in the chain.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            MiddlewareError::Failed { index, .. }
            | MiddlewareError::Panicked { index, .. }
            | MiddlewareError::Stalled { index } => *index,
        }
    }
}

impl fmt::Display for MiddlewareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MiddlewareError::Failed { index, source } => {
                write!(f, "middleware #{index} failed: {source:#}")
            }
            MiddlewareError::Panicked { index, message } => {
                write!(f, "middleware #{index} panicked: {message}")
            }
            MiddlewareError::Stalled { index } => write!(
                f,
                "middleware #{index} returned without calling next.proceed() or ending the response"
            ),
        }
    }
}

impl std::error::Error for MiddlewareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MiddlewareError::Failed { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// The static fallback could not produce a file.
#[derive(Debug)]
pub enum ResolveError {
    /// Nothing on disk matches the URL (or the URL was malformed / escaped the root).
    NotFound,
    /// A matching file exists but could not be read.
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound => write!(f, "not found"),
            ResolveError::Read { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Read { source, .. } => Some(source),
            ResolveError::NotFound => None,
        }
    }
}
