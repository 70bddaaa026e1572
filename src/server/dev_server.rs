//! The public face of the crate: a named preview server over one site directory.

use may_minihttp::HttpServer;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::debug;

use super::binder::{probe_free_port, BindState, Listening, PortBinder};
use super::request::IncomingRequest;
use super::response::ResponseAccumulator;
use super::service::DevService;
use crate::config::ServerConfig;
use crate::environment::EnvPublisher;
use crate::error::ServeError;
use crate::hot_reload::{watch_dir, DirWatcher};
use crate::logging::{Logger, TracingLogger};
use crate::middleware::{from_fn, Middleware, MiddlewareChain, Next};
use crate::reload::ReloadHub;
use crate::runtime_config::RuntimeConfig;
use crate::static_files::StaticFiles;

/// Construction-time settings of a [`DevServer`].
#[derive(Clone)]
pub struct ServerOptions {
    pub config: ServerConfig,
    pub logger: Arc<dyn Logger>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            config: ServerConfig::default(),
            logger: Arc::new(TracingLogger::default()),
            middleware: Vec::new(),
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("config", &self.config)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl ServerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Append a closure to the middleware chain.
    #[must_use]
    pub fn middleware<F>(self, f: F) -> Self
    where
        F: Fn(&IncomingRequest, &mut ResponseAccumulator, &mut Next) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.with_middleware(from_fn(f))
    }

    #[must_use]
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    #[must_use]
    pub fn retry_count(mut self, retries: u32) -> Self {
        self.config.port_reassignment_retry_count = retries;
        self
    }

    #[must_use]
    pub fn inject_base_url(mut self, enabled: bool) -> Self {
        self.config.inject_base_url_into_environment = enabled;
        self
    }
}

/// State of one `serve()` call.
#[derive(Debug)]
pub struct ServerSession {
    requested_port: OnceLock<u16>,
    binder: PortBinder,
    publisher: Option<EnvPublisher>,
    watcher: Mutex<Option<DirWatcher>>,
}

impl ServerSession {
    fn new(config: &ServerConfig) -> Self {
        Self {
            requested_port: OnceLock::new(),
            binder: PortBinder::new(),
            publisher: config
                .inject_base_url_into_environment
                .then(|| EnvPublisher::new(config.base_url_env_var.clone())),
            watcher: Mutex::new(None),
        }
    }

    /// Port passed to `serve()`, if it has been called.
    #[must_use]
    pub fn requested_port(&self) -> Option<u16> {
        self.requested_port.get().copied()
    }

    #[must_use]
    pub fn state(&self) -> BindState {
        self.binder.state()
    }

    fn watcher(&self) -> MutexGuard<'_, Option<DirWatcher>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tear the session down. Returns `false` if it was already closed.
    fn close(&self) -> bool {
        if !self.binder.close() {
            return false;
        }
        self.watcher().take();
        if let Some(publisher) = &self.publisher {
            publisher.unpublish();
        }
        true
    }
}

/// Development preview server for one site directory.
///
/// ```rust,no_run
/// use livepreview::server::{DevServer, ServerOptions};
///
/// let server = DevServer::new(
///     "docs",
///     "_site",
///     ServerOptions::new().middleware(|req, res, next| {
///         if req.path == "/ping" {
///             res.end_with("pong");
///         } else {
///             next.proceed();
///         }
///         Ok(())
///     }),
/// );
/// server.serve(8080)?;
/// println!("listening on {}", server.port()?);
/// server.close();
/// # Ok::<(), livepreview::ServeError>(())
/// ```
pub struct DevServer {
    name: String,
    root: PathBuf,
    config: Arc<ServerConfig>,
    chain: MiddlewareChain,
    logger: Arc<dyn Logger>,
    hub: Arc<ReloadHub>,
    session: Mutex<Arc<ServerSession>>,
}

impl fmt::Debug for DevServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DevServer")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("chain", &self.chain)
            .finish()
    }
}

impl DevServer {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, options: ServerOptions) -> Self {
        let ServerOptions {
            config,
            logger,
            middleware,
        } = options;
        let session = Arc::new(ServerSession::new(&config));
        Self {
            name: name.into(),
            root: root.into(),
            config: Arc::new(config),
            chain: MiddlewareChain::from(middleware),
            logger,
            hub: Arc::new(ReloadHub::new()),
            session: Mutex::new(session),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Browser notification hub shared by every session of this server.
    #[must_use]
    pub fn hub(&self) -> &Arc<ReloadHub> {
        &self.hub
    }

    fn current(&self) -> Arc<ServerSession> {
        Arc::clone(&self.session.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Start serving on `port` (0 for any free port) without waiting for the bind.
    ///
    /// Fails only when a session is binding or bound; bind failures are reported by
    /// [`port`](Self::port), and a session whose bind failed is replaced by the next call.
    pub fn serve(&self, port: u16) -> Result<(), ServeError> {
        let session = {
            let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.state() {
                BindState::Closed => *slot = Arc::new(ServerSession::new(&self.config)),
                BindState::Failed(_) => {
                    slot.close();
                    *slot = Arc::new(ServerSession::new(&self.config));
                }
                _ => {}
            }
            if slot.requested_port.set(port).is_err() {
                return Err(ServeError::AlreadyServing);
            }
            Arc::clone(&slot)
        };

        RuntimeConfig::from_env().apply_once();

        let static_files = StaticFiles::new(&self.root)
            .with_index_files(self.config.index_file_names.clone());
        let service = DevService::new(
            static_files,
            self.chain.clone(),
            &self.config,
            Arc::clone(&self.hub),
            Arc::clone(&self.logger),
        );
        let task = BindTask {
            session: Arc::clone(&session),
            service,
            config: Arc::clone(&self.config),
            logger: Arc::clone(&self.logger),
            hub: Arc::clone(&self.hub),
            root: self.root.clone(),
            name: self.name.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("livepreview-bind-{}", self.name))
            .spawn(move || task.run(port));
        if let Err(e) = spawned {
            let err = ServeError::bind(port, &e);
            if session.binder.fail(err.clone()).is_err() {
                debug!(port, "bind thread could not be started");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Bound port of the current session, waiting for the bind sequence if needed.
    pub fn port(&self) -> Result<u16, ServeError> {
        self.current().binder.port()
    }

    /// [`port`](Self::port) with an upper bound on the wait.
    pub fn port_timeout(&self, timeout: Duration) -> Result<u16, ServeError> {
        self.current().binder.port_timeout(timeout)
    }

    /// `http://host:port/` of the current session.
    pub fn base_url(&self) -> Result<String, ServeError> {
        self.port().map(|port| self.config.base_url(port))
    }

    /// Stop listening, stop watching and withdraw the published base URL. Idempotent.
    pub fn close(&self) {
        let session = self.current();
        if session.close() && session.requested_port().is_some() {
            self.logger.info(&format!("Server \"{}\" closed", self.name));
        }
    }

    /// Tell connected browsers that `files` changed.
    pub fn reload<I, S>(&self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files: Vec<String> = files.into_iter().map(Into::into).collect();
        let generation = self.hub.notify(files);
        debug!(server = %self.name, generation, "reload requested");
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the bind thread needs.
struct BindTask {
    session: Arc<ServerSession>,
    service: DevService,
    config: Arc<ServerConfig>,
    logger: Arc<dyn Logger>,
    hub: Arc<ReloadHub>,
    root: PathBuf,
    name: String,
}

impl BindTask {
    fn run(self, port: u16) {
        let addr = self.config.bind_address;
        let initial = if port == 0 {
            match probe_free_port(addr) {
                Ok(free) => free,
                Err(e) => {
                    let err = ServeError::bind(0, &e);
                    self.logger.error(&err.to_string());
                    if self.session.binder.fail(err).is_err() {
                        debug!("ephemeral port probe failed");
                    }
                    return;
                }
            }
        } else {
            port
        };

        let service = &self.service;
        let publisher = self.session.publisher.as_ref();
        let config = &self.config;
        let outcome = self.session.binder.bind_with(
            initial,
            config.port_reassignment_retry_count,
            |candidate| {
                let socket = SocketAddr::new(addr, candidate);
                // may listeners set SO_REUSEPORT, so a port held by another may server
                // would be shared instead of refused. A plain std bind reports AddrInUse.
                drop(std::net::TcpListener::bind(socket)?);
                let handle = HttpServer(service.clone()).start(socket)?;
                Ok(Listening::new(move || {
                    // SAFETY: cancelling the accept coroutine is how may_minihttp servers
                    // are stopped; the handle is owned here and joined right after.
                    unsafe {
                        handle.coroutine().cancel();
                    }
                    if handle.join().is_err() {
                        debug!(port = candidate, "accept loop ended abnormally");
                    }
                }))
            },
            |bound| {
                if let Some(publisher) = publisher {
                    publisher.publish(&config.base_url(bound));
                }
            },
        );

        match outcome {
            Ok(bound) => {
                self.logger
                    .info(&format!("Server at {}", self.config.base_url(bound)));
                if self.config.watch {
                    self.start_watching();
                }
            }
            Err(ServeError::Closed) => debug!(server = %self.name, "closed before binding"),
            Err(err) => self.logger.error(&err.to_string()),
        }
    }

    fn start_watching(&self) {
        match watch_dir(&self.root, Arc::clone(&self.hub)) {
            Ok(watcher) => {
                let mut slot = self.session.watcher();
                // Closed while the watcher was starting: drop it with the guard.
                if self.session.state() != BindState::Closed {
                    *slot = Some(watcher);
                }
            }
            Err(e) => self
                .logger
                .error(&format!("could not watch {}: {e}", self.root.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::SilentLogger;

    fn quiet() -> ServerOptions {
        ServerOptions::new().with_logger(Arc::new(SilentLogger))
    }

    #[test]
    fn test_options_builder() {
        let options = quiet()
            .retry_count(3)
            .inject_base_url(true)
            .middleware(|_, _, next| {
                next.proceed();
                Ok(())
            });
        assert_eq!(options.config.port_reassignment_retry_count, 3);
        assert!(options.config.inject_base_url_into_environment);
        assert_eq!(options.middleware.len(), 1);
    }

    #[test]
    fn test_serve_twice_is_rejected() {
        let server = DevServer::new("twice", "tests/staticdata", quiet());
        server.serve(0).unwrap();
        assert_eq!(server.serve(0).unwrap_err(), ServeError::AlreadyServing);
        server.port_timeout(Duration::from_secs(5)).unwrap();
        server.close();
    }

    #[test]
    fn test_close_before_serve_then_serve_again() {
        let server = DevServer::new("reopen", "tests/staticdata", quiet());
        server.close();
        assert_eq!(server.port().unwrap_err(), ServeError::Closed);
        server.serve(0).unwrap();
        let port = server.port_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(port, 0);
        server.close();
        server.close();
        assert_eq!(server.port().unwrap_err(), ServeError::Closed);
    }

    #[test]
    fn test_port_waits_for_serve() {
        let server = Arc::new(DevServer::new("waiter", "tests/staticdata", quiet()));
        let waiter = {
            let server = Arc::clone(&server);
            thread::spawn(move || server.port_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        server.serve(0).unwrap();
        let port = waiter.join().unwrap().unwrap();
        assert_eq!(server.port().unwrap(), port);
        server.close();
    }
}
