use http::header::{ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::request::{parse_request, IncomingRequest};
use super::response::FinalResponse;
use crate::config::ServerConfig;
use crate::error::ResolveError;
use crate::inject::{
    inject_reload_client, RELOAD_CLIENT_JS, RELOAD_CLIENT_PATH, RELOAD_EVENTS_PATH,
    RESERVED_PREFIX,
};
use crate::logging::Logger;
use crate::middleware::{Flow, MiddlewareChain, RequestContext};
use crate::reload::{event_frame, keepalive_frame, ReloadEvent, ReloadHub, ReloadKind};
use crate::static_files::StaticFiles;

const HTML: &str = "text/html; charset=utf-8";

/// Per-connection request handler.
///
/// Cloned by the transport for every connection; all state is shared behind `Arc`s
/// and read-only apart from the reload hub.
#[derive(Clone)]
pub struct DevService {
    chain: MiddlewareChain,
    static_files: Arc<StaticFiles>,
    extra_headers: Arc<[(HeaderName, HeaderValue)]>,
    live_reload: bool,
    poll_timeout: Duration,
    hub: Arc<ReloadHub>,
    logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for DevService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevService")
            .field("chain", &self.chain)
            .field("root", &self.static_files.root())
            .field("live_reload", &self.live_reload)
            .finish()
    }
}

impl DevService {
    pub fn new(
        static_files: StaticFiles,
        chain: MiddlewareChain,
        config: &ServerConfig,
        hub: Arc<ReloadHub>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        let extra_headers: Vec<(HeaderName, HeaderValue)> = config
            .headers
            .iter()
            .filter_map(|(name, value)| {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    (Ok(name), Ok(value)) => Some((name, value)),
                    _ => {
                        warn!(header = %name, "ignoring invalid configured header");
                        None
                    }
                }
            })
            .collect();
        Self {
            chain,
            static_files: Arc::new(static_files),
            extra_headers: extra_headers.into(),
            live_reload: config.live_reload,
            poll_timeout: config.reload_poll_timeout(),
            hub,
            logger,
        }
    }

    /// Produce the full response for one request.
    pub fn respond(&self, req: IncomingRequest) -> FinalResponse {
        let started = Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();

        let mut response = match self.builtin(&req) {
            Some(response) => response,
            None => self.run_chain(req),
        };

        for (name, value) in self.extra_headers.iter() {
            if !response.headers.contains_key(name) {
                response.headers.insert(name.clone(), value.clone());
            }
        }
        if method == Method::HEAD {
            response.body.clear();
        }

        debug!(
            method = %method,
            path = %path,
            status = response.status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "request served"
        );
        response
    }

    fn run_chain(&self, req: IncomingRequest) -> FinalResponse {
        let mut ctx = RequestContext::new(req);
        let response = match self.chain.run(&mut ctx) {
            Ok(Flow::Ended { .. }) => ctx.response.into_final(),
            Ok(Flow::Fallthrough) => self.fallback(ctx),
            Err(err) => {
                error!(
                    method = %ctx.request.method,
                    path = %ctx.request.path,
                    index = err.index(),
                    error = %err,
                    "middleware aborted request"
                );
                self.logger.error(&format!(
                    "{} {}: {err}",
                    ctx.request.method, ctx.request.path
                ));
                internal_error()
            }
        };
        self.finish(response)
    }

    fn finish(&self, mut response: FinalResponse) -> FinalResponse {
        if self.live_reload {
            let content_type = response.content_type().map(str::to_owned);
            let body = std::mem::take(&mut response.body);
            response.body = inject_reload_client(body, content_type.as_deref());
        }
        response
    }

    /// Static resolution for requests no middleware ended.
    fn fallback(&self, ctx: RequestContext) -> FinalResponse {
        let RequestContext {
            request, response, ..
        } = ctx;

        if request.method != Method::GET && request.method != Method::HEAD {
            let mut response = response.into_final();
            response.status = StatusCode::METHOD_NOT_ALLOWED;
            response
                .headers
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            response
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(HTML));
            response.body = error_page(StatusCode::METHOD_NOT_ALLOWED, &request.path);
            return response;
        }

        let keep_status = response.status_is_set();
        let mut fin = response.into_final();
        match self.static_files.resolve(&request.path) {
            Ok(artifact) => {
                if !keep_status {
                    fin.status = StatusCode::OK;
                }
                if !fin.headers.contains_key(CONTENT_TYPE) {
                    fin.headers.insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static(artifact.content_type),
                    );
                }
                fin.body = artifact.bytes;
            }
            Err(ResolveError::NotFound) => {
                fin.status = StatusCode::NOT_FOUND;
                if !fin.headers.contains_key(CONTENT_TYPE) {
                    fin.headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static(HTML));
                }
                fin.body = error_page(StatusCode::NOT_FOUND, &request.path);
            }
            Err(err @ ResolveError::Read { .. }) => {
                error!(path = %request.path, error = %err, "static file read failed");
                self.logger.error(&err.to_string());
                return internal_error();
            }
        }
        fin
    }

    /// Answer the server's own endpoints, ahead of user middleware.
    fn builtin(&self, req: &IncomingRequest) -> Option<FinalResponse> {
        if !self.live_reload || !req.path.starts_with(RESERVED_PREFIX) {
            return None;
        }
        let mut response = match req.path.as_str() {
            RELOAD_CLIENT_PATH => FinalResponse::new(
                StatusCode::OK,
                "application/javascript; charset=utf-8",
                RELOAD_CLIENT_JS,
            ),
            RELOAD_EVENTS_PATH => {
                FinalResponse::new(StatusCode::OK, "text/event-stream", self.next_event(req))
            }
            _ => FinalResponse::new(
                StatusCode::NOT_FOUND,
                HTML,
                error_page(StatusCode::NOT_FOUND, &req.path),
            ),
        };
        response
            .headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Some(response)
    }

    /// One long-poll turn of the event stream.
    fn next_event(&self, req: &IncomingRequest) -> String {
        let current = self.hub.generation();
        let since = req
            .header("last-event-id")
            .and_then(|id| id.trim().parse::<u64>().ok());
        match since {
            None => event_frame(
                current,
                &ReloadEvent {
                    kind: ReloadKind::Connected,
                    files: Vec::new(),
                },
            ),
            // An id from before a restart: whatever the browser shows is stale.
            Some(since) if since > current => {
                event_frame(current, &ReloadEvent::for_files(Vec::new()))
            }
            Some(since) => match self.hub.wait_newer(since, self.poll_timeout) {
                Some((id, event)) => event_frame(id, &event),
                None => keepalive_frame(),
            },
        }
    }
}

impl HttpService for DevService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let request = parse_request(&req);
        self.respond(request).write_to(res);
        Ok(())
    }
}

fn internal_error() -> FinalResponse {
    FinalResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        HTML,
        error_page(StatusCode::INTERNAL_SERVER_ERROR, ""),
    )
}

fn error_page(status: StatusCode, path: &str) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let detail = if path.is_empty() {
        String::new()
    } else {
        format!("<p><code>{}</code></p>", escape_html(path))
    };
    format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {reason}</title></head>\
         <body><h1>{code} {reason}</h1>{detail}</body></html>\n",
        code = status.as_u16()
    )
    .into_bytes()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
