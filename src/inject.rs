//! Live-reload client injection.
//!
//! HTML leaving the server gets a `<script>` tag pointing at
//! [`RELOAD_CLIENT_PATH`], placed before the closing `</body>` (or `</html>`, or at the
//! very end). The script itself is served from [`RELOAD_CLIENT_JS`] and listens on the
//! event stream at [`RELOAD_EVENTS_PATH`].

/// Prefix reserved for the server's own endpoints.
pub const RESERVED_PREFIX: &str = "/.livepreview/";

/// Where the reload client script is served.
pub const RELOAD_CLIENT_PATH: &str = "/.livepreview/reload-client.js";

/// Server-Sent Events endpoint the client listens on.
pub const RELOAD_EVENTS_PATH: &str = "/.livepreview/events";

/// Markup appended to HTML documents.
pub const RELOAD_SNIPPET: &str =
    "<script type=\"module\" src=\"/.livepreview/reload-client.js\"></script>";

/// Browser side of live reload.
///
/// Full reloads for most changes; when only stylesheets changed, `<link rel=stylesheet>`
/// hrefs are cache-busted in place instead. The stream answers one event per request,
/// so EventSource's own reconnect (`retry:`) drives the polling.
pub const RELOAD_CLIENT_JS: &str = r#"// livepreview reload client
const source = new EventSource("/.livepreview/events");

function refreshStylesheets() {
  for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {
    const url = new URL(link.href, location.href);
    if (url.origin !== location.origin) continue;
    url.searchParams.set("_livepreview", Date.now().toString());
    link.href = url.toString();
  }
}

source.addEventListener("message", (event) => {
  let payload;
  try {
    payload = JSON.parse(event.data);
  } catch {
    return;
  }
  if (payload.type === "css") {
    refreshStylesheets();
  } else if (payload.type === "reload") {
    location.reload();
  }
});
"#;

/// Whether a content type's essence is `text/html`.
#[must_use]
pub fn is_html(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("text/html"))
        .unwrap_or(false)
}

/// Insert the reload snippet into an HTML body. Non-HTML bodies are returned untouched.
#[must_use]
pub fn inject_reload_client(body: Vec<u8>, content_type: Option<&str>) -> Vec<u8> {
    match content_type {
        Some(ct) if is_html(ct) => insert_before_close(body, RELOAD_SNIPPET.as_bytes()),
        _ => body,
    }
}

fn insert_before_close(body: Vec<u8>, snippet: &[u8]) -> Vec<u8> {
    let at = rfind_ignore_case(&body, b"</body>")
        .or_else(|| rfind_ignore_case(&body, b"</html>"))
        .unwrap_or(body.len());
    let mut out = Vec::with_capacity(body.len() + snippet.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(snippet);
    out.extend_from_slice(&body[at..]);
    out
}

fn rfind_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
