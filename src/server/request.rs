use http::Method;
use may_minihttp::Request;
use std::collections::HashMap;
use tracing::debug;

/// An inbound request as seen by middleware.
///
/// Bodies are not read: the preview server only answers `GET`-style traffic and leaves
/// request payloads to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// HTTP method
    pub method: Method,
    /// Raw request target, still percent-encoded and including the query string
    pub url: String,
    /// Path component of `url` (still percent-encoded)
    pub path: String,
    /// Parsed query string parameters
    pub query_params: HashMap<String, String>,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
}

impl IncomingRequest {
    /// Build a request by hand, mostly useful to drive a pipeline without a socket.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        let url = url.into();
        let path = url.split('?').next().unwrap_or("/").to_string();
        let query_params = parse_query_params(&url);
        Self {
            method,
            url,
            path,
            query_params,
            headers: HashMap::new(),
        }
    }

    /// Add a header; the name is lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Parse query string parameters from a URL path
///
/// Extracts everything after the `?` character and URL-decodes parameter names and values.
#[must_use]
pub fn parse_query_params(path: &str) -> HashMap<String, String> {
    if let Some(pos) = path.find('?') {
        let query_str = &path[pos + 1..];
        url::form_urlencoded::parse(query_str.as_bytes())
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    } else {
        HashMap::new()
    }
}

/// Extract an [`IncomingRequest`] from a `may_minihttp::Request`.
///
/// Extension methods pass through untouched; a method token `http` rejects outright is
/// treated as `GET`.
pub fn parse_request(req: &Request) -> IncomingRequest {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or(Method::GET);
    let url = req.path().to_string();

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    let path = url.split('?').next().unwrap_or("/").to_string();
    let query_params = parse_query_params(&url);

    debug!(
        method = %method,
        path = %path,
        header_count = headers.len(),
        "HTTP request parsed"
    );

    IncomingRequest {
        method,
        url,
        path,
        query_params,
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_params() {
        let q = parse_query_params("/p?x=1&y=hello%20world");
        assert_eq!(q.get("x"), Some(&"1".to_string()));
        assert_eq!(q.get("y"), Some(&"hello world".to_string()));
        assert!(parse_query_params("/p").is_empty());
    }

    #[test]
    fn test_new_splits_path_and_query() {
        let req = IncomingRequest::new(Method::GET, "/docs/a%20b.html?since=3")
            .with_header("Last-Event-ID", "3");
        assert_eq!(req.path, "/docs/a%20b.html");
        assert_eq!(req.query_params.get("since"), Some(&"3".to_string()));
        assert_eq!(req.header("last-event-id"), Some("3"));
        assert_eq!(req.header("LAST-EVENT-ID"), Some("3"));
    }
}
