use dashmap::DashMap;
use http::header::{AsHeaderName, IntoHeaderName, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use may_minihttp::Response;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// `may_minihttp` keeps response headers in a fixed array of this size.
const MAX_RESPONSE_HEADERS: usize = 16;

/// Distinct header lines kept for reuse before new lines stop being interned.
const MAX_INTERNED_LINES: usize = 4096;

/// Header lines handed to `may_minihttp`, which only accepts `&'static str`.
static HEADER_LINES: Lazy<HeaderLines> = Lazy::new(|| HeaderLines::new(MAX_INTERNED_LINES));

/// Leaked header lines, each distinct line leaked once and reused.
///
/// Once `cap` lines are held, further lines are leaked per response without being
/// stored, and a warning is logged the first time that happens.
struct HeaderLines {
    lines: DashMap<String, &'static str>,
    cap: usize,
    overflowed: AtomicBool,
}

impl HeaderLines {
    fn new(cap: usize) -> Self {
        Self {
            lines: DashMap::new(),
            cap,
            overflowed: AtomicBool::new(false),
        }
    }

    fn intern(&self, line: String) -> &'static str {
        if let Some(interned) = self.lines.get(&line) {
            return *interned;
        }
        let leaked: &'static str = Box::leak(line.clone().into_boxed_str());
        if self.lines.len() >= self.cap {
            if !self.overflowed.swap(true, Ordering::Relaxed) {
                warn!(
                    cap = self.cap,
                    "header line table full; per-response header values leak memory"
                );
            }
            return leaked;
        }
        *self.lines.entry(line).or_insert(leaked)
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}

/// Status, headers and body being assembled for one request.
///
/// Every middleware in the chain sees the same accumulator, so a later middleware can
/// read and append to what an earlier one wrote. Once [`end`](Self::end) is called the
/// accumulator is frozen: every mutator becomes a no-op returning `false`.
#[derive(Debug)]
pub struct ResponseAccumulator {
    status: StatusCode,
    status_set: bool,
    headers: HeaderMap,
    body: Vec<u8>,
    ended: bool,
    rejected_writes: usize,
}

impl Default for ResponseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            status_set: false,
            headers: HeaderMap::new(),
            body: Vec::new(),
            ended: false,
            rejected_writes: 0,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether a middleware chose the status explicitly.
    #[must_use]
    pub fn status_is_set(&self) -> bool {
        self.status_set
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// `Content-Type` as a string, if set and printable.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Direct access to the accumulated body; `None` once the response has ended.
    pub fn body_mut(&mut self) -> Option<&mut Vec<u8>> {
        if self.reject("body_mut") {
            return None;
        }
        Some(&mut self.body)
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Number of mutations refused because the response had already ended.
    #[must_use]
    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes
    }

    pub fn set_status(&mut self, status: StatusCode) -> bool {
        if self.reject("set_status") {
            return false;
        }
        self.status = status;
        self.status_set = true;
        true
    }

    /// Set (replace) a header.
    ///
    /// `&'static str` names are accepted for convenience and must be valid header names.
    ///
    /// The transport only takes `&'static str` header lines, so every distinct
    /// `name: value` line is leaked for the life of the process. Values that change per
    /// request (`ETag`, `Set-Cookie`, request ids) therefore cost memory on every
    /// response; keep them out of long-running preview sessions.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) -> bool {
        if self.reject("set_header") {
            return false;
        }
        self.headers.insert(name, value);
        true
    }

    /// Set a header from strings, validating both halves.
    pub fn try_set_header(&mut self, name: &str, value: &str) -> anyhow::Result<bool> {
        let name: http::HeaderName = name.parse()?;
        let value = HeaderValue::from_str(value)?;
        Ok(self.set_header(name, value))
    }

    pub fn remove_header<K: AsHeaderName>(&mut self, name: K) -> bool {
        if self.reject("remove_header") {
            return false;
        }
        self.headers.remove(name);
        true
    }

    /// Set the status and a batch of headers at once.
    pub fn write_head<I>(&mut self, status: StatusCode, headers: I) -> bool
    where
        I: IntoIterator<Item = (http::HeaderName, HeaderValue)>,
    {
        if self.reject("write_head") {
            return false;
        }
        self.status = status;
        self.status_set = true;
        for (name, value) in headers {
            self.headers.insert(name, value);
        }
        true
    }

    /// Append to the body.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> bool {
        if self.reject("write") {
            return false;
        }
        self.body.extend_from_slice(chunk.as_ref());
        true
    }

    /// Terminate the response. Returns `false` if it had already ended.
    pub fn end(&mut self) -> bool {
        if self.reject("end") {
            return false;
        }
        self.ended = true;
        true
    }

    /// Append a final chunk and terminate.
    pub fn end_with(&mut self, chunk: impl AsRef<[u8]>) -> bool {
        self.write(chunk) && self.end()
    }

    fn reject(&mut self, op: &'static str) -> bool {
        if self.ended {
            self.rejected_writes += 1;
            debug!(op, "ignoring mutation of an ended response");
        }
        self.ended
    }

    pub(crate) fn into_final(self) -> FinalResponse {
        FinalResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// A response that has left the pipeline and is about to be flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FinalResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Copy the response into the transport's response buffer.
    pub fn write_to(self, res: &mut Response) {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        res.status_code(self.status.as_u16() as usize, reason);

        let mut written = 0;
        for (name, value) in &self.headers {
            if written == MAX_RESPONSE_HEADERS {
                warn!(header = %name, "response header limit reached; dropping header");
                continue;
            }
            match header_line(name, value) {
                Some(line) => {
                    res.header(line);
                    written += 1;
                }
                None => warn!(header = %name, "dropping header with non-visible-ASCII value"),
            }
        }
        res.body_vec(self.body);
    }
}

fn header_line(name: &http::HeaderName, value: &HeaderValue) -> Option<&'static str> {
    let line = format!("{}: {}", name.as_str(), value.to_str().ok()?);
    Some(HEADER_LINES.intern(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_accumulate_until_end() {
        let mut res = ResponseAccumulator::new();
        assert!(res.write("First "));
        res.body_mut().unwrap().extend_from_slice(b"Second ");
        assert!(res.end());
        assert_eq!(res.body_text(), "First Second ");
    }

    #[test]
    fn test_mutations_after_end_are_ignored() {
        let mut res = ResponseAccumulator::new();
        res.write_head(
            StatusCode::OK,
            [(CONTENT_TYPE, HeaderValue::from_static("text/html"))],
        );
        res.end_with("done");

        assert!(!res.write("more"));
        assert!(!res.set_status(StatusCode::NOT_FOUND));
        assert!(!res.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain")));
        assert!(!res.remove_header(CONTENT_TYPE));
        assert!(res.body_mut().is_none());
        assert!(!res.end());

        assert_eq!(res.body(), b"done");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.content_type(), Some("text/html"));
        assert_eq!(res.rejected_writes(), 6);
    }

    #[test]
    fn test_try_set_header_validates() {
        let mut res = ResponseAccumulator::new();
        assert!(res.try_set_header("X-Custom", "yes").unwrap());
        assert!(res.try_set_header("bad header", "x").is_err());
        assert!(res.try_set_header("X-Other", "line\nbreak").is_err());
        assert_eq!(res.header("x-custom").unwrap(), "yes");
    }

    #[test]
    fn test_status_tracking() {
        let mut res = ResponseAccumulator::new();
        assert!(!res.status_is_set());
        res.set_status(StatusCode::CREATED);
        assert!(res.status_is_set());
        let fin = res.into_final();
        assert_eq!(fin.status, StatusCode::CREATED);
    }

    #[test]
    fn test_header_lines_are_interned() {
        let name = http::HeaderName::from_static("x-intern-test");
        let value = HeaderValue::from_static("1");
        let a = header_line(&name, &value).unwrap();
        let b = header_line(&name, &value).unwrap();
        assert_eq!(a, "x-intern-test: 1");
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_header_line_table_is_capped() {
        let table = HeaderLines::new(2);
        let first = table.intern("x-id: 1".to_string());
        table.intern("x-id: 2".to_string());
        assert_eq!(table.len(), 2);

        let a = table.intern("x-id: 3".to_string());
        let b = table.intern("x-id: 3".to_string());
        assert_eq!(a, "x-id: 3");
        assert!(!std::ptr::eq(a, b));
        assert_eq!(table.len(), 2);
        assert!(std::ptr::eq(first, table.intern("x-id: 1".to_string())));
    }
}
