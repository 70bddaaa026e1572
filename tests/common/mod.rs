#![allow(dead_code)]

pub mod http_client {
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// A parsed HTTP/1.1 response.
    #[derive(Debug)]
    pub struct HttpResponse {
        pub status: u16,
        /// Lowercase header names
        pub headers: HashMap<String, String>,
        pub body: String,
    }

    impl HttpResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
        }
    }

    /// Send a raw request and read one response, honouring `Content-Length`.
    pub fn send_request(port: u16, raw: &str) -> HttpResponse {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();

        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            if let Some(resp) = try_parse(&buf) {
                return resp;
            }
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        try_parse(&buf).unwrap_or_else(|| {
            panic!(
                "incomplete response: {:?}",
                String::from_utf8_lossy(&buf)
            )
        })
    }

    fn try_parse(buf: &[u8]) -> Option<HttpResponse> {
        let head_end = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let mut lines = head.split("\r\n");
        let status = lines
            .next()?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()?;
        let headers: HashMap<String, String> = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        let len: usize = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let body = &buf[head_end + 4..];
        if body.len() < len {
            return None;
        }
        Some(HttpResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&body[..len]).to_string(),
        })
    }

    pub fn request(port: u16, method: &str, path: &str, extra_headers: &[(&str, &str)]) -> HttpResponse {
        let mut raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost:{port}\r\n");
        for (name, value) in extra_headers {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        raw.push_str("\r\n");
        send_request(port, &raw)
    }

    pub fn get(port: u16, path: &str) -> HttpResponse {
        request(port, "GET", path, &[])
    }
}

pub mod test_server {
    use livepreview::{DevServer, ServerOptions, SilentLogger};
    use std::sync::Arc;
    use std::time::Duration;

    pub const STATIC_ROOT: &str = "tests/staticdata";

    /// Options with a silent logger and a generous retry budget, since parallel tests
    /// compete for ports.
    pub fn quiet_options() -> ServerOptions {
        ServerOptions::new()
            .with_logger(Arc::new(SilentLogger))
            .retry_count(999)
    }

    /// Serve the fixture site from `port` and wait for the bind.
    pub fn start(options: ServerOptions, port: u16) -> (DevServer, u16) {
        let server = DevServer::new("test-server", STATIC_ROOT, options);
        server.serve(port).unwrap();
        let bound = server.port_timeout(Duration::from_secs(10)).unwrap();
        (server, bound)
    }
}
