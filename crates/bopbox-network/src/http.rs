//! Minimal HTTP/1.x for the modem's TCP server.
//!
//! Requests arrive as one `+IPD` payload each; only the request line,
//! headers and whatever body came along in the same payload are kept.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    /// Header names lower-cased, values trimmed.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpRequest {
    /// Parse a request from raw TCP payload.
    ///
    /// Returns `None` unless the first line is `METHOD PATH HTTP/x.y`.
    /// Header lines without a colon are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use bopbox_network::HttpRequest;
    ///
    /// let req = HttpRequest::parse(b"GET /tag HTTP/1.1\r\nHost: bopbox\r\n\r\n").unwrap();
    /// assert_eq!(req.method, "GET");
    /// assert_eq!(req.path, "/tag");
    /// assert_eq!(req.header("host"), Some("bopbox"));
    /// ```
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let (head, body) = match raw.windows(HEADER_END.len()).position(|w| w == HEADER_END) {
            Some(pos) => (&raw[..pos], &raw[pos + HEADER_END.len()..]),
            None => (raw, &[][..]),
        };
        let head = std::str::from_utf8(head).ok()?;
        let mut lines = head.split("\r\n");

        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?;
        let path = request_line.next()?;
        let version = request_line.next()?;
        if !version.starts_with("HTTP/") || request_line.next().is_some() {
            return None;
        }

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        Some(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body: Bytes::copy_from_slice(body),
        })
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Response to serialize back over the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// `200 OK` with a plain text body.
    pub fn text(body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::new(200, "OK")
            .with_header("Content-Type", "text/plain")
            .with_body(body)
    }

    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
            .with_header("Content-Type", "text/plain")
            .with_body("Not Found")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Wire bytes, with `Content-Length` and `Connection: close` added.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            let _ = write!(head, "{name}: {value}\r\n");
        }
        let _ = write!(
            head,
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            self.body.len()
        );

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Produces the response for one request.
///
/// Called from the responder task, never from the receive poll.
pub trait HttpHandler: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

impl<F> HttpHandler for F
where
    F: Fn(&HttpRequest) -> HttpResponse + Send + Sync,
{
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        self(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_with_headers_and_body() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: bopbox\r\nContent-Type:  text/plain \r\n\r\nhello";
        let req = HttpRequest::parse(raw).unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/submit");
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.header("Host"), Some("bopbox"));
        assert_eq!(&req.body[..], b"hello");
    }

    #[test]
    fn test_parse_without_blank_line() {
        let req = HttpRequest::parse(b"GET / HTTP/1.0\r\nHost: x\r\n").unwrap();
        assert_eq!(req.path, "/");
        assert!(req.body.is_empty());
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"GET /\r\n\r\n")]
    #[case(b"GET / FTP/1.1\r\n\r\n")]
    #[case(b"GET / HTTP/1.1 extra\r\n\r\n")]
    #[case(b"\xff\xfe / HTTP/1.1\r\n\r\n")]
    fn test_parse_rejects(#[case] raw: &[u8]) {
        assert!(HttpRequest::parse(raw).is_none());
    }

    #[test]
    fn test_response_bytes() {
        let bytes = HttpResponse::text("hi").to_bytes();
        assert_eq!(
            bytes,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi"
                .to_vec()
        );
    }

    #[test]
    fn test_closure_handler() {
        let handler = |req: &HttpRequest| {
            if req.path == "/" {
                HttpResponse::text("up")
            } else {
                HttpResponse::not_found()
            }
        };
        let req = HttpRequest::parse(b"GET /nope HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(handler.handle(&req).status, 404);
    }
}
