//! Mutable HTTP response with lazy content-encoding negotiation.

use crate::http::{
    request::Request,
    types::{self, HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use flate2::{
    write::{GzEncoder, ZlibEncoder},
    Compression,
};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    io::{self, Write},
    time::Instant,
};

/// HTTP response under construction.
///
/// A fresh response is a complete `404 Not Found` page; handlers overwrite
/// whatever they need. Header names are stored lower-case and title-cased
/// when written.
///
/// Every body change ([`set_body`](Response::set_body) and the methods built
/// on it) recomputes `Content-Length`, drops `Content-Encoding` and forgets the
/// negotiated body, so [`effective_body`](Response::effective_body) always
/// matches the current body.
///
/// # Examples
/// ```
/// use ferrule::{BoxError, Request, Response, StatusCode};
///
/// fn hello(_req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
///     res.set_status(StatusCode::Ok)
///         .set_header("X-Powered-By", "ferrule")
///         .set_html("<h1>Hello World</h1>");
///     Ok(true)
/// }
/// ```
pub struct Response {
    status: StatusCode,
    body: Vec<u8>,
    effective: Option<Effective>,
    headers: HeaderMap,
    locals: HashMap<&'static str, Box<dyn Any + Send>>,
}

#[derive(Debug)]
enum Effective {
    Raw,
    Encoded(Vec<u8>),
}

impl Response {
    /// Local under which the response stores the [`Instant`] its request
    /// started.
    pub const REQUEST_START: &'static str = "ferrule.request_start";

    const NO_CACHE: &'static str = "max-age=0, no-cache, no-store, must-revalidate";

    /// Creates a `404 Not Found` response stamped with the current instant.
    pub fn new() -> Self {
        let mut response = Response {
            status: StatusCode::NotFound,
            body: Vec::new(),
            effective: None,
            headers: HeaderMap::new(),
            locals: HashMap::new(),
        };

        response.set_local(Self::REQUEST_START, Instant::now());
        response.send(StatusCode::NotFound);
        response
    }

    /// Creates a fresh response and applies `defaults` on top of it.
    pub(crate) fn with_defaults(defaults: &HeaderMap) -> Self {
        let mut response = Self::new();
        response.apply_headers(defaults);
        response
    }

    #[inline]
    pub(crate) fn apply_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers.iter() {
            self.headers.set(name, value);
        }
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

// Public API
impl Response {
    /// Replaces the body with a minimal HTML page for `status` and sets `Date`.
    ///
    /// ```
    /// use ferrule::{Response, StatusCode};
    ///
    /// let mut res = Response::new();
    /// res.send(StatusCode::Forbidden);
    ///
    /// let html = String::from_utf8(res.body().to_vec()).unwrap();
    /// assert!(html.contains("<title>403 - Forbidden</title>"));
    /// assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    /// ```
    pub fn send(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self.set_date(Utc::now());

        let code = status.code();
        let reason = status.reason();
        self.set_html(format!(
            "<!DOCTYPE html>\
             <html lang=\"en\">\
             <head><meta charset=\"utf-8\"><title>{code} - {reason}</title></head>\
             <body><h1>{code} - {reason}</h1></body>\
             </html>"
        ))
    }

    /// Answers with `status` and a `Location` header.
    pub fn redirect(&mut self, status: StatusCode, location: &str) -> &mut Self {
        self.send(status).set_header("location", location)
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the body as set by the handler (before any compression).
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self.effective = None;

        self.headers.set("content-length", self.body.len().to_string());
        self.headers.remove("content-encoding");
        self
    }

    /// Sets a UTF-8 body with `Content-Type: text/plain; charset=utf-8`.
    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.set_body(text.into())
            .set_content_type("text/plain; charset=utf-8")
    }

    /// Sets an HTML body with `Content-Type: text/html; charset=utf-8`.
    ///
    /// Adds `Cache-Control: max-age=0, no-cache, no-store, must-revalidate`
    /// unless the response already carries a `Cache-Control` header.
    pub fn set_html(&mut self, html: impl Into<String>) -> &mut Self {
        self.set_body(html.into())
            .set_content_type("text/html; charset=utf-8");

        if !self.headers.contains("cache-control") {
            self.headers.set("cache-control", Self::NO_CACHE);
        }
        self
    }

    #[inline]
    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.set_header("content-type", content_type)
    }

    /// Sets `Date` to `time` in IMF-fixdate format.
    #[inline]
    pub fn set_date(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.set_header("date", types::http_date(time))
    }

    #[inline]
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.set(name, value);
        self
    }

    #[inline]
    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replaces all headers.
    #[inline]
    pub fn set_headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.headers = headers;
        self
    }

    /// Stores a value in the response's scratch space.
    pub fn set_local<T: Any + Send>(&mut self, key: &'static str, value: T) -> &mut Self {
        self.locals.insert(key, Box::new(value));
        self
    }

    /// Returns a stored value if it exists and has type `T`.
    pub fn local<T: Any>(&self, key: &str) -> Option<&T> {
        self.locals.get(key)?.downcast_ref()
    }

    /// Returns the bytes that go on the wire, compressing the body when the
    /// client accepts it and it pays off.
    ///
    /// Only the first `gzip` or `deflate` token of `Accept-Encoding` is tried.
    /// The result is cached until the body changes.
    pub fn effective_body(&mut self, req: &Request) -> &[u8] {
        if self.effective.is_none() {
            let effective = self.negotiate(req.header("accept-encoding"));
            self.effective = Some(effective);
        }

        match &self.effective {
            Some(Effective::Encoded(encoded)) => encoded,
            _ => &self.body,
        }
    }
}

// Content negotiation
impl Response {
    fn negotiate(&mut self, accept_encoding: Option<&str>) -> Effective {
        let Some(accept_encoding) = accept_encoding.filter(|_| !self.body.is_empty()) else {
            return Effective::Raw;
        };

        let accepted = types::to_lower_case(accept_encoding);
        let Some(encoding) = accepted
            .split(',')
            .map(str::trim)
            .find(|token| *token == "gzip" || *token == "deflate")
        else {
            return Effective::Raw;
        };

        match Self::compress(encoding, &self.body) {
            Ok(encoded) if encoded.len() < self.body.len() => {
                self.headers.set("content-encoding", encoding);
                self.headers.set("content-length", encoded.len().to_string());
                Effective::Encoded(encoded)
            }
            Ok(_) => Effective::Raw,
            Err(err) => {
                tracing::warn!("{encoding} compression failed: {err}");
                Effective::Raw
            }
        }
    }

    fn compress(encoding: &str, data: &[u8]) -> io::Result<Vec<u8>> {
        let out = Vec::with_capacity(data.len() / 2);

        if encoding == "gzip" {
            let mut encoder = GzEncoder::new(out, Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        } else {
            let mut encoder = ZlibEncoder::new(out, Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

// Serialization
impl Response {
    /// Serializes the response: status line, title-cased headers, a blank
    /// line and (unless `head_only`) the body.
    ///
    /// Uses the negotiated body if [`effective_body`](Self::effective_body)
    /// ran, the plain body otherwise.
    pub fn to_wire(&self, head_only: bool) -> Vec<u8> {
        let body = match &self.effective {
            Some(Effective::Encoded(encoded)) => encoded.as_slice(),
            _ => self.body.as_slice(),
        };

        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(self.status.to_first_line());

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(types::title_case(name).as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if !body.is_empty() && !self.headers.contains("content-length") {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");

        if !head_only {
            out.extend_from_slice(body);
        }
        out
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("effective", &self.effective)
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .finish()
    }
}
