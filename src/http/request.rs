use crate::{
    errors::{panic_message, ProtocolError},
    http::{
        query::Query,
        response::Response,
        types::{self, HeaderMap, Method},
    },
    limits::ReqLimits,
};
use memchr::memchr;
use percent_encoding::percent_decode_str;
use std::{
    collections::HashMap,
    fmt, io, mem,
    net::{IpAddr, SocketAddr},
    panic::{self, AssertUnwindSafe},
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Callback fired once after the response has been written.
pub type CompletionEvent = Box<dyn FnOnce(&Request, &Response) + Send>;

/// Parsed HTTP/1.1 request.
///
/// # Input data requirements
///
/// #### General designations
/// - `SP`: ASCII space (0x20)
/// - `CRLF`: Carriage return + line feed (`"\r\n"`) - **exactly this sequence required**.
///   A bare `LF` is part of the line.
///
/// ## First line
///
/// ```text
/// [METHOD] SP [TARGET] SP [PROTOCOL] CRLF
/// ```
///
/// - `[METHOD]`: any token without lower-case letters (`400` otherwise)
/// - `[TARGET]`: everything between the first and the last space; the part
///   before `?` is the path, the rest is the [query](crate::query::Query)
/// - `[PROTOCOL]`: `HTTP/1.1`, case-insensitive (`505` otherwise)
///
/// The request line and the header lines must be valid `UTF-8`.
///
/// ## Header
///
/// ```text
/// [NAME] ":" [VALUE] CRLF
/// ```
///
/// Names are trimmed and lower-cased, values are trimmed. A line starting
/// with whitespace continues the previous header: its trimmed content is
/// appended to the previous value. A repeated name replaces the earlier value.
///
/// ## Body
///
/// Read only for methods other than `GET` that send `Content-Length`.
/// Chunked bodies are not supported.
pub struct Request {
    remote_addr: SocketAddr,
    method: Method,
    raw_path: String,
    full_path: String,
    path: String,
    query_args: HashMap<String, String>,
    headers: HeaderMap,
    body: Vec<u8>,
    completion: Vec<CompletionEvent>,
}

/// Result of reading a request from a connection.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A complete request.
    Request(Request),
    /// The peer speaks HTTP but the request is invalid; answer with
    /// [`ProtocolError::status`].
    Rejected(ProtocolError),
    /// The peer does not speak HTTP (or closed before sending anything);
    /// nothing should be written back.
    Foreign,
}

// Public API
impl Request {
    /// Reads one request from `reader`.
    ///
    /// Socket failures (including end of stream in the middle of the request)
    /// are returned as `Err`; malformed requests become
    /// [`ParseOutcome::Rejected`].
    ///
    /// ```
    /// use ferrule::{ParseOutcome, Request, limits::ReqLimits};
    /// use tokio::io::BufReader;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> std::io::Result<()> {
    /// let raw = b"GET /home?name=Sprax HTTP/1.1\r\nHost: x\r\n\r\n";
    /// let mut reader = BufReader::new(&raw[..]);
    /// let remote = "127.0.0.1:50000".parse().unwrap();
    ///
    /// let ParseOutcome::Request(req) = Request::parse(&mut reader, remote, &ReqLimits::default()).await? else {
    ///     panic!("valid request");
    /// };
    /// assert_eq!(req.path(), "/home");
    /// assert_eq!(req.query("name"), Some("Sprax"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn parse<R>(
        reader: &mut R,
        remote_addr: SocketAddr,
        limits: &ReqLimits,
    ) -> io::Result<ParseOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        match Self::read_from(reader, remote_addr, limits).await {
            Ok(request) => Ok(ParseOutcome::Request(request)),
            Err(Fault::Protocol(err)) => Ok(ParseOutcome::Rejected(err)),
            Err(Fault::Foreign) => Ok(ParseOutcome::Foreign),
            Err(Fault::Io(err)) => Err(err),
        }
    }

    #[inline]
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Returns the peer's IP address.
    #[inline]
    pub fn remote_host(&self) -> IpAddr {
        self.remote_addr.ip()
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target exactly as received, query included.
    #[inline]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Decoded path without the query. Never changes after parsing.
    #[inline]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Path relative to the router currently dispatching the request.
    ///
    /// Equals [`full_path`](Self::full_path) at the top level; mounted
    /// handlers see the path below their mount point.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replaces the routing path. A missing leading `/` is added.
    pub fn set_path(&mut self, path: impl Into<String>) {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        self.path = path;
    }

    /// Returns the decoded value of a query argument (name is case-insensitive).
    #[inline]
    pub fn query(&self, name: &str) -> Option<&str> {
        match self.query_args.get(name) {
            Some(value) => Some(value),
            None => self
                .query_args
                .get(&types::to_lower_case(name))
                .map(String::as_str),
        }
    }

    /// All query arguments, keyed by lower-case name.
    #[inline]
    pub fn query_args(&self) -> &HashMap<String, String> {
        &self.query_args
    }

    /// Returns a header value (name is case-insensitive).
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a copy of the body (empty if none was sent).
    #[inline]
    pub fn body(&self) -> Vec<u8> {
        self.body.clone()
    }

    #[inline]
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Registers a callback that runs once the response has been written
    /// (or the write has failed).
    ///
    /// Callbacks run in registration order on the connection's worker.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(&Request, &Response) + Send + 'static,
    {
        self.completion.push(Box::new(callback));
    }
}

impl Request {
    #[inline]
    fn new(remote_addr: SocketAddr, method: Method, raw_path: &str, full_path: String) -> Self {
        Request {
            remote_addr,
            method,
            raw_path: raw_path.to_string(),
            path: full_path.clone(),
            full_path,
            query_args: HashMap::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            completion: Vec::new(),
        }
    }

    /// Runs and clears the completion callbacks.
    ///
    /// A panicking callback is logged and the remaining ones still run.
    pub(crate) fn complete(&mut self, response: &Response) {
        let events = mem::take(&mut self.completion);
        for event in events {
            let request = &*self;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| event(request, response)));
            if let Err(payload) = outcome {
                tracing::error!(
                    path = self.raw_path(),
                    "completion callback panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: Method, target: &str) -> Self {
        let remote = SocketAddr::from(([127, 0, 0, 1], 40000));
        let mut request = Request::new(remote, Method::Get, target, String::new());

        request
            .parse_target(target)
            .expect("valid test target");
        request.method = method;
        request.headers.set("host", "localhost");
        request
    }

    #[cfg(test)]
    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("remote_addr", &self.remote_addr)
            .field("method", &self.method)
            .field("raw_path", &self.raw_path)
            .field("path", &self.path)
            .field("query_args", &self.query_args)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("completion_events", &self.completion.len())
            .finish()
    }
}

//

#[derive(Debug)]
enum Fault {
    Io(io::Error),
    Protocol(ProtocolError),
    Foreign,
}

impl From<io::Error> for Fault {
    fn from(err: io::Error) -> Self {
        Fault::Io(err)
    }
}

impl From<ProtocolError> for Fault {
    fn from(err: ProtocolError) -> Self {
        Fault::Protocol(err)
    }
}

impl Request {
    async fn read_from<R>(
        reader: &mut R,
        remote_addr: SocketAddr,
        limits: &ReqLimits,
    ) -> Result<Request, Fault>
    where
        R: AsyncBufRead + Unpin,
    {
        // Anything that does not start like a method (TLS hello, port scanners) is not HTTP
        match reader.fill_buf().await?.first() {
            Some(byte) if byte.is_ascii_alphabetic() => {}
            _ => return Err(Fault::Foreign),
        }

        let line = read_line(reader, limits).await?;
        let mut request = Self::parse_request_line(&line, remote_addr)?;

        request.read_headers(reader, limits).await?;
        request.read_body(reader, limits).await?;

        if limits.require_host && request.header("host").map_or(true, |h| h.trim().is_empty()) {
            return Err(ProtocolError::MissingHost.into());
        }

        Ok(request)
    }
}

// Parse first line
impl Request {
    fn parse_request_line(line: &str, remote_addr: SocketAddr) -> Result<Request, ProtocolError> {
        let first_space = line.find(' ').ok_or(ProtocolError::InvalidRequestLine)?;
        let last_space = line.rfind(' ').ok_or(ProtocolError::InvalidRequestLine)?;

        if first_space == last_space {
            return Err(ProtocolError::InvalidRequestLine);
        }

        let method = &line[..first_space];
        if method.is_empty() || method.chars().any(char::is_lowercase) {
            return Err(ProtocolError::InvalidMethod);
        }

        let target = &line[first_space + 1..last_space];
        let mut request = Request::new(remote_addr, Method::from_token(method), target, String::new());
        request.parse_target(target)?;

        let protocol = line[last_space + 1..].trim();
        if !protocol.eq_ignore_ascii_case("HTTP/1.1") {
            return Err(ProtocolError::UnsupportedVersion);
        }

        Ok(request)
    }

    fn parse_target(&mut self, target: &str) -> Result<(), ProtocolError> {
        let (path, query) = match memchr(b'?', target.as_bytes()) {
            Some(index) => (&target[..index], Some(&target[index + 1..])),
            None => (target, None),
        };

        let mut full_path = percent_decode_str(path).decode_utf8_lossy().into_owned();
        if !full_path.starts_with('/') {
            full_path.insert(0, '/');
        }

        self.path = full_path.clone();
        self.full_path = full_path;

        if let Some(query) = query {
            Query::parse_into(&mut self.query_args, query.as_bytes())?;
        }

        Ok(())
    }
}

// Parse headers
impl Request {
    async fn read_headers<R>(&mut self, reader: &mut R, limits: &ReqLimits) -> Result<(), Fault>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut last_name: Option<String> = None;
        let mut count = 0;

        loop {
            let line = read_line(reader, limits).await?;
            if line.trim().is_empty() {
                return Ok(());
            }

            count += 1;
            if count > limits.header_count {
                return Err(ProtocolError::TooManyHeaders.into());
            }

            if line.starts_with(char::is_whitespace) {
                let name = last_name.as_deref().ok_or(ProtocolError::InvalidHeader)?;

                if !self.headers.append_to(name, line.trim()) {
                    return Err(ProtocolError::InvalidHeader.into());
                }
                continue;
            }

            let colon = memchr(b':', line.as_bytes()).ok_or(ProtocolError::InvalidHeader)?;
            let name = types::to_lower_case(line[..colon].trim());
            if name.is_empty() {
                return Err(ProtocolError::InvalidHeader.into());
            }

            self.headers.set(&name, line[colon + 1..].trim());
            last_name = Some(name);
        }
    }
}

// Parse body
impl Request {
    async fn read_body<R>(&mut self, reader: &mut R, limits: &ReqLimits) -> Result<(), Fault>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.method == Method::Get {
            return Ok(());
        }

        let Some(value) = self.headers.get("content-length") else {
            return Ok(());
        };

        let len = types::slice_to_usize(value.trim().as_bytes())
            .ok_or(ProtocolError::InvalidContentLength)?;
        if len > limits.body_size {
            return Err(ProtocolError::BodyTooLarge.into());
        }

        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        self.body = body;

        Ok(())
    }
}

/// Reads one CRLF-terminated line, without the terminator.
async fn read_line<R>(reader: &mut R, limits: &ReqLimits) -> Result<String, Fault>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(limits.line_capacity);

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let (used, done) = match memchr(b'\n', available) {
            Some(index) => {
                line.extend_from_slice(&available[..=index]);
                (index + 1, line.ends_with(b"\r\n"))
            }
            None => {
                line.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(used);

        if done {
            line.truncate(line.len() - 2);
        }
        if line.len() > limits.line_size {
            return Err(ProtocolError::LineTooLong.into());
        }
        if done {
            break;
        }
    }

    let text = simdutf8::basic::from_utf8(&line).map_err(|_| ProtocolError::InvalidEncoding)?;
    Ok(text.to_owned())
}

#[cfg(test)]
mod request_self {
    use super::*;
    use tokio::io::BufReader;

    fn remote() -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 7], 51000))
    }

    async fn parse_with(raw: &[u8], limits: &ReqLimits) -> io::Result<ParseOutcome> {
        let mut reader = BufReader::new(raw);
        Request::parse(&mut reader, remote(), limits).await
    }

    async fn parse(raw: &str) -> ParseOutcome {
        parse_with(raw.as_bytes(), &ReqLimits::default())
            .await
            .expect("in-memory reads do not fail")
    }

    async fn parse_ok(raw: &str) -> Request {
        match parse(raw).await {
            ParseOutcome::Request(request) => request,
            other => panic!("{raw:?} => {other:?}"),
        }
    }

    async fn parse_err(raw: &str) -> ProtocolError {
        match parse(raw).await {
            ParseOutcome::Rejected(err) => err,
            other => panic!("{raw:?} => {other:?}"),
        }
    }

    #[tokio::test]
    async fn parse_simple() {
        let req = parse_ok("GET /home?name=Sprax HTTP/1.1\r\nHost: x\r\n\r\n").await;

        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.raw_path(), "/home?name=Sprax");
        assert_eq!(req.full_path(), "/home");
        assert_eq!(req.path(), "/home");
        assert_eq!(req.query("name"), Some("Sprax"));
        assert_eq!(req.query_args().len(), 1);
        assert_eq!(req.header("HOST"), Some("x"));
        assert_eq!(req.remote_addr(), remote());
        assert!(req.body_bytes().is_empty());
    }

    #[tokio::test]
    async fn parse_method() {
        #[rustfmt::skip]
        let cases = [
            ("GET",      Ok(Method::Get)),
            ("HEAD",     Ok(Method::Head)),
            ("POST",     Ok(Method::Post)),
            ("PUT",      Ok(Method::Put)),
            ("DELETE",   Ok(Method::Delete)),
            ("PATCH",    Ok(Method::Patch)),
            ("OPTIONS",  Ok(Method::Options)),
            ("PROPFIND", Ok(Method::Other("PROPFIND".into()))),

            ("Get",      Err(ProtocolError::InvalidMethod)),
            ("post",     Err(ProtocolError::InvalidMethod)),
        ];

        for (method, expected) in cases {
            let raw = format!("{method} / HTTP/1.1\r\nHost: x\r\n\r\n");

            match expected {
                Ok(expected) => assert_eq!(parse_ok(&raw).await.method(), &expected),
                Err(expected) => assert_eq!(parse_err(&raw).await, expected),
            }
        }
    }

    #[tokio::test]
    async fn parse_target() {
        #[rustfmt::skip]
        let cases = [
            ("/",                     "/",             vec![]),
            ("/a%20b/c",              "/a b/c",        vec![]),
            ("/search?q=a+b&Page=2",  "/search",       vec![("q", "a b"), ("page", "2")]),
            ("/a+b",                  "/a+b",          vec![]),
            ("/p?x=1%262",            "/p",            vec![("x", "1&2")]),
            ("/what%3Fnot?x=1",       "/what?not",     vec![("x", "1")]),
            ("?only=query",           "/",             vec![("only", "query")]),
            ("/with space",           "/with space",   vec![]),
            ("*",                     "/*",            vec![]),
        ];

        for (target, path, query) in cases {
            let req = parse_ok(&format!("GET {target} HTTP/1.1\r\nHost: x\r\n\r\n")).await;

            assert_eq!(req.raw_path(), target);
            assert_eq!(req.path(), path, "{target}");
            assert_eq!(req.full_path(), path, "{target}");
            assert_eq!(req.query_args().len(), query.len(), "{target}");
            for (key, value) in query {
                assert_eq!(req.query(key), Some(value));
            }
        }
    }

    #[tokio::test]
    async fn parse_first_line_errors() {
        #[rustfmt::skip]
        let cases = [
            ("GET /x HTTP/1.0\r\n",          ProtocolError::UnsupportedVersion),
            ("GET /x HTTP/2\r\n",            ProtocolError::UnsupportedVersion),
            ("GET /x\r\n",                   ProtocolError::InvalidRequestLine),
            ("GET\r\n",                      ProtocolError::InvalidRequestLine),
            ("get /x HTTP/1.0\r\n",          ProtocolError::InvalidMethod),
            ("GET /?a=1&a=2 HTTP/1.1\r\n",   ProtocolError::DuplicateQueryKey),
        ];

        for (line, expected) in cases {
            let raw = format!("{line}Host: x\r\n\r\n");
            assert_eq!(parse_err(&raw).await, expected, "{line:?}");
        }
    }

    #[tokio::test]
    async fn protocol_is_case_insensitive() {
        let req = parse_ok("GET / http/1.1\r\nHost: x\r\n\r\n").await;
        assert_eq!(req.path(), "/");
    }

    #[tokio::test]
    async fn parse_headers() {
        #[rustfmt::skip]
        let cases = [
            (
                "Host: x\r\nUser-Agent: curl\r\n",
                vec![("host", "x"), ("user-agent", "curl")],
            ),
            (
                "HOST:x\r\nX-Value:   padded   \r\n",
                vec![("host", "x"), ("x-value", "padded")],
            ),
            (
                "Host: x\r\nX-Folded: first\r\n   second\r\n\tthird\r\n",
                vec![("host", "x"), ("x-folded", "firstsecondthird")],
            ),
            (
                "Host: x\r\nX-Dup: 1\r\nx-dup: 2\r\n",
                vec![("host", "x"), ("x-dup", "2")],
            ),
            (
                "Host: x\r\nX-Url: http://a:8/b\r\n",
                vec![("host", "x"), ("x-url", "http://a:8/b")],
            ),
        ];

        for (headers, expected) in cases {
            let req = parse_ok(&format!("GET / HTTP/1.1\r\n{headers}\r\n")).await;
            let actual: Vec<_> = req.headers().iter().collect();

            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn parse_header_errors() {
        #[rustfmt::skip]
        let cases = [
            ("  orphan continuation\r\nHost: x\r\n",   ProtocolError::InvalidHeader),
            ("Host: x\r\nNoColon\r\n",                 ProtocolError::InvalidHeader),
            ("Host: x\r\n: empty-name\r\n",            ProtocolError::InvalidHeader),
            ("User-Agent: curl\r\n",                   ProtocolError::MissingHost),
            ("Host:   \r\n",                           ProtocolError::MissingHost),
        ];

        for (headers, expected) in cases {
            let raw = format!("GET / HTTP/1.1\r\n{headers}\r\n");
            assert_eq!(parse_err(&raw).await, expected, "{headers:?}");
        }
    }

    #[tokio::test]
    async fn parse_body() {
        let req = parse_ok("POST /f HTTP/1.1\r\nHost: x\r\nContent-Length: 12\r\n\r\nHello world!").await;
        assert_eq!(req.body(), b"Hello world!");
        assert_eq!(req.body_bytes(), b"Hello world!");

        // GET never reads a body
        let req = parse_ok("GET /f HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nHello").await;
        assert!(req.body_bytes().is_empty());

        // Trailing bytes beyond Content-Length are ignored
        let req = parse_ok("PUT /f HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nabcdef").await;
        assert_eq!(req.body(), b"ab");

        assert_eq!(
            parse_err("POST / HTTP/1.1\r\nHost: x\r\nContent-Length: abc\r\n\r\n").await,
            ProtocolError::InvalidContentLength
        );
        assert_eq!(
            parse_err("POST / HTTP/1.1\r\nHost: x\r\nContent-Length: -1\r\n\r\n").await,
            ProtocolError::InvalidContentLength
        );
    }

    #[tokio::test]
    async fn foreign_and_eof() {
        assert!(matches!(parse("").await, ParseOutcome::Foreign));
        assert!(matches!(parse("\x16\x03\x01\x02\x00").await, ParseOutcome::Foreign));
        assert!(matches!(parse(" GET / HTTP/1.1\r\n\r\n").await, ParseOutcome::Foreign));

        let truncated = parse_with(b"GET / HTTP/1.1\r\nHost: x\r\n", &ReqLimits::default()).await;
        assert_eq!(
            truncated.map(|_| ()).map_err(|e| e.kind()),
            Err(io::ErrorKind::UnexpectedEof)
        );

        let short_body =
            parse_with(b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 9\r\n\r\nabc", &ReqLimits::default()).await;
        assert!(short_body.is_err());
    }

    #[tokio::test]
    async fn invalid_utf8() {
        let outcome = parse_with(b"GET /\xff HTTP/1.1\r\nHost: x\r\n\r\n", &ReqLimits::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ParseOutcome::Rejected(ProtocolError::InvalidEncoding)));
    }

    #[tokio::test]
    async fn check_limits() {
        let long_path = "a".repeat(5000);
        assert_eq!(
            parse_err(&format!("GET /{long_path} HTTP/1.1\r\nHost: x\r\n\r\n")).await,
            ProtocolError::LineTooLong
        );

        let many_headers: String = (0..101).map(|i| format!("X-H{i}: v\r\n")).collect();
        assert_eq!(
            parse_err(&format!("GET / HTTP/1.1\r\nHost: x\r\n{many_headers}\r\n")).await,
            ProtocolError::TooManyHeaders
        );

        let limits = ReqLimits {
            body_size: 4,
            require_host: false,
            ..ReqLimits::default()
        };
        let outcome = parse_with(b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello", &limits)
            .await
            .unwrap();
        assert!(matches!(outcome, ParseOutcome::Rejected(ProtocolError::BodyTooLarge)));

        // Without the strict Host check a bare request is accepted
        let outcome = parse_with(b"GET / HTTP/1.1\r\n\r\n", &limits).await.unwrap();
        assert!(matches!(outcome, ParseOutcome::Request(_)));
    }

    #[tokio::test]
    async fn lines_across_small_reads() {
        let raw = b"GET /split/path?k=v HTTP/1.1\r\nHost: example.org\r\nX-Bare: a\nb\r\n\r\n";
        let mut reader = BufReader::with_capacity(3, &raw[..]);

        let req = match Request::parse(&mut reader, remote(), &ReqLimits::default()).await {
            Ok(ParseOutcome::Request(req)) => req,
            other => panic!("expected a request, got {other:?}"),
        };

        assert_eq!(req.path(), "/split/path");
        assert_eq!(req.query("K"), Some("v"));
        assert_eq!(req.header("host"), Some("example.org"));
        assert_eq!(req.header("x-bare"), Some("a\nb"));
    }

    #[test]
    fn completion_events_fire_once() {
        use std::sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        };

        let fired = Arc::new(AtomicUsize::new(0));
        let mut req = Request::for_test(Method::Get, "/x");

        for _ in 0..2 {
            let fired = fired.clone();
            req.on_complete(move |req, res| {
                assert_eq!(req.path(), "/x");
                assert_eq!(res.status(), crate::StatusCode::NotFound);
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        let res = Response::new();
        req.complete(&res);
        req.complete(&res);

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_completion_event() {
        use std::sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        };

        let fired = Arc::new(AtomicBool::new(false));
        let mut req = Request::for_test(Method::Get, "/x");

        req.on_complete(|_, _| panic!("logger exploded"));
        let flag = fired.clone();
        req.on_complete(move |_, _| flag.store(true, Ordering::SeqCst));

        req.complete(&Response::new());
        assert!(fired.load(Ordering::SeqCst));
    }
}
