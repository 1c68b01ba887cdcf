//! Access logging.
//!
//! Lines are emitted through [`tracing`] under the `ferrule::access` target
//! once the response has been written, so they can be filtered separately:
//!
//! ```text
//! RUST_LOG=info,ferrule::access=off    # everything but access lines
//! ```

use crate::{
    errors::BoxError,
    http::{request::Request, response::Response},
};
use std::time::Instant;

/// Middleware that logs the request once the response is on the wire.
///
/// Never answers the request itself. Install it first, either by hand or
/// with [`ServerBuilder::log_requests`](crate::ServerBuilder::log_requests):
///
/// ```
/// use ferrule::{log::access_log, Router};
///
/// let router = Router::new().middleware(access_log);
/// # let _ = router;
/// ```
///
/// Logged fields: remote host, method, raw path, status, size of the body
/// as sent (after compression), `User-Agent` and the time since the response
/// was created in milliseconds.
pub fn access_log(req: &mut Request, _res: &mut Response) -> Result<bool, BoxError> {
    req.on_complete(|req, res| {
        let elapsed = res
            .local::<Instant>(Response::REQUEST_START)
            .map(|start| format!("{:.2}", start.elapsed().as_secs_f64() * 1000.0))
            .unwrap_or_else(|| "?".to_owned());

        tracing::info!(
            target: "ferrule::access",
            remote = %req.remote_host(),
            user_agent = req.header("user-agent").unwrap_or("-"),
            "{} {} {} with {} bytes in {elapsed} ms",
            req.method(),
            req.raw_path(),
            res.status().code(),
            wire_body_len(res),
        );
    });

    Ok(false)
}

/// Body length as written: the negotiated body when there is one.
fn wire_body_len(res: &Response) -> usize {
    res.header("content-length")
        .and_then(|len| len.parse().ok())
        .unwrap_or(res.body().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::{Method, StatusCode};
    use regex::Regex;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    /// Runs `f` with a subscriber that writes plain lines into a buffer.
    fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();

        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || Capture(writer.clone()))
            .finish();
        let value = tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.lock().unwrap().clone();
        (value, String::from_utf8(bytes).unwrap())
    }

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn logs_the_exchange() {
        let (sent, output) = capture(|| {
            let mut req = Request::for_test(Method::Get, "/x?y=1");
            req.headers_mut().set("user-agent", "curl/8.5");
            req.headers_mut().set("accept-encoding", "gzip");
            let mut res = Response::new();

            assert!(!access_log(&mut req, &mut res).unwrap());

            res.set_status(StatusCode::Ok).set_text("hello ".repeat(200));
            let sent = res.effective_body(&req).len();

            req.complete(&res);
            // A second completion has nothing left to fire.
            req.complete(&res);
            sent
        });
        assert!(sent < 1200);

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 1, "{output}");

        let line = lines[0];
        assert!(line.contains("ferrule::access"), "{line}");
        assert!(line.contains(&format!("GET /x?y=1 200 with {sent} bytes in ")), "{line}");
        assert!(line.contains("remote=127.0.0.1"), "{line}");
        assert!(line.contains("curl/8.5"), "{line}");

        let elapsed = Regex::new(r" in \d+\.\d{2} ms").unwrap();
        assert!(elapsed.is_match(line), "{line}");
    }

    #[test]
    fn missing_user_agent() {
        let ((), output) = capture(|| {
            let mut req = Request::for_test(Method::Head, "/");
            let mut res = Response::new();
            access_log(&mut req, &mut res).unwrap();
            req.complete(&res);
        });

        assert!(output.contains("HEAD / 404 with "), "{output}");
        let agent = Regex::new(r#"user_agent="?-"?"#).unwrap();
        assert!(agent.is_match(&output), "{output}");
    }

    #[test]
    fn body_length() {
        let mut res = Response::new();
        res.set_body("abc");
        assert_eq!(wire_body_len(&res), 3);

        res.set_header("content-length", "1");
        assert_eq!(wire_body_len(&res), 1);
    }
}
