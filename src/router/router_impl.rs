use super::{
    middleware::{HandlerKind, Middleware, PathMatcher},
    ErrorHandler, Handler,
};
use crate::{
    errors::BoxError,
    http::{request::Request, response::Response, types::Method},
};
use std::ops::{Deref, DerefMut};

/// Ordered collection of middlewares.
///
/// # Dispatch
///
/// 1. Route middlewares are tried in registration order. An entry is skipped
///    when its method filter differs from the request method or its
///    [`PathMatcher`] rejects [`Request::path`].
/// 2. Unless the matcher is the root prefix `/`, the handler sees the path
///    with its first segment removed (`/a/b` becomes `/b`, `/a` becomes `/`).
/// 3. `Ok(true)` ends dispatch, `Ok(false)` moves on to the next entry.
/// 4. An unanswered `HEAD` request is offered to the `GET` middlewares.
/// 5. An `Err` is offered to the error middlewares (same method and path
///    rules). The first one returning `true` ends dispatch with `Ok(true)`;
///    otherwise the error is returned.
///
/// [`Request::path`] is restored after every handler call and on every exit,
/// panics included.
///
/// # Examples
///
/// ```
/// use ferrule::router::{error_handler, handler, PathMatcher, Router};
/// use ferrule::{Method, StatusCode};
///
/// let router = Router::new()
///     .get("/", handler(|_, res| {
///         res.set_status(StatusCode::Ok).set_text("home");
///         Ok(true)
///     }))
///     .method(Method::Put, PathMatcher::pattern(r"/items/\d+").unwrap(), handler(|_, _| {
///         Err("read-only".into())
///     }))
///     .catch(error_handler(|_, res, err| {
///         res.send(StatusCode::Forbidden).set_text(err.to_string());
///         true
///     }));
/// # let _ = router;
/// ```
#[derive(Debug, Default)]
pub struct Router {
    middlewares: Vec<Middleware>,
    error_middlewares: Vec<Middleware>,
}

impl Router {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

// Registration
impl Router {
    /// Registers `handler` for every method below `path`.
    pub fn mount<P, H>(self, path: P, handler: H) -> Self
    where
        P: Into<PathMatcher>,
        H: Handler,
    {
        self.register(None, path.into(), handler)
    }

    /// Registers `handler` for every method and path (mount at `/`).
    #[inline]
    pub fn middleware<H: Handler>(self, handler: H) -> Self {
        self.mount("/", handler)
    }

    /// Registers `handler` for one method.
    pub fn method<P, H>(self, method: Method, path: P, handler: H) -> Self
    where
        P: Into<PathMatcher>,
        H: Handler,
    {
        self.register(Some(method), path.into(), handler)
    }

    /// Registers `handler` for `GET` (and, as a fallback, `HEAD`).
    #[inline]
    pub fn get<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Get, path, handler)
    }

    #[inline]
    pub fn head<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Head, path, handler)
    }

    #[inline]
    pub fn post<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Post, path, handler)
    }

    #[inline]
    pub fn put<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Put, path, handler)
    }

    #[inline]
    pub fn delete<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Delete, path, handler)
    }

    #[inline]
    pub fn patch<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Patch, path, handler)
    }

    #[inline]
    pub fn options<P: Into<PathMatcher>, H: Handler>(self, path: P, handler: H) -> Self {
        self.method(Method::Options, path, handler)
    }

    /// Registers an error handler for errors raised below `path`.
    pub fn mount_error<P, H>(mut self, path: P, handler: H) -> Self
    where
        P: Into<PathMatcher>,
        H: ErrorHandler,
    {
        self.error_middlewares.push(Middleware::new(
            None,
            path.into(),
            HandlerKind::Error(Box::new(handler)),
        ));
        self
    }

    /// Registers an error handler for every path (mount at `/`).
    #[inline]
    pub fn catch<H: ErrorHandler>(self, handler: H) -> Self {
        self.mount_error("/", handler)
    }

    #[inline]
    pub fn middlewares(&self) -> &[Middleware] {
        &self.middlewares
    }

    #[inline]
    pub fn error_middlewares(&self) -> &[Middleware] {
        &self.error_middlewares
    }

    fn register<H: Handler>(mut self, method: Option<Method>, matcher: PathMatcher, handler: H) -> Self {
        self.middlewares.push(Middleware::new(
            method,
            matcher,
            HandlerKind::Route(Box::new(handler)),
        ));
        self
    }
}

// Dispatch
impl Router {
    /// Dispatches a request; returns whether a middleware answered it.
    pub fn call(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        let mut req = PathGuard::new(req);

        let err = match self.dispatch(&mut req, res) {
            Ok(handled) => return Ok(handled),
            Err(err) => err,
        };

        req.restore();
        for m in &self.error_middlewares {
            let HandlerKind::Error(handler) = m.kind() else {
                continue;
            };

            if m.accepts_method(req.method())
                && m.matcher().matches(req.path())
                && handler.handle(&mut req, res, &err)
            {
                return Ok(true);
            }
        }

        Err(err)
    }

    fn dispatch(&self, req: &mut PathGuard<'_>, res: &mut Response) -> Result<bool, BoxError> {
        if self.walk(req, res, |m, method| m.accepts_method(method))? {
            return Ok(true);
        }

        if *req.method() == Method::Head {
            return self.walk(req, res, |m, _| m.method() == Some(&Method::Get));
        }

        Ok(false)
    }

    fn walk<F>(&self, req: &mut PathGuard<'_>, res: &mut Response, eligible: F) -> Result<bool, BoxError>
    where
        F: Fn(&Middleware, &Method) -> bool,
    {
        for m in &self.middlewares {
            let HandlerKind::Route(handler) = m.kind() else {
                continue;
            };

            if !eligible(m, req.method()) || !m.matcher().matches(req.path()) {
                continue;
            }

            if !m.matcher().is_root() {
                let sub_path = strip_first_segment(&req.start_path);
                req.set_path(sub_path);
            }

            let handled = handler.handle(req, res);
            req.restore();

            if handled? {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

impl Handler for Router {
    #[inline]
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        self.call(req, res)
    }
}

/// Removes the first non-empty segment of `path`.
fn strip_first_segment(path: &str) -> String {
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    match segments.next() {
        None => path.to_string(),
        Some(_) => {
            let rest: Vec<&str> = segments.collect();
            format!("/{}", rest.join("/"))
        }
    }
}

/// Restores the request path when dropped.
struct PathGuard<'a> {
    req: &'a mut Request,
    start_path: String,
}

impl<'a> PathGuard<'a> {
    #[inline]
    fn new(req: &'a mut Request) -> Self {
        let start_path = req.path().to_string();
        PathGuard { req, start_path }
    }

    #[inline]
    fn restore(&mut self) {
        if self.req.path() != self.start_path {
            self.req.set_path(self.start_path.clone());
        }
    }
}

impl Deref for PathGuard<'_> {
    type Target = Request;

    fn deref(&self) -> &Request {
        self.req
    }
}

impl DerefMut for PathGuard<'_> {
    fn deref_mut(&mut self) -> &mut Request {
        self.req
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
