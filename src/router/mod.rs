//! Ordered middleware dispatch.
//!
//! A [`Router`] holds two ordered lists: route middlewares and error
//! middlewares. Each entry has an optional method filter and a
//! [`PathMatcher`]. Requests walk the route list until a handler returns
//! `Ok(true)`; a handler error walks the error list instead.
//!
//! Routers are handlers themselves, so they can be mounted inside each other:
//!
//! ```
//! use ferrule::router::{handler, Router};
//! use ferrule::StatusCode;
//!
//! let api = Router::new()
//!     .get("/users", handler(|req, res| {
//!         res.set_status(StatusCode::Ok).set_text(format!("users below {}", req.path()));
//!         Ok(true)
//!     }));
//!
//! let app = Router::new().mount("/api", api);
//! # let _ = app;
//! ```

mod middleware;
mod router_impl;

pub use middleware::{HandlerKind, Middleware, PathMatcher};
pub use router_impl::Router;

use crate::{
    errors::BoxError,
    http::{request::Request, response::Response},
};

/// A route callback.
///
/// Returns `Ok(true)` when the request has been answered, `Ok(false)` to let
/// the next matching middleware try. Errors are offered to the router's
/// error middlewares.
///
/// Implemented for every `Fn(&mut Request, &mut Response) -> Result<bool, BoxError>`
/// (use [`handler`] to get closure parameter types inferred) and for
/// [`Router`].
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError>;
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        self(req, res)
    }
}

/// An error callback.
///
/// Receives the error a route callback returned and answers `true` when it
/// has produced a response.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, req: &mut Request, res: &mut Response, err: &BoxError) -> bool;
}

impl<F> ErrorHandler for F
where
    F: Fn(&mut Request, &mut Response, &BoxError) -> bool + Send + Sync + 'static,
{
    #[inline]
    fn handle(&self, req: &mut Request, res: &mut Response, err: &BoxError) -> bool {
        self(req, res, err)
    }
}

/// Pins a closure to the [`Handler`] signature so its parameter and return
/// types are inferred.
#[inline(always)]
pub fn handler<F>(f: F) -> F
where
    F: Fn(&mut Request, &mut Response) -> Result<bool, BoxError> + Send + Sync + 'static,
{
    f
}

/// Pins a closure to the [`ErrorHandler`] signature.
#[inline(always)]
pub fn error_handler<F>(f: F) -> F
where
    F: Fn(&mut Request, &mut Response, &BoxError) -> bool + Send + Sync + 'static,
{
    f
}
