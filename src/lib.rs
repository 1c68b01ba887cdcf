//! ferrule - a small HTTP/1.1 server with ordered middleware dispatch
//!
//! Every connection carries exactly one request and is closed after the
//! response. Requests are parsed by hand from the socket, offered to a
//! [`Router`] of middlewares, and answered with a [`Response`] whose body is
//! compressed when the client accepts it.
//!
//! # Features
//!
//! - **Ordered middlewares** - prefix, exact-set and regex path matchers,
//!   method filters, nested routers and error chains
//! - **Content negotiation** - `gzip` / `deflate`, kept only when smaller
//! - **Byte ranges** - single `Range: bytes=` requests ([`range`])
//! - **TLS** - `rustls` listeners restricted to TLS 1.2 and 1.3, with an
//!   `Upgrade-Insecure-Requests` redirect on the plaintext listener
//! - **Ready-made routes** - static files, directory listings and a debug
//!   page ([`routes`])
//! - **Access log** - one `tracing` event per request ([`log`])
//!
//! Route callbacks are plain synchronous functions. They run on tokio's
//! blocking pool, so they may block on files or databases.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use ferrule::{router::handler, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let router = Router::new().get("/", handler(|_, res| {
//!         res.set_status(StatusCode::Ok).set_text("Hello World!");
//!         Ok(true)
//!     }));
//!
//!     Server::builder()
//!         .router(router)
//!         .build()
//!         .listen("127.0.0.1:8080")
//!         .await?
//!         .join()
//!         .await;
//!     Ok(())
//! }
//! ```
//! Something in between :) :
//! ```no_run
//! use ferrule::{
//!     router::{error_handler, handler, PathMatcher, Router},
//!     routes::{DebugPage, ServeDir},
//!     Server, StatusCode,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Router::new()
//!         .get(PathMatcher::pattern(r"/users/\d+")?, handler(|req, res| {
//!             res.set_status(StatusCode::Ok).set_text(format!("user {}", req.path()));
//!             Ok(true)
//!         }))
//!         .post("/echo", handler(|req, res| {
//!             let body = String::from_utf8(req.body())?;
//!             res.set_status(StatusCode::Ok).set_text(body);
//!             Ok(true)
//!         }))
//!         .catch(error_handler(|_, res, err| {
//!             res.send(StatusCode::BadRequest).set_text(err.to_string());
//!             true
//!         }));
//!
//!     let router = Router::new()
//!         .get("/debug", DebugPage)
//!         .mount("/api", api)
//!         .get("/", ServeDir::new("./public"));
//!
//!     let server = Server::builder().router(router).log_requests(true).build();
//!     let handle = server.listen("0.0.0.0:8080").await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.close();
//!     handle.join().await;
//!     Ok(())
//! }
//! ```

pub(crate) mod http {
    pub mod query;
    pub mod range;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub mod server {
    //! Listeners and TLS contexts.

    pub(crate) mod connection;
    pub(crate) mod server_impl;
    pub mod tls;
}
pub(crate) mod errors;
pub mod limits;
pub mod log;
pub mod router;
pub mod routes;

pub use crate::{
    errors::{BoxError, ProtocolError, TlsError},
    http::{
        query, range,
        request::{CompletionEvent, ParseOutcome, Request},
        response::Response,
        types::{http_date, normalize_path, title_case, HeaderMap, Method, StatusCode},
    },
    router::Router,
    server::server_impl::{ListenerHandle, Server, ServerBuilder},
};
