//! Server configuration: worker pools and request parsing limits
//!
//! # Defaults
//!
//! Default limits match what browsers and command-line clients send in
//! practice:
//! - request and header lines up to 4 KiB
//! - at most 100 header lines
//! - bodies up to 16 MiB
//! - a `Host` header on every request
//!
//! # Examples
//!
//! ```no_run
//! use ferrule::{Router, Server, limits::{ReqLimits, ServerLimits}};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::builder()
//!         .router(Router::new())
//!         .server_limits(ServerLimits {
//!             workers: 32,        // More concurrent connections per listener
//!             expose_errors: true, // Error chains in 500 pages while developing
//!             ..ServerLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 32,
//!             body_size: 64 * 1024, // Small JSON payloads only
//!             ..ReqLimits::default()
//!         })
//!         .build();
//!
//!     server.listen("127.0.0.1:8080").await?.join().await;
//!     Ok(())
//! }
//! ```

use std::{thread, time::Duration};

/// Controls listener-level concurrency and error reporting.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   Yes   /-----------------\   No   [------------]
/// [ Add to queue ] <====== | Room in queue?  | =====> [ Close, log ]
/// [--------------]         \-----------------/        [------------]
///        ||
///        \==================\\          //====================\
///                            V          V                    ||
/// [---------]   Yes   /--------------------------\   No   [------]
/// [ Worker  ] <====== | Is there a free worker?  | =====> [ Wait ]
/// [---------]         \--------------------------/        [------]
/// ```
///
/// Every listener owns one accept task and `workers` worker tasks. A worker
/// serves one connection from start to finish (parse, route, write) and then
/// takes the next one from the queue.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker tasks per listener
    /// (default: [`available_parallelism`](std::thread::available_parallelism)).
    ///
    /// This is the maximum number of connections one listener serves at the
    /// same time.
    pub workers: usize,

    /// Maximum number of accepted connections waiting for a worker (default: `1024`).
    ///
    /// Connections accepted while the queue is full are closed without a response.
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue (default: `Sleep(50μs)`).
    pub wait_strategy: WaitStrategy,

    /// Backlog passed to `listen(2)` for the listening socket (default: `1024`).
    pub backlog: i32,

    /// Render error chains and panic messages in `500` pages (default: `false`).
    ///
    /// Leave this off in production: the text may reveal internals.
    pub expose_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(4, |n| n.get()),
            max_pending_connections: 1024,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
            backlog: 1024,
            expose_errors: false,

            _priv: (),
        }
    }
}

/// Strategy for worker task waiting when no connections are available
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// # Note
    /// Keeps one core busy per idle worker. Only useful for latency
    /// benchmarks.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    Sleep(Duration),
}

/// Limits applied while a request is parsed
///
/// Violations are answered with an error page and the connection is closed:
///
/// | Limit            | Status |
/// |------------------|--------|
/// | `line_size`      | `413`  |
/// | `header_count`   | `431`  |
/// | `body_size`      | `413`  |
/// | `require_host`   | `400`  |
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Initial capacity of the line buffer (default: `128`).
    ///
    /// The buffer doubles while a line does not fit, up to `line_size`.
    pub line_capacity: usize,

    /// Maximum length of the request line or a header line, CRLF excluded
    /// (default: `4096`).
    pub line_size: usize,

    /// Maximum number of header lines, continuation lines included (default: `100`).
    pub header_count: usize,

    /// Maximum accepted `Content-Length` (default: `16 MiB`).
    pub body_size: usize,

    /// Reject requests without a non-blank `Host` header (default: `true`).
    pub require_host: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            line_capacity: 128,
            line_size: 4096,
            header_count: 100,
            body_size: 16 * 1024 * 1024,
            require_host: true,

            _priv: (),
        }
    }
}
