use crate::{
    http::types::HeaderMap,
    limits::{ReqLimits, ServerLimits, WaitStrategy},
    log,
    router::Router,
    server::connection,
};
use crossbeam::queue::SegQueue;
use rustls::ServerConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
};
use tokio::{
    net::{lookup_host, TcpListener, TcpStream, ToSocketAddrs},
    sync::watch,
    task::{yield_now, JoinHandle},
    time::sleep as tokio_sleep,
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// State shared by every listener and worker of one [`Server`].
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) defaults: HeaderMap,
    pub(crate) req_limits: ReqLimits,
    pub(crate) server_limits: ServerLimits,
    /// Port of the active TLS listener, `0` when there is none.
    pub(crate) secure_port: AtomicU16,
}

/// An HTTP/1.1 server: one [`Router`] shared by any number of plaintext and
/// TLS listeners.
///
/// Every connection carries exactly one request; responses always close the
/// connection.
///
/// # Examples
///
/// ```no_run
/// use ferrule::{router::handler, Router, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let router = Router::new().get("/", handler(|_, res| {
///         res.set_status(StatusCode::Ok).set_text("Hello World!");
///         Ok(true)
///     }));
///
///     let server = Server::builder()
///         .router(router)
///         .log_requests(true)
///         .build();
///
///     server.listen("127.0.0.1:8080").await?.join().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            router: None,
            defaults: default_headers(),
            server_limits: None,
            request_limits: None,
            log_requests: false,
        }
    }

    /// Binds a plaintext listener and starts serving it.
    ///
    /// While a TLS listener of the same server is open, requests carrying
    /// `Upgrade-Insecure-Requests: 1` are redirected to it with `307`.
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> io::Result<ListenerHandle> {
        let listener = bind(addr, self.shared.server_limits.backlog).await?;
        let local_addr = listener.local_addr()?;
        Ok(self.start(listener, local_addr, None))
    }

    /// Binds a TLS listener and starts serving it.
    ///
    /// Build `tls` with [`tls::load_pem`](crate::server::tls::load_pem) or
    /// [`tls::server_config`](crate::server::tls::server_config) to restrict
    /// it to TLS 1.2 and TLS 1.3. Failed handshakes are logged and the
    /// connection is dropped without a response.
    pub async fn listen_secure<A: ToSocketAddrs>(
        &self,
        addr: A,
        tls: Arc<ServerConfig>,
    ) -> io::Result<ListenerHandle> {
        let listener = bind(addr, self.shared.server_limits.backlog).await?;
        let local_addr = listener.local_addr()?;
        Ok(self.start(listener, local_addr, Some(TlsAcceptor::from(tls))))
    }

    /// Port of the open TLS listener, if any.
    #[inline]
    pub fn secure_port(&self) -> Option<u16> {
        match self.shared.secure_port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    fn start(
        &self,
        listener: TcpListener,
        local_addr: SocketAddr,
        tls: Option<TlsAcceptor>,
    ) -> ListenerHandle {
        let secure = tls.is_some();

        if secure {
            self.shared
                .secure_port
                .store(local_addr.port(), Ordering::Release);
        }
        info!(%local_addr, secure, "listening");

        let (shutdown, closed) = watch::channel(false);
        let shutdown = Arc::new(shutdown);
        let queue: TcpQueue = Arc::new(SegQueue::new());

        let mut tasks = Vec::with_capacity(self.shared.server_limits.workers + 1);
        tasks.push(tokio::spawn(accept_loop(
            listener,
            local_addr,
            queue.clone(),
            self.shared.clone(),
            (Arc::clone(&shutdown), closed.clone()),
            secure,
        )));

        for _ in 0..self.shared.server_limits.workers.max(1) {
            tasks.push(spawn_worker(&queue, &self.shared, &tls, closed.clone()));
        }

        ListenerHandle {
            local_addr,
            shutdown,
            tasks,
        }
    }
}

/// Feeds accepted connections to the workers until the listener is closed.
///
/// Holds a sender of the shutdown channel so that dropping the
/// [`ListenerHandle`] does not read as a close.
async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    queue: TcpQueue,
    shared: Arc<Shared>,
    (_shutdown, mut closing): (Arc<watch::Sender<bool>>, watch::Receiver<bool>),
    secure: bool,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = closing.changed() => break,
        };

        match accepted {
            Ok(value) if queue.len() < shared.server_limits.max_pending_connections => {
                queue.push(value)
            }
            Ok((_, remote)) => debug!(%remote, "accept queue is full, dropping connection"),
            Err(err) => warn!("accept failed: {err}"),
        }
    }

    if secure {
        let _ = shared.secure_port.compare_exchange(
            local_addr.port(),
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
    info!(%local_addr, secure, "listener closed");
}

fn spawn_worker(
    queue: &TcpQueue,
    shared: &Arc<Shared>,
    tls: &Option<TlsAcceptor>,
    closed: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let queue = queue.clone();
    let shared = shared.clone();
    let tls = tls.clone();

    tokio::spawn(async move {
        let wait = shared.server_limits.wait_strategy.clone();

        while let Some((stream, remote)) = get_stream(&queue, &wait, &closed).await {
            match &tls {
                None => connection::serve(stream, remote, &shared, false).await,
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => connection::serve(stream, remote, &shared, true).await,
                    Err(err) => warn!(%remote, "TLS handshake failed: {err}"),
                },
            }
        }
    })
}

/// Pops the next queued connection. Returns `None` once the listener is
/// closed and the queue has been drained.
#[inline]
async fn get_stream(
    queue: &TcpQueue,
    wait: &WaitStrategy,
    closed: &watch::Receiver<bool>,
) -> Option<(TcpStream, SocketAddr)> {
    loop {
        if let Some(value) = queue.pop() {
            return Some(value);
        }
        if *closed.borrow() {
            return None;
        }

        match wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
        }
    }
}

/// Resolves `addr` and binds the first address that works.
async fn bind<A: ToSocketAddrs>(addr: A, backlog: i32) -> io::Result<TcpListener> {
    let mut last_err = None;

    for addr in lookup_host(addr).await? {
        match bind_socket(addr, backlog) {
            Ok(listener) => return Ok(listener),
            Err(err) => last_err = Some(err),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve")
    }))
}

fn bind_socket(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}

fn default_headers() -> HeaderMap {
    [
        ("connection", "close"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        ("server", concat!("ferrule/", env!("CARGO_PKG_VERSION"))),
        ("x-git", env!("CARGO_PKG_REPOSITORY")),
    ]
    .into_iter()
    .collect()
}

/// Control over one running listener.
///
/// Dropping the handle leaves the listener running.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Address the listener is bound to (useful after binding port `0`).
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections. Queued connections are still served.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Waits until the accept task and every worker have finished.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!("listener task failed: {err}");
            }
        }
    }
}

//

/// Builder for configuring and creating [`Server`] instances.
pub struct ServerBuilder {
    router: Option<Router>,
    defaults: HeaderMap,
    server_limits: Option<ServerLimits>,
    request_limits: Option<ReqLimits>,
    log_requests: bool,
}

impl ServerBuilder {
    /// Sets the router answering every request (default: an empty router,
    /// which answers `404` to everything).
    #[inline(always)]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Configures listener concurrency and error reporting.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrule::{limits::ServerLimits, Server};
    ///
    /// let server = Server::builder()
    ///     .server_limits(ServerLimits {
    ///         workers: 64,
    ///         ..ServerLimits::default() // Required line
    ///     })
    ///     .build();
    /// # let _ = server;
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures request parsing limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Adds or replaces a header sent with every response.
    ///
    /// Defaults: `Connection: close`, `Referrer-Policy:
    /// strict-origin-when-cross-origin`, `Server: ferrule/<version>` and
    /// `X-Git: <repository>`.
    #[inline(always)]
    pub fn default_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.defaults.set(name, value);
        self
    }

    /// Logs every finished request under the `ferrule::access` target
    /// (default: `false`). See [`access_log`](crate::log::access_log).
    #[inline(always)]
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Finalizes the builder. No socket is bound until
    /// [`Server::listen`] or [`Server::listen_secure`] is called.
    pub fn build(self) -> Server {
        let router = self.router.unwrap_or_default();
        let router = match self.log_requests {
            true => Router::new().middleware(log::access_log).mount("/", router),
            false => router,
        };

        Server {
            shared: Arc::new(Shared {
                router,
                defaults: self.defaults,
                req_limits: self.request_limits.unwrap_or_default(),
                server_limits: self.server_limits.unwrap_or_default(),
                secure_port: AtomicU16::new(0),
            }),
        }
    }
}

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let server = Server::builder()
            .default_header("X-Frame-Options", "DENY")
            .default_header("Server", "custom")
            .build();
        let defaults = &server.shared.defaults;

        assert_eq!(defaults.get("connection"), Some("close"));
        assert_eq!(defaults.get("referrer-policy"), Some("strict-origin-when-cross-origin"));
        assert_eq!(defaults.get("server"), Some("custom"));
        assert_eq!(defaults.get("x-frame-options"), Some("DENY"));
        assert_eq!(defaults.get("x-git"), Some(env!("CARGO_PKG_REPOSITORY")));
        assert_eq!(server.secure_port(), None);
    }

    #[test]
    fn logging_wraps_the_router() {
        let plain = Server::builder().router(Router::new()).build();
        assert!(plain.shared.router.middlewares().is_empty());

        let logged = Server::builder().router(Router::new()).log_requests(true).build();
        assert_eq!(logged.shared.router.middlewares().len(), 2);
    }

    #[tokio::test]
    async fn close_stops_the_listener() {
        let server = Server::builder()
            .server_limits(ServerLimits {
                workers: 2,
                ..ServerLimits::default()
            })
            .build();

        let handle = server.listen("127.0.0.1:0").await.unwrap();
        let addr = handle.local_addr();
        assert_ne!(addr.port(), 0);

        handle.close();
        handle.join().await;

        // The socket is gone once every task has finished.
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn unresolvable_address() {
        let server = Server::builder().build();
        assert!(server.listen("no port here").await.is_err());
    }
}
