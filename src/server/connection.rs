use crate::{
    errors::{panic_message, BoxError},
    http::{
        request::{ParseOutcome, Request},
        response::Response,
        types::{Method, StatusCode},
    },
    server::server_impl::Shared,
};
use std::{
    error::Error,
    fmt::Write as _,
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
    sync::{atomic::Ordering, Arc},
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, warn};

/// Serves exactly one request on `stream` and closes it.
///
/// `secure` is `true` for connections accepted by a TLS listener; those are
/// never redirected to HTTPS.
pub(crate) async fn serve<S>(stream: S, remote: SocketAddr, shared: &Arc<Shared>, secure: bool)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut res = Response::with_defaults(&shared.defaults);

    let outcome = match Request::parse(&mut stream, remote, &shared.req_limits).await {
        Ok(outcome) => outcome,
        Err(err) => {
            debug!(%remote, "connection dropped while reading the request: {err}");
            return;
        }
    };

    let mut req = match outcome {
        ParseOutcome::Request(req) => req,
        ParseOutcome::Rejected(err) => {
            debug!(%remote, "rejected request: {err}");
            res.set_headers(shared.defaults.clone()).send(err.status());
            write(&mut stream, res.to_wire(false), remote).await;
            return;
        }
        ParseOutcome::Foreign => {
            debug!(%remote, "not an HTTP request, closing");
            return;
        }
    };

    let secure_port = shared.secure_port.load(Ordering::Acquire);
    if !secure && secure_port != 0 && req.header("upgrade-insecure-requests") == Some("1") {
        upgrade_insecure(&req, &mut res, secure_port);
    } else {
        match dispatch(shared, req, res).await {
            Some(pair) => (req, res) = pair,
            None => return,
        }
    }

    res.effective_body(&req);
    let wire = res.to_wire(*req.method() == Method::Head);
    write(&mut stream, wire, remote).await;

    req.complete(&res);
}

/// Runs the router on the blocking pool. Errors and panics become a `500`.
///
/// Returns `None` only if the blocking task itself could not be joined
/// (runtime shutdown), in which case request and response are gone.
async fn dispatch(shared: &Arc<Shared>, req: Request, res: Response) -> Option<(Request, Response)> {
    let task_shared = Arc::clone(shared);

    let joined = tokio::task::spawn_blocking(move || {
        let (mut req, mut res) = (req, res);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            task_shared.router.call(&mut req, &mut res)
        }));
        (req, res, outcome)
    })
    .await;

    let (req, mut res, outcome) = match joined {
        Ok(parts) => parts,
        Err(err) => {
            error!("route task did not finish: {err}");
            return None;
        }
    };

    let details = match outcome {
        Ok(Ok(_)) => return Some((req, res)),
        Ok(Err(err)) => {
            let chain = error_chain(&err);
            error!(method = %req.method(), path = req.raw_path(), "unhandled route error: {chain}");
            chain
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(method = %req.method(), path = req.raw_path(), "route panicked: {message}");
            format!("panicked: {message}")
        }
    };

    res.set_headers(shared.defaults.clone())
        .send(StatusCode::InternalServerError);
    if shared.server_limits.expose_errors {
        res.set_text(details);
    }

    Some((req, res))
}

/// Answers `Upgrade-Insecure-Requests: 1` with a redirect to the TLS listener.
fn upgrade_insecure(req: &Request, res: &mut Response, secure_port: u16) {
    let host = req.header("host").unwrap_or_default();
    let mut host = match host.rfind(':') {
        Some(colon) if !host[colon..].contains(']') => &host[..colon],
        _ => host,
    }
    .to_owned();

    if secure_port != 443 {
        let _ = write!(host, ":{secure_port}");
    }

    let location = format!("https://{host}{}", req.raw_path());
    res.redirect(StatusCode::TemporaryRedirect, &location)
        .set_header("vary", "Upgrade-Insecure-Requests");
}

async fn write<S>(stream: &mut BufReader<S>, wire: Vec<u8>, remote: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = async {
        stream.write_all(&wire).await?;
        stream.flush().await?;
        stream.shutdown().await
    }
    .await;

    if let Err(err) = result {
        warn!(%remote, "failed to write response: {err}");
    }
}

fn error_chain(err: &BoxError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let _ = write!(chain, "\ncaused by: {cause}");
        source = cause.source();
    }
    chain
}
