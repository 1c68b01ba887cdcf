use crate::{
    errors::BoxError,
    http::{
        request::Request,
        response::Response,
        types::{title_case, StatusCode},
    },
    router::Handler,
    routes::escape,
};
use chrono::Utc;
use std::fmt::Write;

/// Upper bound on re-renders while waiting for the printed `Content-Length`
/// to match the body actually sent.
const MAX_RENDERS: usize = 14;

/// Answers with an HTML page describing the request (method, path, headers,
/// query arguments, body size) and the response (status and headers).
///
/// The page prints the response's own `Content-Length`, which depends on the
/// page. It is rendered again until the printed value matches the length of
/// the body that will be sent, compression included.
///
/// ```
/// use ferrule::{routes::DebugPage, Router};
///
/// let router = Router::new().get("/debug", DebugPage);
/// # let _ = router;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugPage;

impl Handler for DebugPage {
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        res.set_date(Utc::now()).set_status(StatusCode::Ok);

        for _ in 0..MAX_RENDERS {
            let printed = res.header("content-length").map(str::to_owned);
            let page = render(req, res);

            res.set_html(page);
            res.effective_body(req);

            if res.header("content-length") == printed.as_deref() {
                return Ok(true);
            }
        }

        tracing::warn!(
            path = req.raw_path(),
            "debug page length did not settle after {MAX_RENDERS} renders"
        );
        Ok(true)
    }
}

fn render(req: &Request, res: &Response) -> String {
    let mut html = String::with_capacity(2048);

    html.push_str(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>Debug-Page</title></head><body><h2>Request</h2>",
    );
    let _ = write!(
        html,
        "<strong>Method:</strong> {}<br><strong>Path:</strong> {}<br><strong>Headers:</strong> ",
        escape(req.method().as_str()),
        escape(req.path()),
    );
    list(&mut html, req.headers().iter(), true);

    html.push_str("<br><strong>Query-Arguments:</strong> ");
    let mut args: Vec<_> = req.query_args().iter().collect();
    args.sort();
    list(&mut html, args.into_iter().map(|(k, v)| (k.as_str(), v.as_str())), false);

    let _ = write!(
        html,
        "<br><strong>Body-Size:</strong> {}<hr>\
         <h2>Response</h2>\
         <strong>Status-Code:</strong> {}<br><strong>Status-Name:</strong> {}<br>\
         <strong>Headers:</strong> ",
        req.body_bytes().len(),
        res.status().code(),
        escape(res.status().reason()),
    );
    list(&mut html, res.headers().iter(), true);

    html.push_str("<br></body></html>");
    html
}

fn list<'a>(html: &mut String, entries: impl Iterator<Item = (&'a str, &'a str)>, headers: bool) {
    let mut entries = entries.peekable();
    if entries.peek().is_none() {
        html.push_str("<em>None</em>");
        return;
    }

    html.push_str("<ul>");
    for (name, value) in entries {
        let name = match headers {
            true => title_case(name),
            false => name.to_owned(),
        };
        let _ = write!(
            html,
            "<li><strong>{}</strong>: {}</li>",
            escape(&name),
            escape(value)
        );
    }
    html.push_str("</ul>");
}
