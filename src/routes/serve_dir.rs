use crate::{
    errors::BoxError,
    http::{range, request::Request, response::Response, types::StatusCode},
    router::Handler,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Serves files below a directory.
///
/// - the request path is resolved against the root; paths climbing above it
///   are answered with `403`
/// - a directory containing `index.html` serves that file
/// - missing files are declined (`Ok(false)`), so later middlewares can
///   answer them
/// - `Range: bytes=..` is honored, see [`range::respond`]
///
/// # Examples
///
/// ```
/// use ferrule::{routes::ServeDir, Router};
///
/// let router = Router::new().get("/static", ServeDir::new("./public"));
/// # let _ = router;
/// ```
#[derive(Debug, Clone)]
pub struct ServeDir {
    root: PathBuf,
}

impl ServeDir {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ServeDir { root: root.into() }
    }

    /// Maps a request path onto the root, `None` if it escapes.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let segments = segments(path)?;
        Some(segments.iter().fold(self.root.clone(), |dir, s| dir.join(s)))
    }
}

impl Handler for ServeDir {
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        let Some(mut file) = self.resolve(req.path()) else {
            res.send(StatusCode::Forbidden);
            return Ok(true);
        };

        if file.is_dir() {
            file.push("index.html");
        }
        if !file.is_file() {
            return Ok(false);
        }

        serve_file(&file, req, res);
        Ok(true)
    }
}

/// Splits a request path into its segments with `.` and `..` applied.
///
/// `None` if the path climbs above its start or a segment holds a
/// backslash or NUL.
pub(super) fn segments(path: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            _ if segment.contains(['\\', '\0']) => return None,
            _ => segments.push(segment),
        }
    }
    Some(segments)
}

/// Answers with the contents of `file`, honoring `Range`.
pub(super) fn serve_file(file: &Path, req: &Request, res: &mut Response) {
    let data = match fs::read(file) {
        Ok(data) => data,
        Err(err) => {
            warn!(path = %file.display(), "failed to read file: {err}");
            res.send(StatusCode::InternalServerError);
            return;
        }
    };

    res.set_content_type(content_type(file));
    range::respond(res, req.header("range"), data);
}

/// Guesses a content type from the file extension.
fn content_type(file: &Path) -> &'static str {
    let ext = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
