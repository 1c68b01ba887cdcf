use crate::{
    errors::BoxError,
    http::{request::Request, response::Response, types::StatusCode},
    router::Handler,
    routes::{
        escape,
        serve_dir::{segments, serve_file},
    },
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::{
    fmt::Write,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Characters kept as-is when a file name becomes a link segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Lists the contents of directories below a root as HTML pages.
///
/// Directories come first, then files, each group sorted by name.
/// Requests for files are answered like [`ServeDir`](super::ServeDir) does,
/// paths climbing above the root give `403`, and missing paths are declined.
///
/// ```
/// use ferrule::{routes::IndexDir, Router};
///
/// let router = Router::new().get("/home", IndexDir::new("./public"));
/// # let _ = router;
/// ```
#[derive(Debug, Clone)]
pub struct IndexDir {
    root: PathBuf,
}

struct Entry {
    name: String,
    is_dir: bool,
}

impl IndexDir {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        IndexDir { root: root.into() }
    }
}

impl Handler for IndexDir {
    fn handle(&self, req: &mut Request, res: &mut Response) -> Result<bool, BoxError> {
        let Some(segments) = segments(req.path()) else {
            res.send(StatusCode::Forbidden);
            return Ok(true);
        };
        let target = segments.iter().fold(self.root.clone(), |dir, s| dir.join(s));

        if target.is_file() {
            serve_file(&target, req, res);
            return Ok(true);
        }
        if !target.is_dir() {
            return Ok(false);
        }

        let entries = match list(&target) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %target.display(), "failed to list directory: {err}");
                res.send(StatusCode::InternalServerError);
                return Ok(true);
            }
        };

        let shown = format!("/{}", segments.join("/"));
        let page = render(&shown, req.full_path(), !segments.is_empty(), &entries);
        res.set_status(StatusCode::Ok).set_html(page);
        Ok(true)
    }
}

fn list(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        entries.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: entry.file_type()?.is_dir(),
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Renders the listing of `shown`. Links are built below `base`, the path
/// the client asked for.
fn render(shown: &str, base: &str, has_parent: bool, entries: &[Entry]) -> String {
    let shown = escape(shown);
    let base = base.trim_end_matches('/');
    let mut html = String::with_capacity(256 + entries.len() * 64);

    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>Index of {shown}</title></head><body><h1>Index of {shown}</h1>"
    );

    if has_parent {
        let parent = match base.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => parent,
            _ => "/",
        };
        let _ = write!(html, "<a href=\"{}\">..</a><br>", escape(parent));
    }

    if entries.is_empty() {
        html.push_str("No files.");
    }

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            html.push_str("<br>");
        }

        let href = format!("{base}/{}", utf8_percent_encode(&entry.name, SEGMENT));
        let _ = write!(
            html,
            "<a href=\"{}\">{}{}</a>",
            escape(&href),
            if entry.is_dir { "[D] " } else { "" },
            escape(&entry.name),
        );
    }

    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Method;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "bee").unwrap();
        fs::write(dir.path().join("a <&> b.txt"), "odd").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::write(dir.path().join("alpha").join("inner.txt"), "inner").unwrap();
        fs::create_dir(dir.path().join("void")).unwrap();
        dir
    }

    fn get(index: &IndexDir, target: &str) -> (bool, Response) {
        let mut req = Request::for_test(Method::Get, target);
        let mut res = Response::new();
        let handled = index.handle(&mut req, &mut res).unwrap();
        (handled, res)
    }

    fn page(res: &Response) -> String {
        String::from_utf8(res.body().to_vec()).unwrap()
    }

    #[test]
    fn lists_directories_first() {
        let dir = tree();
        let index = IndexDir::new(dir.path());

        let (handled, res) = get(&index, "/");
        assert!(handled);
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));

        let page = page(&res);
        assert!(page.contains("<title>Index of /</title>"));
        assert!(!page.contains(">..</a>"));

        #[rustfmt::skip]
        let order = [
            "<a href=\"/alpha\">[D] alpha</a>",
            "<a href=\"/void\">[D] void</a>",
            "<a href=\"/zeta\">[D] zeta</a>",
            "<a href=\"/a%20%3C%26%3E%20b.txt\">a &lt;&amp;&gt; b.txt</a>",
            "<a href=\"/b.txt\">b.txt</a>",
        ];

        let positions: Vec<usize> = order
            .iter()
            .map(|link| page.find(link).unwrap_or_else(|| panic!("{link} in {page}")))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{page}");
    }

    #[test]
    fn nested_listings() {
        let dir = tree();
        let index = IndexDir::new(dir.path());

        #[rustfmt::skip]
        let cases = [
            ("/alpha",     "Index of /alpha",  "<a href=\"/\">..</a>",      "<a href=\"/alpha/inner.txt\">inner.txt</a>"),
            ("/alpha/",    "Index of /alpha",  "<a href=\"/\">..</a>",      "<a href=\"/alpha/inner.txt\">inner.txt</a>"),
            ("/void",      "Index of /void",   "<a href=\"/\">..</a>",      "No files."),
            ("/zeta/../alpha", "Index of /alpha", "<a href=\"/zeta/..\">..</a>", "inner.txt"),
        ];

        for (target, title, parent, body) in cases {
            let (handled, res) = get(&index, target);
            assert!(handled, "{target}");

            let page = page(&res);
            assert!(page.contains(title), "{target}: {page}");
            assert!(page.contains(parent), "{target}: {page}");
            assert!(page.contains(body), "{target}: {page}");
        }
    }

    #[test]
    fn files_missing_paths_and_escapes() {
        let dir = tree();
        let index = IndexDir::new(dir.path());

        let (handled, res) = get(&index, "/alpha/inner.txt");
        assert!(handled);
        assert_eq!(res.body(), b"inner");
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));

        let (handled, res) = get(&index, "/nothing");
        assert!(!handled);
        assert_eq!(res.status(), StatusCode::NotFound);

        let (handled, res) = get(&index, "/../etc");
        assert!(handled);
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    #[test]
    fn links_follow_the_mount_point() {
        let entries = [Entry {
            name: "notes.md".to_owned(),
            is_dir: false,
        }];

        #[rustfmt::skip]
        let cases = [
            ("/",       "/home",        "<a href=\"/\">..</a>",      "<a href=\"/home/notes.md\">"),
            ("/docs",   "/home/docs",   "<a href=\"/home\">..</a>",  "<a href=\"/home/docs/notes.md\">"),
            ("/d\"q",   "/home/d\"q",   "<a href=\"/home\">..</a>",  "<a href=\"/home/d&quot;q/notes.md\">"),
        ];

        for (shown, base, parent, link) in cases {
            let html = render(shown, base, true, &entries);
            assert!(html.contains(parent), "{base}: {html}");
            assert!(html.contains(link), "{base}: {html}");
        }
    }
}
