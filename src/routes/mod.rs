//! Ready-made handlers.
//!
//! - [`ServeDir`]: static files below a directory, with byte ranges
//! - [`IndexDir`]: browsable directory listings, files served like [`ServeDir`]
//! - [`DebugPage`]: an HTML description of the request and its response

mod debug;
mod index_dir;
mod serve_dir;

pub use debug::DebugPage;
pub use index_dir::IndexDir;
pub use serve_dir::ServeDir;

/// Escapes the five HTML-significant characters.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
