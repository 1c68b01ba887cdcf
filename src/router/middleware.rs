use super::{ErrorHandler, Handler};
use crate::http::types::{normalize_path, Method};
use regex::Regex;
use std::fmt;

/// Decides which request paths a middleware applies to.
///
/// | Source                           | Variant   | Matches                                   |
/// |----------------------------------|-----------|-------------------------------------------|
/// | `&str` / `String`                | `Prefix`  | paths starting with it (ASCII case-insensitive) |
/// | slices / `Vec`s of strings       | `Exact`   | paths equal to a member (ASCII case-insensitive) |
/// | [`PathMatcher::pattern`]         | `Pattern` | paths the regex matches completely        |
///
/// String paths are normalized to rooted form first (`"files/"` becomes
/// `"/files"`); exact sets drop duplicates.
#[derive(Clone)]
pub enum PathMatcher {
    Prefix(String),
    Pattern(Regex),
    Exact(Vec<String>),
}

impl PathMatcher {
    /// Builds a matcher from a regular expression that must match the whole path.
    ///
    /// ```
    /// use ferrule::router::PathMatcher;
    ///
    /// let matcher = PathMatcher::pattern(r"/users/\d+").unwrap();
    /// assert!(matcher.matches("/users/42"));
    /// assert!(!matcher.matches("/users/42/posts"));
    /// ```
    pub fn pattern(re: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{re})$")).map(PathMatcher::Pattern)
    }

    /// Checks `path` against the matcher.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Prefix(prefix) => path
                .as_bytes()
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes())),
            PathMatcher::Pattern(re) => re.is_match(path),
            PathMatcher::Exact(paths) => paths.iter().any(|p| p.eq_ignore_ascii_case(path)),
        }
    }

    /// `true` for the root prefix `/`, which matches everything and never
    /// rewrites the request path.
    #[inline]
    pub fn is_root(&self) -> bool {
        matches!(self, PathMatcher::Prefix(prefix) if prefix == "/")
    }

    fn exact<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result: Vec<String> = Vec::new();

        for path in paths {
            let path = normalize_path(path.as_ref());
            if !result.contains(&path) {
                result.push(path);
            }
        }

        PathMatcher::Exact(result)
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatcher::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            PathMatcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            PathMatcher::Exact(paths) => f.debug_tuple("Exact").field(paths).finish(),
        }
    }
}

impl From<&str> for PathMatcher {
    fn from(path: &str) -> Self {
        PathMatcher::Prefix(normalize_path(path))
    }
}

impl From<String> for PathMatcher {
    fn from(path: String) -> Self {
        PathMatcher::from(path.as_str())
    }
}

impl From<&[&str]> for PathMatcher {
    fn from(paths: &[&str]) -> Self {
        PathMatcher::exact(paths)
    }
}

impl<const N: usize> From<[&str; N]> for PathMatcher {
    fn from(paths: [&str; N]) -> Self {
        PathMatcher::exact(paths)
    }
}

impl From<Vec<&str>> for PathMatcher {
    fn from(paths: Vec<&str>) -> Self {
        PathMatcher::exact(paths)
    }
}

impl From<Vec<String>> for PathMatcher {
    fn from(paths: Vec<String>) -> Self {
        PathMatcher::exact(paths)
    }
}

/// Callback stored in a [`Middleware`].
pub enum HandlerKind {
    Route(Box<dyn Handler>),
    Error(Box<dyn ErrorHandler>),
}

impl fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Route(_) => f.write_str("Route"),
            HandlerKind::Error(_) => f.write_str("Error"),
        }
    }
}

/// One registered entry of a [`Router`](super::Router).
#[derive(Debug)]
pub struct Middleware {
    method: Option<Method>,
    matcher: PathMatcher,
    kind: HandlerKind,
}

impl Middleware {
    #[inline]
    pub(crate) fn new(method: Option<Method>, matcher: PathMatcher, kind: HandlerKind) -> Self {
        Middleware {
            method,
            matcher,
            kind,
        }
    }

    /// Method filter; `None` accepts every method.
    #[inline]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    #[inline]
    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    #[inline]
    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    #[inline]
    pub(crate) fn accepts_method(&self, method: &Method) -> bool {
        self.method.as_ref().map_or(true, |m| m == method)
    }
}
