//! Route patterns and path matching.
//!
//! A pattern is a sequence of segments:
//!
//! - literal segments (`/books`) match exactly,
//! - parameters (`/:id`) match one non-empty segment,
//! - a terminal wildcard (`/:path*`) captures the rest of the path,
//!   slashes included, possibly empty.
//!
//! When several patterns match the same path the most specific wins,
//! comparing segment by segment from the left: literal beats parameter,
//! parameter beats wildcard.
//!
//! ```
//! use islet_core::routing::{PathMatch, PathMatcher, RoutePattern};
//!
//! let matcher = PathMatcher::new(vec![
//!     (RoutePattern::parse("/foo/:path*").unwrap(), "wildcard"),
//!     (RoutePattern::parse("/foo/bar").unwrap(), "static"),
//! ])
//! .unwrap();
//!
//! match matcher.find("/foo/bar/baz") {
//!     PathMatch::Found { route, params } => {
//!         assert_eq!(*route, "wildcard");
//!         assert_eq!(params["path"], "bar/baz");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use crate::Error;
use crate::logging::debug;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Captured path parameters, ordered by name.
pub type Params = BTreeMap<String, String>;

/// One segment of a route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

impl Segment {
    /// Specificity rank: lower is more specific.
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 0,
            Segment::Param(_) => 1,
            Segment::Wildcard(_) => 2,
        }
    }

    fn parse(token: &str, pattern: &str) -> Result<Self, Error> {
        let Some(name) = token.strip_prefix(':') else {
            return Ok(Segment::Literal(token.to_string()));
        };

        let (name, wildcard) = match name.strip_suffix('*') {
            Some(n) => (n, true),
            None => (name, false),
        };

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::InvalidPattern(format!(
                "invalid parameter name '{}' in {}",
                token, pattern
            )));
        }

        Ok(if wildcard {
            Segment::Wildcard(name.to_string())
        } else {
            Segment::Param(name.to_string())
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Param(n) => write!(f, ":{}", n),
            Segment::Wildcard(n) => write!(f, ":{}*", n),
        }
    }
}

/// A parsed, normalized route pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

/// A route derived from a file under the routes directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRoute {
    pub pattern: RoutePattern,
    pub is_index: bool,
}

impl RoutePattern {
    /// Parse a pattern such as `/props/:id` or `/foo/:path*`.
    ///
    /// Empty segments are dropped, so `/a//b/` normalizes to `/a/b`.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|token| Segment::parse(token, pattern))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(s, Segment::Wildcard(_)))
        {
            if pos != segments.len() - 1 {
                return Err(Error::InvalidPattern(format!(
                    "wildcard must be the last segment in {}",
                    pattern
                )));
            }
        }

        let mut seen = HashSet::new();
        for seg in &segments {
            if let Segment::Param(name) | Segment::Wildcard(name) = seg {
                if !seen.insert(name.as_str()) {
                    return Err(Error::InvalidPattern(format!(
                        "parameter '{}' appears twice in {}",
                        name, pattern
                    )));
                }
            }
        }

        let raw = format!(
            "/{}",
            segments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("/")
        );

        Ok(Self { raw, segments })
    }

    /// Convert a route file path (relative to the routes directory) into a pattern.
    ///
    /// `props/[id].tsx` becomes `/props/:id`, `foo/[...path].tsx` becomes
    /// `/foo/:path*` and `about/index.tsx` becomes the index route `/about`.
    /// Files whose name starts with `_` (middleware, error pages) are not
    /// routes and yield `None`.
    pub fn from_file_path(path: &str) -> Result<Option<FileRoute>, Error> {
        let trimmed = path.trim_matches('/');
        let without_ext = match trimmed.rsplit_once('.') {
            Some((stem, ext)) if !ext.contains('/') => stem,
            _ => trimmed,
        };

        let mut parts: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();
        if parts.last().is_some_and(|name| name.starts_with('_')) {
            return Ok(None);
        }

        let is_index = parts.last() == Some(&"index");
        if is_index {
            parts.pop();
        }

        let tokens: Vec<String> = parts.iter().map(|p| bracket_to_token(p)).collect();
        let pattern = Self::parse(&format!("/{}", tokens.join("/")))?;

        Ok(Some(FileRoute { pattern, is_index }))
    }

    /// The normalized pattern text, e.g. `/props/:id`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Left-to-right specificity key; smaller sorts first.
    pub fn specificity(&self) -> Vec<u8> {
        self.segments.iter().map(Segment::rank).collect()
    }

    /// Key under which two patterns are considered the same route.
    fn identity(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.clone(),
                Segment::Param(_) => ":".to_string(),
                Segment::Wildcard(_) => "*".to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Directory the route lives in, as middleware-tree keys.
    ///
    /// An index route is the directory itself, a leaf route lives in its parent.
    pub fn directory(&self, is_index: bool) -> Vec<String> {
        let take = if is_index {
            self.segments.len()
        } else {
            self.segments.len().saturating_sub(1)
        };
        self.segments[..take].iter().map(ToString::to_string).collect()
    }

    /// Match already split, percent-decoded path segments.
    pub fn matches(&self, path: &[String]) -> Option<Params> {
        let mut params = Params::new();

        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Literal(lit) => {
                    if path.get(i) != Some(lit) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(i)?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), value.clone());
                }
                Segment::Wildcard(name) => {
                    let rest = path.get(i..).unwrap_or(&[]).join("/");
                    params.insert(name.clone(), rest);
                    return Some(params);
                }
            }
        }

        (path.len() == self.segments.len()).then_some(params)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// `[...name]` → `:name*`, `[name]` → `:name`, anything else unchanged.
fn bracket_to_token(part: &str) -> String {
    match part.strip_prefix('[').and_then(|p| p.strip_suffix(']')) {
        Some(inner) => match inner.strip_prefix("...") {
            Some(name) => format!(":{}*", name),
            None => format!(":{}", inner),
        },
        None => part.to_string(),
    }
}

/// Split a directory path (`layeredMdw/[id]`) into middleware-tree keys.
pub fn directory_segments(dir: &str) -> Vec<String> {
    dir.split('/')
        .filter(|s| !s.is_empty())
        .map(bracket_to_token)
        .collect()
}

/// Split a request path into percent-decoded segments.
///
/// `/` yields no segments; a trailing slash yields a final empty segment,
/// which no literal or parameter segment matches.
pub fn split_path(path: &str) -> Vec<String> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('/')
        .map(|seg| {
            urlencoding::decode(seg)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| seg.to_string())
        })
        .collect()
}

/// Outcome of a path lookup
#[derive(Debug)]
pub enum PathMatch<'a, T> {
    Found { route: &'a T, params: Params },
    /// The path only matches once its trailing slash is removed.
    Redirect(String),
    NotFound,
}

/// Patterns sorted by specificity, each paired with a payload.
#[derive(Debug)]
pub struct PathMatcher<T> {
    entries: Vec<(RoutePattern, T)>,
}

impl<T> PathMatcher<T> {
    /// Sort the routes by specificity and reject ambiguous duplicates.
    pub fn new(mut entries: Vec<(RoutePattern, T)>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for (pattern, _) in &entries {
            if !seen.insert(pattern.identity()) {
                return Err(Error::DuplicateRoute(pattern.to_string()));
            }
        }

        entries.sort_by(|(a, _), (b, _)| {
            a.specificity()
                .cmp(&b.specificity())
                .then_with(|| a.as_str().cmp(b.as_str()))
        });

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &RoutePattern> {
        self.entries.iter().map(|(p, _)| p)
    }

    fn find_exact(&self, segments: &[String]) -> Option<(&T, Params)> {
        self.entries
            .iter()
            .find_map(|(pattern, route)| pattern.matches(segments).map(|params| (route, params)))
    }

    /// Resolve a path (without query string).
    pub fn find(&self, path: &str) -> PathMatch<'_, T> {
        if let Some((route, params)) = self.find_exact(&split_path(path)) {
            return PathMatch::Found { route, params };
        }

        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/');
            let normalized = if trimmed.is_empty() { "/" } else { trimmed };
            if self.find_exact(&split_path(normalized)).is_some() {
                debug!(from = %path, to = %normalized, "Trailing slash redirect");
                return PathMatch::Redirect(normalized.to_string());
            }
        }

        PathMatch::NotFound
    }
}
