//! ETag and conditional GET handling.
//!
//! Static assets carry a strong, content-derived ETag. `If-None-Match` is
//! evaluated with the weak comparison function of RFC 9110, so both `"tag"`
//! and `W/"tag"` count as a cache hit.
//!
//! ```
//! use islet_core::conditional::{ETag, ETagList};
//!
//! let etag = ETag::from_bytes(b"bar\n");
//! assert!(!etag.weak);
//!
//! let header = format!("W/{}", etag);
//! assert!(ETagList::parse(&header).contains_weak(&etag));
//! ```

use crate::HttpRequest;
use sha2::{Digest, Sha256};
use std::fmt;

// ============================================================================
// ETag
// ============================================================================

/// Represents an HTTP entity tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag {
    /// The tag value (without quotes)
    pub value: String,
    pub weak: bool,
}

impl ETag {
    pub fn strong(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            weak: false,
        }
    }

    pub fn weak(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            weak: true,
        }
    }

    /// Parse an ETag from a header value.
    ///
    /// ```
    /// use islet_core::conditional::ETag;
    ///
    /// let weak = ETag::parse("W/\"abc123\"").unwrap();
    /// assert!(weak.weak);
    /// assert_eq!(weak.value, "abc123");
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();

        let (weak, value_part) = match s.strip_prefix("W/").or_else(|| s.strip_prefix("w/")) {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let value = value_part
            .strip_prefix('"')?
            .strip_suffix('"')?
            .to_string();

        Some(Self { value, weak })
    }

    /// Strong ETag from the SHA-256 digest of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self::strong(hex::encode(digest))
    }

    pub fn to_header_value(&self) -> String {
        if self.weak {
            format!("W/\"{}\"", self.value)
        } else {
            format!("\"{}\"", self.value)
        }
    }

    /// Weak comparison: values must match, the weak flag is ignored.
    pub fn weak_match(&self, other: &ETag) -> bool {
        self.value == other.value
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

// ============================================================================
// ETag List (If-None-Match)
// ============================================================================

/// Parsed `If-None-Match` header.
#[derive(Debug, Clone, Default)]
pub struct ETagList {
    pub etags: Vec<ETag>,
    /// Whether the header is the wildcard `*`
    pub any: bool,
}

impl ETagList {
    /// Parse a comma separated list of entity tags, or `*`.
    pub fn parse(header: &str) -> Self {
        let header = header.trim();

        if header == "*" {
            return Self {
                etags: Vec::new(),
                any: true,
            };
        }

        let etags = header
            .split(',')
            .filter_map(|s| ETag::parse(s.trim()))
            .collect();

        Self { etags, any: false }
    }

    /// Check if any ETag in the list matches (weak comparison).
    pub fn contains_weak(&self, etag: &ETag) -> bool {
        self.any || self.etags.iter().any(|e| e.weak_match(etag))
    }
}

/// Conditional-request helpers on [`HttpRequest`].
pub trait ConditionalRequest {
    fn if_none_match(&self) -> Option<ETagList>;

    /// True when the client's cached copy is still current.
    fn if_none_match_matches(&self, etag: &ETag) -> bool {
        self.if_none_match()
            .map(|list| list.contains_weak(etag))
            .unwrap_or(false)
    }
}

impl ConditionalRequest for HttpRequest {
    fn if_none_match(&self) -> Option<ETagList> {
        self.header("if-none-match").map(ETagList::parse)
    }
}
