//! Build fingerprint and asset URL rewriting.
//!
//! After a page renders, [`AssetRewriter::rewrite`] scans the markup for
//! `src` and `srcset` attributes. Every URL that names a file in the static
//! index gets the current [`BuildFingerprint`] appended as the
//! `__islet_c` query parameter, which lets the static server answer it with
//! an immutable cache policy.
//!
//! URLs are left alone when they are external, are not in the index, are
//! opted out in [`StaticAssetsConfig`](crate::static_assets::StaticAssetsConfig),
//! or sit on an element carrying `data-islet-no-fingerprint`.

use crate::static_assets::StaticIndex;
use std::fmt;
use std::sync::Arc;

/// Query parameter carrying the build fingerprint.
pub const FINGERPRINT_PARAM: &str = "__islet_c";

/// Attribute that opts an element out of fingerprinting.
pub const NO_FINGERPRINT_ATTR: &str = "data-islet-no-fingerprint";

/// Opaque per-process build identifier.
///
/// Generated once at startup and never mutated; cloning shares the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildFingerprint(Arc<str>);

impl BuildFingerprint {
    /// Random fingerprint (UUID v4, simple form).
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn new(value: impl AsRef<str>) -> Self {
        Self(Arc::from(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append the fingerprint parameter to `url`, keeping any fragment last.
///
/// An existing parameter from an older build is replaced in place, so the
/// result always names the current build exactly once.
///
/// ```
/// use islet_core::fingerprint::{fingerprint_url, BuildFingerprint};
///
/// let fp = BuildFingerprint::new("abc");
/// let once = fingerprint_url("/img.png?w=10#top", &fp);
/// assert_eq!(once, "/img.png?w=10&__islet_c=abc#top");
/// assert_eq!(fingerprint_url(&once, &fp), once);
/// assert_eq!(fingerprint_url("/img.png?__islet_c=old", &fp), "/img.png?__islet_c=abc");
/// ```
pub fn fingerprint_url(url: &str, fingerprint: &BuildFingerprint) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, query),
        None => (base, ""),
    };

    let param = format!("{}={}", FINGERPRINT_PARAM, fingerprint);
    let mut pairs = Vec::new();
    let mut placed = false;
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        if pair.split('=').next() != Some(FINGERPRINT_PARAM) {
            pairs.push(pair);
        } else if !placed {
            pairs.push(param.as_str());
            placed = true;
        }
    }
    if !placed {
        pairs.push(param.as_str());
    }

    let mut out = format!("{}?{}", path, pairs.join("&"));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Rewrites asset references in rendered HTML.
#[derive(Clone)]
pub struct AssetRewriter {
    index: Arc<StaticIndex>,
    fingerprint: BuildFingerprint,
}

impl AssetRewriter {
    pub fn new(index: Arc<StaticIndex>, fingerprint: BuildFingerprint) -> Self {
        Self { index, fingerprint }
    }

    pub fn fingerprint(&self) -> &BuildFingerprint {
        &self.fingerprint
    }

    /// Fingerprint a single URL if it names an eligible static file.
    pub fn rewrite_url(&self, url: &str) -> Option<String> {
        if !url.starts_with('/') || url.starts_with("//") {
            return None;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let decoded = urlencoding::decode(path).ok()?;
        if !self.index.is_fingerprintable(&decoded) {
            return None;
        }
        Some(fingerprint_url(url, &self.fingerprint))
    }

    /// Rewrite every eligible `src`/`srcset` URL in `html`.
    pub fn rewrite(&self, html: &str) -> String {
        let mut out = String::with_capacity(html.len() + 64);
        let mut pos = 0;

        while let Some(offset) = html[pos..].find('<') {
            let start = pos + offset;
            out.push_str(&html[pos..start]);
            let rest = &html[start..];

            if rest.starts_with("<!--") {
                let end = rest.find("-->").map(|i| start + i + 3).unwrap_or(html.len());
                out.push_str(&html[start..end]);
                pos = end;
                continue;
            }

            let Some(tag) = Tag::scan(html, start) else {
                out.push('<');
                pos = start + 1;
                continue;
            };

            self.write_tag(html, &tag, &mut out);
            pos = tag.end;

            // Raw text elements: copy their content untouched.
            if !tag.closing && (tag.name == "script" || tag.name == "style") {
                let close = format!("</{}", tag.name);
                let end = find_ascii_ci(&html[pos..], &close)
                    .map(|i| pos + i)
                    .unwrap_or(html.len());
                out.push_str(&html[pos..end]);
                pos = end;
            }
        }

        out.push_str(&html[pos..]);
        out
    }

    fn write_tag(&self, html: &str, tag: &Tag, out: &mut String) {
        let excluded = tag.closing
            || tag
                .attrs
                .iter()
                .any(|a| a.name.eq_ignore_ascii_case(NO_FINGERPRINT_ATTR));

        let mut cursor = tag.start;
        if !excluded {
            for attr in &tag.attrs {
                let Some((value_start, value_end)) = attr.value else {
                    continue;
                };
                let value = &html[value_start..value_end];
                let rewritten = if attr.name.eq_ignore_ascii_case("src") {
                    self.rewrite_url(value)
                } else if attr.name.eq_ignore_ascii_case("srcset") {
                    self.rewrite_srcset(value)
                } else {
                    None
                };

                if let Some(rewritten) = rewritten {
                    out.push_str(&html[cursor..value_start]);
                    out.push_str(&rewritten);
                    cursor = value_end;
                }
            }
        }
        out.push_str(&html[cursor..tag.end]);
    }

    /// Rewrite each candidate URL of a `srcset` list, keeping descriptors.
    fn rewrite_srcset(&self, value: &str) -> Option<String> {
        let mut changed = false;
        let candidates: Vec<String> = value
            .split(',')
            .map(|candidate| {
                let trimmed = candidate.trim_start();
                let lead = &candidate[..candidate.len() - trimmed.len()];
                let (url, descriptor) = match trimmed.find(char::is_whitespace) {
                    Some(i) => trimmed.split_at(i),
                    None => (trimmed, ""),
                };
                match self.rewrite_url(url) {
                    Some(url) => {
                        changed = true;
                        format!("{}{}{}", lead, url, descriptor)
                    }
                    None => candidate.to_string(),
                }
            })
            .collect();
        changed.then(|| candidates.join(","))
    }
}

struct Attr<'a> {
    name: &'a str,
    /// Byte range of the value, without quotes.
    value: Option<(usize, usize)>,
}

struct Tag<'a> {
    start: usize,
    end: usize,
    name: String,
    closing: bool,
    attrs: Vec<Attr<'a>>,
}

impl<'a> Tag<'a> {
    /// Scan a tag starting at `html[start] == '<'`.
    fn scan(html: &'a str, start: usize) -> Option<Self> {
        let bytes = html.as_bytes();
        let mut i = start + 1;
        let closing = bytes.get(i) == Some(&b'/');
        if closing {
            i += 1;
        }

        let name_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        if i == name_start {
            return None;
        }
        let name = html[name_start..i].to_ascii_lowercase();

        let mut attrs = Vec::new();
        loop {
            while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
                i += 1;
            }
            match bytes.get(i) {
                None => return None,
                Some(b'>') => {
                    return Some(Tag {
                        start,
                        end: i + 1,
                        name,
                        closing,
                        attrs,
                    });
                }
                _ => {}
            }

            let attr_start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            let attr_name = &html[attr_start..i];

            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if bytes.get(i) != Some(&b'=') {
                attrs.push(Attr {
                    name: attr_name,
                    value: None,
                });
                continue;
            }
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }

            let value = match bytes.get(i) {
                Some(&quote @ (b'"' | b'\'')) => {
                    let value_start = i + 1;
                    let len = html[value_start..].find(quote as char)?;
                    i = value_start + len + 1;
                    (value_start, value_start + len)
                }
                Some(_) => {
                    let value_start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    (value_start, i)
                }
                None => return None,
            };
            attrs.push(Attr {
                name: attr_name,
                value: Some(value),
            });
        }
    }
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::ETag;
    use crate::static_assets::StaticAssetEntry;

    fn entry(excluded: bool) -> StaticAssetEntry {
        StaticAssetEntry {
            file_path: "unused".into(),
            content_type: "image/png".into(),
            etag: ETag::strong("x"),
            size_bytes: 1,
            excluded_from_fingerprint: excluded,
        }
    }

    fn rewriter() -> AssetRewriter {
        let index = StaticIndex::from_entries([
            ("/img.png".to_string(), entry(false)),
            ("/img 2.png".to_string(), entry(false)),
            ("/vendor.js".to_string(), entry(true)),
        ]);
        AssetRewriter::new(Arc::new(index), BuildFingerprint::new("fp"))
    }

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(BuildFingerprint::generate(), BuildFingerprint::generate());
    }

    #[test]
    fn test_rewrites_src() {
        let html = r#"<p>hi</p><img src="/img.png" alt="x">"#;
        assert_eq!(
            rewriter().rewrite(html),
            r#"<p>hi</p><img src="/img.png?__islet_c=fp" alt="x">"#
        );
    }

    #[test]
    fn test_rewrites_srcset_candidates() {
        let html = r#"<img srcset="/img.png 1x, /other.png 2x, /img%202.png 3x">"#;
        assert_eq!(
            rewriter().rewrite(html),
            r#"<img srcset="/img.png?__islet_c=fp 1x, /other.png 2x, /img%202.png?__islet_c=fp 3x">"#
        );
    }

    #[test]
    fn test_leaves_ineligible_urls() {
        let rw = rewriter();
        for html in [
            r#"<img src="https://cdn.example.com/img.png">"#,
            r#"<img src="//img.png">"#,
            r#"<img src="/missing.png">"#,
            r#"<script src="/vendor.js"></script>"#,
            r#"<img data-islet-no-fingerprint src="/img.png">"#,
            r#"<a href="/img.png">link</a>"#,
        ] {
            assert_eq!(rw.rewrite(html), html);
        }
    }

    #[test]
    fn test_idempotent() {
        let rw = rewriter();
        let html = r#"<div><img src='/img.png'><source srcset="/img.png"></div>"#;
        let once = rw.rewrite(html);
        assert_eq!(rw.rewrite(&once), once);
        assert!(once.contains("'/img.png?__islet_c=fp'"));
    }

    #[test]
    fn test_stale_fingerprint_replaced() {
        let fp = BuildFingerprint::new("new");
        assert_eq!(
            fingerprint_url("/img.png?__islet_c=old", &fp),
            "/img.png?__islet_c=new"
        );
        assert_eq!(
            fingerprint_url("/img.png?w=1&__islet_c=old&h=2&__islet_c=older#x", &fp),
            "/img.png?w=1&__islet_c=new&h=2#x"
        );

        let rw = rewriter();
        let once = rw.rewrite(r#"<img src="/img.png?__islet_c=stale">"#);
        assert_eq!(once, r#"<img src="/img.png?__islet_c=fp">"#);
        assert_eq!(rw.rewrite(&once), once);
    }

    #[test]
    fn test_skips_comments_and_script_bodies() {
        let html = r#"<!-- <img src="/img.png"> --><script>let s = '<img src="/img.png">';</script>"#;
        assert_eq!(rewriter().rewrite(html), html);
    }

    #[test]
    fn test_island_markup_is_rewritten() {
        let html = r#"<!--islet:0:Counter--><img src=/img.png><!--/islet:0-->"#;
        assert_eq!(
            rewriter().rewrite(html),
            r#"<!--islet:0:Counter--><img src=/img.png?__islet_c=fp><!--/islet:0-->"#
        );
    }

    #[test]
    fn test_stray_angle_bracket() {
        let html = "a < b <img src=\"/img.png\">";
        assert_eq!(
            rewriter().rewrite(html),
            "a < b <img src=\"/img.png?__islet_c=fp\">"
        );
    }
}
