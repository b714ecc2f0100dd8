//! Static asset serving.
//!
//! Every file under the static root is indexed once at startup: its URL
//! path, content type and a strong content-derived ETag. Requests are
//! answered from that index only, so paths containing `..` (or anything
//! else not produced by the directory walk) can never reach the disk.
//!
//! Lookups that miss the index return `None` and the dispatcher falls
//! through to route resolution.

use crate::conditional::{ConditionalRequest, ETag};
use crate::fingerprint::{BuildFingerprint, FINGERPRINT_PARAM};
use crate::logging::{debug, info, warn};
use crate::{Error, HttpMethod, HttpRequest, HttpResponse};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cache strategy for static assets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// No Cache-Control header; clients revalidate with the ETag.
    Revalidate,

    /// Immutable assets (Cache-Control: public, max-age=31536000, immutable)
    Immutable,
}

impl CacheStrategy {
    /// Convert strategy to Cache-Control header value
    pub fn to_header_value(&self) -> Option<&'static str> {
        match self {
            CacheStrategy::Revalidate => None,
            CacheStrategy::Immutable => Some("public, max-age=31536000, immutable"),
        }
    }
}

/// One indexed file. Immutable for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct StaticAssetEntry {
    pub file_path: PathBuf,
    pub content_type: String,
    pub etag: ETag,
    pub size_bytes: u64,
    pub excluded_from_fingerprint: bool,
}

/// Configuration for static asset serving
#[derive(Debug, Clone)]
pub struct StaticAssetsConfig {
    /// Root directory for static files
    pub root_dir: PathBuf,

    /// URL paths (e.g. `/vendor/widget.js`) that are never fingerprinted.
    pub excluded: HashSet<String>,
}

impl StaticAssetsConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            excluded: HashSet::new(),
        }
    }

    /// Opt a URL path out of fingerprinting.
    pub fn exclude_from_fingerprint(mut self, url_path: impl Into<String>) -> Self {
        self.excluded.insert(url_path.into());
        self
    }
}

impl Default for StaticAssetsConfig {
    fn default() -> Self {
        Self::new("static")
    }
}

/// URL path → entry, built once by walking the static root.
#[derive(Debug, Default)]
pub struct StaticIndex {
    entries: HashMap<String, StaticAssetEntry>,
}

impl StaticIndex {
    /// Walk `config.root_dir`, hashing every regular file.
    ///
    /// A missing root yields an empty index.
    pub async fn build(config: &StaticAssetsConfig) -> Result<Self, Error> {
        let root = &config.root_dir;
        let mut entries = HashMap::new();

        if !tokio::fs::try_exists(root).await.unwrap_or(false) {
            warn!(root = %root.display(), "Static root does not exist, serving no static files");
            return Ok(Self { entries });
        }

        let mut pending = vec![root.clone()];
        while let Some(dir) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(item) = read_dir.next_entry().await? {
                let file_type = item.file_type().await?;
                let path = item.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let Some(url_path) = url_path_for(root, &path) else {
                    warn!(path = %path.display(), "Skipping static file with non UTF-8 name");
                    continue;
                };

                let contents = tokio::fs::read(&path).await?;
                let entry = StaticAssetEntry {
                    content_type: content_type_for(&path),
                    etag: ETag::from_bytes(&contents),
                    size_bytes: contents.len() as u64,
                    excluded_from_fingerprint: config.excluded.contains(&url_path),
                    file_path: path,
                };
                entries.insert(url_path, entry);
            }
        }

        info!(root = %root.display(), files = entries.len(), "Static index built");
        Ok(Self { entries })
    }

    /// Build an index from already computed entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, StaticAssetEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Look up a decoded URL path such as `/foo.txt`.
    pub fn get(&self, url_path: &str) -> Option<&StaticAssetEntry> {
        self.entries.get(url_path)
    }

    /// Whether `url_path` names a file eligible for fingerprinting.
    pub fn is_fingerprintable(&self, url_path: &str) -> bool {
        self.get(url_path)
            .is_some_and(|entry| !entry.excluded_from_fingerprint)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn url_path_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut url = String::new();
    for component in relative.components() {
        url.push('/');
        url.push_str(component.as_os_str().to_str()?);
    }
    Some(url)
}

/// Content type from the file extension, with a charset for text types.
pub fn content_type_for(path: &Path) -> String {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let essence = mime.essence_str();
    if mime.type_() == mime_guess::mime::TEXT
        || essence == "application/javascript"
        || essence == "application/json"
    {
        format!("{}; charset=utf-8", essence)
    } else {
        essence.to_string()
    }
}

/// Static asset server answering from a [`StaticIndex`].
pub struct StaticAssetServer {
    index: Arc<StaticIndex>,
    fingerprint: BuildFingerprint,
}

impl StaticAssetServer {
    pub fn new(index: Arc<StaticIndex>, fingerprint: BuildFingerprint) -> Self {
        Self { index, fingerprint }
    }

    /// Index `config.root_dir` and create a server for it.
    pub async fn build(
        config: &StaticAssetsConfig,
        fingerprint: BuildFingerprint,
    ) -> Result<Self, Error> {
        let index = StaticIndex::build(config).await?;
        Ok(Self::new(Arc::new(index), fingerprint))
    }

    pub fn index(&self) -> &Arc<StaticIndex> {
        &self.index
    }

    /// Serve `req` if it addresses an indexed file.
    ///
    /// Returns `Ok(None)` for anything that is not a GET/HEAD of a known
    /// file, including a file removed from disk after startup.
    pub async fn serve(&self, req: &HttpRequest) -> Result<Option<HttpResponse>, Error> {
        let head = match HttpMethod::from_str(&req.method) {
            Some(HttpMethod::GET) => false,
            Some(HttpMethod::HEAD) => true,
            _ => return Ok(None),
        };

        let url_path = match urlencoding::decode(req.path_only()) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return Ok(None),
        };
        let Some(entry) = self.index.get(&url_path) else {
            return Ok(None);
        };

        let strategy = if self.is_current_fingerprint(req) {
            CacheStrategy::Immutable
        } else {
            CacheStrategy::Revalidate
        };

        if req
            .if_none_match()
            .is_some_and(|list| list.contains_weak(&entry.etag))
        {
            debug!(path = %url_path, "Static asset not modified");
            return Ok(Some(self.not_modified_response(entry, strategy)));
        }

        let body = match tokio::fs::read(&entry.file_path).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %url_path, "Indexed static file disappeared");
                return Ok(None);
            }
            Err(err) => return Err(Error::Io(err)),
        };

        debug!(path = %url_path, bytes = body.len(), head, "Serving static asset");

        let mut response = self.base_response(HttpResponse::ok(), entry, strategy);
        response.set_header("content-length", body.len().to_string());
        if !head {
            response.body = body;
        }
        Ok(Some(response))
    }

    fn is_current_fingerprint(&self, req: &HttpRequest) -> bool {
        req.query(FINGERPRINT_PARAM)
            .is_some_and(|value| value == self.fingerprint.as_str())
    }

    fn base_response(
        &self,
        response: HttpResponse,
        entry: &StaticAssetEntry,
        strategy: CacheStrategy,
    ) -> HttpResponse {
        let mut response = response
            .with_header("etag", entry.etag.to_header_value())
            .with_header("content-type", entry.content_type.clone());
        if let Some(cache_control) = strategy.to_header_value() {
            response.set_header("cache-control", cache_control);
        }
        response
    }

    /// 304 with the same validators as the full response and no body.
    fn not_modified_response(&self, entry: &StaticAssetEntry, strategy: CacheStrategy) -> HttpResponse {
        self.base_response(HttpResponse::not_modified(), entry, strategy)
    }
}
