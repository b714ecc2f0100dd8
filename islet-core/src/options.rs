// Server options consumed by the dispatcher

use crate::fingerprint::BuildFingerprint;
use crate::static_assets::StaticAssetsConfig;
use std::path::PathBuf;

/// Default reserved path of the hydration bootstrap script.
pub const DEFAULT_HYDRATION_SCRIPT_PATH: &str = "/_islet/hydrate.js";

/// Startup options for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Static root directory.
    pub static_dir: PathBuf,
    /// URL paths under the static root that are never fingerprinted.
    pub fingerprint_exclusions: Vec<String>,
    /// Reserved, framework-owned path serving the hydration bootstrap.
    pub hydration_script_path: String,
    pub build_id: BuildFingerprint,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }

    pub fn exclude_from_fingerprint(mut self, url_path: impl Into<String>) -> Self {
        self.fingerprint_exclusions.push(url_path.into());
        self
    }

    pub fn with_hydration_script_path(mut self, path: impl Into<String>) -> Self {
        self.hydration_script_path = path.into();
        self
    }

    pub fn with_build_id(mut self, build_id: impl AsRef<str>) -> Self {
        self.build_id = BuildFingerprint::new(build_id);
        self
    }

    pub(crate) fn static_assets_config(&self) -> StaticAssetsConfig {
        self.fingerprint_exclusions.iter().fold(
            StaticAssetsConfig::new(&self.static_dir),
            |config, path| config.exclude_from_fingerprint(path.clone()),
        )
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static"),
            fingerprint_exclusions: Vec::new(),
            hydration_script_path: DEFAULT_HYDRATION_SCRIPT_PATH.to_string(),
            build_id: BuildFingerprint::generate(),
        }
    }
}
