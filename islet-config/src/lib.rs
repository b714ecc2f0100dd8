//! Configuration loading for Islet.
//!
//! Sources are merged in the order they are loaded, later ones winning:
//!
//! ```no_run
//! use islet_config::ConfigManager;
//!
//! # fn main() -> islet_config::Result<()> {
//! let config = ConfigManager::new()
//!     .load_file("islet.toml")?
//!     .load_dotenv(None)?
//!     .load_env()
//!     .build()?;
//!
//! let _guard = config.log_config()?.init();
//! let options = config.server_options();
//! # let _ = options;
//! # Ok(())
//! # }
//! ```
//!
//! Recognized keys (file key / environment variable):
//!
//! | key                      | variable                       | default              |
//! |--------------------------|--------------------------------|----------------------|
//! | `static_dir`             | `ISLET_STATIC_DIR`             | `static`             |
//! | `hydration_script_path`  | `ISLET_HYDRATION_SCRIPT_PATH`  | `/_islet/hydrate.js` |
//! | `build_id`               | `ISLET_BUILD_ID`               | random per process   |
//! | `fingerprint_exclusions` | `ISLET_FINGERPRINT_EXCLUSIONS` | none (comma list)    |
//! | `log_level`              | `ISLET_LOG_LEVEL`              | `info`               |
//! | `log_format`             | `ISLET_LOG_FORMAT`             | `json`               |

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::{ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use islet_core::options::DEFAULT_HYDRATION_SCRIPT_PATH;
use islet_core::{LogConfig, LogFormat, LogLevel, ServerOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];
const LOG_FORMATS: &[&str] = &["json", "plain", "pretty", "compact"];

/// Settings recognized by Islet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsletConfig {
    pub static_dir: String,
    pub hydration_script_path: String,
    /// Fixed build fingerprint; generated at startup when absent.
    pub build_id: Option<String>,
    pub fingerprint_exclusions: Vec<String>,
    pub log_level: String,
    pub log_format: String,
}

impl Default for IsletConfig {
    fn default() -> Self {
        Self {
            static_dir: "static".to_string(),
            hydration_script_path: DEFAULT_HYDRATION_SCRIPT_PATH.to_string(),
            build_id: None,
            fingerprint_exclusions: Vec::new(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Validate for IsletConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.static_dir, "static_dir")?;
        ConfigValidator::url_path(&self.hydration_script_path, "hydration_script_path")?;
        if let Some(build_id) = &self.build_id {
            ConfigValidator::not_empty(build_id, "build_id")?;
        }
        for path in &self.fingerprint_exclusions {
            ConfigValidator::url_path(path, "fingerprint_exclusions")?;
        }
        ConfigValidator::one_of(&self.log_level, LOG_LEVELS, "log_level")?;
        ConfigValidator::one_of(&self.log_format, LOG_FORMATS, "log_format")?;
        Ok(())
    }
}

impl IsletConfig {
    /// Defaults, `.env` and `ISLET_*` variables.
    pub fn from_env() -> Result<Self> {
        ConfigManager::new().load_dotenv(None)?.load_env().build()
    }

    /// Options for [`Dispatcher::build`](islet_core::Dispatcher::build).
    pub fn server_options(&self) -> ServerOptions {
        let options = ServerOptions::new()
            .with_static_dir(&self.static_dir)
            .with_hydration_script_path(&self.hydration_script_path);
        let options = match &self.build_id {
            Some(build_id) => options.with_build_id(build_id),
            None => options,
        };
        self.fingerprint_exclusions
            .iter()
            .fold(options, |options, path| options.exclude_from_fingerprint(path.clone()))
    }

    pub fn log_config(&self) -> Result<LogConfig> {
        let level = LogLevel::from_str(&self.log_level)
            .ok_or_else(|| ConfigError::invalid("log_level", self.log_level.clone()))?;
        let format = LogFormat::from_str(&self.log_format)
            .ok_or_else(|| ConfigError::invalid("log_format", self.log_format.clone()))?;
        Ok(LogConfig::new().level(level).format(format))
    }
}

/// Merges configuration sources into one flat key space.
pub struct ConfigManager {
    values: Map<String, Value>,
    env: EnvLoader,
}

impl ConfigManager {
    /// Manager reading `ISLET_*` variables from the process environment.
    pub fn new() -> Self {
        Self::with_env(EnvLoader::default())
    }

    pub fn with_env(env: EnvLoader) -> Self {
        Self {
            values: Map::new(),
            env,
        }
    }

    /// Merge a JSON, TOML or `.env` file, detected from its extension.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self> {
        let path = path.as_ref();
        let loaded = ConfigLoader::auto(path)?.load_file(path)?;
        self.values.extend(loaded);
        Ok(self)
    }

    /// Merge the `ISLET_*` entries of a `.env` file.
    ///
    /// With no path, `./.env` is used if it exists.
    pub fn load_dotenv(&mut self, path: Option<&Path>) -> Result<&mut Self> {
        let path = match path {
            Some(path) => path,
            None if Path::new(".env").is_file() => Path::new(".env"),
            None => return Ok(self),
        };

        let prefix = format!("{}_", ENV_PREFIX.to_lowercase());
        let loaded = ConfigLoader::new(FileFormat::Env).load_file(path)?;
        for (key, value) in loaded {
            if let Some(key) = key.strip_prefix(&prefix) {
                self.values.insert(key.to_string(), value);
            }
        }
        Ok(self)
    }

    /// Merge `ISLET_*` environment variables.
    pub fn load_env(&mut self) -> &mut Self {
        for (key, value) in self.env.load() {
            self.values.insert(key, Value::String(value));
        }
        self
    }

    /// Set a configuration value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value =
            serde_json::to_value(value).map_err(|e| ConfigError::SerializationError(e.to_string()))?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Check if a key exists
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    /// Deserialize and validate the merged values.
    pub fn build(&self) -> Result<IsletConfig> {
        let mut values = self.values.clone();
        // Environment sources can only carry lists as comma separated strings.
        if let Some(Value::String(list)) = values.get("fingerprint_exclusions") {
            let items = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect();
            values.insert("fingerprint_exclusions".to_string(), Value::Array(items));
        }

        let config: IsletConfig = serde_json::from_value(Value::Object(values))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
