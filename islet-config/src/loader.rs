// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    /// `KEY=value` lines in `.env` syntax
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Detect the format of `path`; a bare `.env` file name counts as [`FileFormat::Env`].
    pub fn detect(path: &Path) -> Option<Self> {
        if path.file_name().and_then(|n| n.to_str()) == Some(".env") {
            return Some(FileFormat::Env);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Reads one configuration source into a flat JSON object.
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::detect(path).ok_or_else(|| {
            ConfigError::load(path.display(), "unsupported or missing file extension")
        })?;
        Ok(Self::new(format))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Map<String, Value>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::load(path.display(), e))?;
        self.parse(&content)
    }

    /// Parse configuration text; the top level must be a table/object.
    pub fn parse(&self, content: &str) -> Result<Map<String, Value>> {
        let value = match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))?,
            FileFormat::Toml => parse_toml(content)?,
            FileFormat::Env => parse_env(content)?,
        };

        match value {
            Value::Object(map) => Ok(map),
            other => Err(ConfigError::ParseError(format!(
                "expected a table at the top level, found {}",
                other
            ))),
        }
    }
}

fn parse_toml(content: &str) -> Result<Value> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
    serde_json::to_value(table).map_err(|e| ConfigError::SerializationError(e.to_string()))
}

/// Keys are lowercased so `STATIC_DIR=...` and `static_dir = ...` agree.
fn parse_env(content: &str) -> Result<Value> {
    let mut map = Map::new();
    for item in dotenvy::from_read_iter(content.as_bytes()) {
        let (key, value) =
            item.map_err(|e| ConfigError::ParseError(format!(".env parse error: {}", e)))?;
        map.insert(key.to_lowercase(), Value::String(value));
    }
    Ok(Value::Object(map))
}
