// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Prefix of every variable Islet reads, e.g. `ISLET_STATIC_DIR`.
pub const ENV_PREFIX: &str = "ISLET";

/// Reads prefixed variables from the process environment or a fixed map.
pub struct EnvLoader {
    prefix: Option<String>,
    vars: Option<HashMap<String, String>>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix, vars: None }
    }

    /// Loader over an explicit variable set instead of the process environment.
    pub fn from_vars<I, K, V>(prefix: Option<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix,
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    fn vars(&self) -> Vec<(String, String)> {
        match &self.vars {
            Some(vars) => vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => env::vars().collect(),
        }
    }

    /// Matching variables with the prefix stripped and the key lowercased.
    pub fn load(&self) -> HashMap<String, String> {
        self.vars()
            .into_iter()
            .filter_map(|(key, value)| {
                let key = match &self.prefix {
                    Some(prefix) => key.strip_prefix(prefix.as_str())?.strip_prefix('_')?.to_string(),
                    None => key,
                };
                Some((key.to_lowercase(), value))
            })
            .collect()
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };

        match &self.vars {
            Some(vars) => vars
                .get(&full_key)
                .cloned()
                .ok_or(ConfigError::EnvError(env::VarError::NotPresent)),
            None => env::var(&full_key).map_err(ConfigError::EnvError),
        }
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(ENV_PREFIX.to_string()))
    }
}
