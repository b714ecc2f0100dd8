// Configuration validation

use crate::{ConfigError, Result};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable field checks
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    /// An absolute URL path without query or fragment, e.g. `/_islet/hydrate.js`.
    pub fn url_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') || value.starts_with("//") {
            return Err(ConfigError::invalid(field, format!("{:?} must start with a single '/'", value)));
        }
        if value.contains(['?', '#']) {
            return Err(ConfigError::invalid(field, format!("{:?} must not contain '?' or '#'", value)));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values (case-insensitive)
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
            return Err(ConfigError::invalid(
                field,
                format!("{:?} must be one of {}", value, allowed.join(", ")),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty_validation() {
        assert!(ConfigValidator::not_empty("static", "static_dir").is_ok());
        assert!(ConfigValidator::not_empty("  ", "static_dir").is_err());
    }

    #[test]
    fn test_url_path_validation() {
        assert!(ConfigValidator::url_path("/_islet/hydrate.js", "p").is_ok());
        assert!(ConfigValidator::url_path("hydrate.js", "p").is_err());
        assert!(ConfigValidator::url_path("//cdn/hydrate.js", "p").is_err());
        assert!(ConfigValidator::url_path("/hydrate.js?v=1", "p").is_err());
    }

    #[test]
    fn test_one_of_validation() {
        let allowed = ["json", "plain"];
        assert!(ConfigValidator::one_of("JSON", &allowed, "log_format").is_ok());
        let err = ConfigValidator::one_of("xml", &allowed, "log_format").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for log_format: \"xml\" must be one of json, plain"
        );
    }
}
