// Configuration validation

use crate::{ConfigError, Result};
use truss_core::AppOptions;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    pub fn at_least<T: PartialOrd + std::fmt::Display>(value: T, min: T, field: &str) -> Result<()> {
        if value < min {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least {}",
                field, min
            )));
        }
        Ok(())
    }

    pub fn is_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "{} must start with '/'",
                field
            )));
        }
        Ok(())
    }

    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a valid port number",
                field
            )));
        }
        Ok(())
    }
}

impl Validate for AppOptions {
    fn validate(&self) -> Result<()> {
        ConfigValidator::at_least(self.version, 1, "version")?;
        ConfigValidator::is_path(&self.prefix, "prefix")?;
        ConfigValidator::not_empty(&self.host, "host")?;
        ConfigValidator::is_port(self.port, "port")?;
        ConfigValidator::at_least(self.body_limit, 1, "body_limit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules() {
        assert!(ConfigValidator::not_empty("value", "field").is_ok());
        assert!(ConfigValidator::not_empty("", "field").is_err());
        assert!(ConfigValidator::at_least(5, 1, "field").is_ok());
        assert!(ConfigValidator::at_least(0, 1, "field").is_err());
        assert!(ConfigValidator::is_path("/api", "field").is_ok());
        assert!(ConfigValidator::is_path("api", "field").is_err());
        assert!(ConfigValidator::is_port(8080, "field").is_ok());
        assert!(ConfigValidator::is_port(0, "field").is_err());
    }

    #[test]
    fn test_default_options_are_valid() {
        assert!(AppOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_options() {
        let cases = [
            AppOptions {
                version: 0,
                ..AppOptions::default()
            },
            AppOptions {
                prefix: "api".to_string(),
                ..AppOptions::default()
            },
            AppOptions {
                port: 0,
                ..AppOptions::default()
            },
            AppOptions {
                body_limit: 0,
                ..AppOptions::default()
            },
        ];

        for options in cases {
            let err = options.validate().unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{:?}", options);
        }
    }
}
