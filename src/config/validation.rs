use std::{
    net::SocketAddr,
    path::{Component, Path},
};

use tracing_subscriber::EnvFilter;

use crate::config::models::FnlyConfig;

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// fnly configuration validator
pub struct FnlyConfigValidator;

impl FnlyConfigValidator {
    /// Validate the entire configuration, reporting every problem at once
    pub fn validate(config: &FnlyConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        for (field, value) in [("api_dir", &config.api_dir), ("out_dir", &config.out_dir)] {
            if value.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: field.to_string(),
                });
            }
        }
        if !config.api_dir.trim().is_empty()
            && Path::new(&config.api_dir) == Path::new(&config.out_dir)
        {
            errors.push(ValidationError::InvalidField {
                field: "out_dir".to_string(),
                message: "must differ from api_dir".to_string(),
            });
        }

        if let Err(mut extension_errors) = Self::validate_extensions(&config.extensions) {
            errors.append(&mut extension_errors);
        }

        if let Err(e) = Self::validate_listen_address(&config.dev.listen_addr) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_api_prefix(&config.dev.api_prefix) {
            errors.push(e);
        }
        if let Err(e) = config.dev.debounce() {
            errors.push(ValidationError::InvalidField {
                field: "dev.debounce".to_string(),
                message: e.to_string(),
            });
        }

        let required = [
            ("dev.runtime_command", &config.dev.runtime_command),
            ("build.runtime", &config.build.runtime),
            ("build.runtime_module", &config.build.runtime_module),
            ("build.bundler.command", &config.build.bundler.command),
            ("build.bundler.target", &config.build.bundler.target),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: field.to_string(),
                });
            }
        }

        if let Err(e) = Self::validate_handler(&config.build.handler) {
            errors.push(e);
        }
        for (field, value) in [
            ("build.manifest_file", &config.build.manifest_file),
            ("build.functions_dir", &config.build.functions_dir),
        ] {
            if let Err(e) = Self::validate_output_name(field, value) {
                errors.push(e);
            }
        }
        if config.build.manifest_file == config.build.functions_dir {
            errors.push(ValidationError::InvalidField {
                field: "build.manifest_file".to_string(),
                message: "must differ from build.functions_dir".to_string(),
            });
        }

        if let Err(e) = EnvFilter::try_new(&config.logging.level) {
            errors.push(ValidationError::InvalidField {
                field: "logging.level".to_string(),
                message: e.to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_api_prefix(prefix: &str) -> ValidationResult<()> {
        let valid = prefix.len() > 1
            && prefix.starts_with('/')
            && !prefix.ends_with('/')
            && !prefix.contains(['*', '{', '}', ':']);
        if valid {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                field: "dev.api_prefix".to_string(),
                message: format!(
                    "'{prefix}' must be a literal path such as '/api' (leading '/', no trailing '/')"
                ),
            })
        }
    }

    fn validate_extensions(extensions: &[String]) -> Result<(), Vec<ValidationError>> {
        if extensions.is_empty() {
            return Err(vec![ValidationError::MissingField {
                field: "extensions".to_string(),
            }]);
        }

        let errors: Vec<_> = extensions
            .iter()
            .filter(|ext| ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| ValidationError::InvalidField {
                field: "extensions".to_string(),
                message: format!("'{ext}' must be a bare extension such as 'ts'"),
            })
            .collect();

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_handler(handler: &str) -> ValidationResult<()> {
        let export = handler.rsplit('.').next().unwrap_or_default();
        let is_identifier = export
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
            && export
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if is_identifier {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                field: "build.handler".to_string(),
                message: format!("'{handler}' must end in an identifier, e.g. 'index.handler'"),
            })
        }
    }

    /// Output names must be plain relative paths inside the output directory.
    fn validate_output_name(field: &str, value: &str) -> ValidationResult<()> {
        let path = Path::new(value);
        let valid = !value.trim().is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if valid {
            Ok(())
        } else {
            Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("'{value}' must be a relative path inside the output directory"),
            })
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
