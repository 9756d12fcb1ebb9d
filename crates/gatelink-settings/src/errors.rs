//! Errors raised while loading or validating [`GatelinkSettings`](crate::GatelinkSettings).

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not JSON, or a field has the wrong type.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// The built-in defaults failed to serialize.
    #[error("settings defaults: {0}")]
    Defaults(#[source] serde_json::Error),
    /// A field holds a value the client cannot run with.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Dotted JSON path of the field, e.g. `requests.timeoutMs`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Field name for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/gatelink.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "cannot read /etc/gatelink.json: denied");
        assert!(err.source().is_some());
        assert_eq!(err.field(), None);
    }

    #[test]
    fn parse_error_names_the_file() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = SettingsError::Parse {
            path: PathBuf::from("settings.json"),
            source,
        };
        assert!(err.to_string().starts_with("cannot parse settings.json: "));
    }

    #[test]
    fn validation_error_carries_field() {
        let err = SettingsError::invalid("reconnect.multiplier", "must be >= 1, got 0.5");
        assert_eq!(err.field(), Some("reconnect.multiplier"));
        assert_eq!(
            err.to_string(),
            "invalid reconnect.multiplier: must be >= 1, got 0.5"
        );
    }
}
