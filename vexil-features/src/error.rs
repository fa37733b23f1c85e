//! Feature flag error types

use std::fmt;
use thiserror::Error;

/// What kind of entity a lookup was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Flag,
    Experiment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Flag => write!(f, "Flag"),
            EntityKind::Experiment => write!(f, "Experiment"),
        }
    }
}

/// Errors raised at definition time.
///
/// Evaluation never produces one of these; bad input there is absorbed as
/// a disabled result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// Flag or experiment key is absent
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    /// A probability or tuning value is out of range
    #[error("Invalid {name} {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeatureError {
    pub(crate) fn flag_not_found(key: &str) -> Self {
        FeatureError::NotFound {
            kind: EntityKind::Flag,
            key: key.to_string(),
        }
    }

    pub(crate) fn experiment_not_found(key: &str) -> Self {
        FeatureError::NotFound {
            kind: EntityKind::Experiment,
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid(name: &'static str, value: impl fmt::Display, reason: &'static str) -> Self {
        FeatureError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

impl From<toml::de::Error> for FeatureError {
    fn from(err: toml::de::Error) -> Self {
        FeatureError::Config(err.to_string())
    }
}

impl From<std::io::Error> for FeatureError {
    fn from(err: std::io::Error) -> Self {
        FeatureError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            FeatureError::flag_not_found("new_ui").to_string(),
            "Flag not found: new_ui"
        );
        assert_eq!(
            FeatureError::experiment_not_found("exp-3").to_string(),
            "Experiment not found: exp-3"
        );
        assert_eq!(
            FeatureError::invalid("split", 1.5, "must be within [0, 1]").to_string(),
            "Invalid split 1.5: must be within [0, 1]"
        );
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err = toml::from_str::<toml::Table>("not = [valid").unwrap_err();
        assert!(matches!(FeatureError::from(err), FeatureError::Config(_)));
    }
}
