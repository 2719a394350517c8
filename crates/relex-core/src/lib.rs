//! Relex Core - Error types, interned symbols and configuration
//!
//! This crate defines the shared building blocks of the relation extractor:
//! - Error taxonomy (configuration, malformed input, internal consistency)
//! - Interned labels (`Symbol`) and the reserved symbol vocabulary
//! - Configuration management (TOML files with environment overrides)

pub mod config;
pub mod symbol;

pub use config::{
    AltModelSpec, ConfigError, Language, LoggingConfig, ModelConfig, ObservationConfig, RelexConfig,
    ResourceConfig, StopCriterion, TrainMode, TrainerConfig,
};
pub use symbol::{symbols, Symbol};

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for relation extraction
#[derive(Error, Debug)]
pub enum RelexError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid Relation Type: {0}")]
    InvalidRelationType(String),

    #[error("Given relation type cannot be a relation arg: {0}")]
    InvalidRelationArg(String),

    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelexError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that point at a bug in an upstream collaborator
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalInconsistency(_))
    }
}

impl From<ConfigError> for RelexError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_offending_token() {
        let err = RelexError::InvalidRelationType("EMP-ORG".to_string());
        assert_eq!(err.to_string(), "Invalid Relation Type: EMP-ORG");

        let err = RelexError::InvalidRelationArg("TIME".to_string());
        assert!(err.to_string().contains("TIME"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RelexError = ConfigError::MissingRequired("relation_train_mode".to_string()).into();
        assert!(matches!(err, RelexError::Config(_)));
        assert!(err.to_string().contains("relation_train_mode"));
        assert!(!err.is_internal());
    }
}
