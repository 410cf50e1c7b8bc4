//! Error types for hostkit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate identifier: {0}")]
    Duplicate(String),

    #[error("invalid build specification: {0}")]
    InvalidBuildSpec(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unresolved reference: {0}")]
    Unresolved(String),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
