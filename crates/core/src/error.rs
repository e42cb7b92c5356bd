//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid structure: {0} (expected \"file\" or \"file+expansion\")")]
    InvalidStructure(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("structure \"file+expansion\" requires an expansion file")]
    MissingExpansionFile,

    #[error("invalid upload plan: {0}")]
    InvalidPlan(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
