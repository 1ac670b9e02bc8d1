// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::events::JobIndex;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to submit job {iens}: {reason}")]
    Submit { iens: JobIndex, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed queue status response: {0}")]
    StatusParse(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DriverError>;
