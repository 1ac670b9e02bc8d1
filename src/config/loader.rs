// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (positive periods, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the embedding application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks that timeouts and poll periods are positive and that a queue
///   name, when set, is not blank.
///
/// The result can be handed straight to
/// [`driver_from_config`](crate::driver::driver_from_config).
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}
