// src/config/mod.rs

//! Driver configuration: TOML model, loading, validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigFile, DriverConfig, DriverSystem, LocalSection, OpenPbsSection, RawConfigFile};
