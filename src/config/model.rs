// src/config/model.rs

//! Serde model for the driver configuration file.
//!
//! ```toml
//! [driver]
//! system = "openpbs"
//!
//! [driver.openpbs]
//! queue_name = "hpc"
//! poll_period_secs = 2.0
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::driver::openpbs::OpenPbsOptions;

/// Which execution backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverSystem {
    Local,
    Openpbs,
}

impl Default for DriverSystem {
    fn default() -> Self {
        DriverSystem::Local
    }
}

impl FromStr for DriverSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(DriverSystem::Local),
            "openpbs" => Ok(DriverSystem::Openpbs),
            other => Err(format!(
                "invalid driver system: {other} (expected \"local\" or \"openpbs\")"
            )),
        }
    }
}

/// Options for the local subprocess backend.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSection {
    /// SIGTERM grace period before escalation to SIGKILL.
    #[serde(default = "default_terminate_timeout_secs")]
    pub terminate_timeout_secs: f64,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            terminate_timeout_secs: default_terminate_timeout_secs(),
        }
    }
}

impl LocalSection {
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.terminate_timeout_secs)
    }
}

/// Options for the OpenPBS backend.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenPbsSection {
    /// Target queue (`qsub -q`); the cluster default queue when absent.
    #[serde(default)]
    pub queue_name: Option<String>,

    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: f64,

    /// Overrides for the cluster commands, for site wrappers and tests.
    #[serde(default)]
    pub qsub: Option<PathBuf>,
    #[serde(default)]
    pub qstat: Option<PathBuf>,
    #[serde(default)]
    pub qdel: Option<PathBuf>,
}

impl Default for OpenPbsSection {
    fn default() -> Self {
        Self {
            queue_name: None,
            poll_period_secs: default_poll_period_secs(),
            qsub: None,
            qstat: None,
            qdel: None,
        }
    }
}

impl OpenPbsSection {
    pub fn to_options(&self) -> OpenPbsOptions {
        let defaults = OpenPbsOptions::default();
        OpenPbsOptions {
            queue_name: self.queue_name.clone(),
            poll_period: Duration::from_secs_f64(self.poll_period_secs),
            qsub: self.qsub.clone().unwrap_or(defaults.qsub),
            qstat: self.qstat.clone().unwrap_or(defaults.qstat),
            qdel: self.qdel.clone().unwrap_or(defaults.qdel),
        }
    }
}

/// The `[driver]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub system: DriverSystem,
    #[serde(default)]
    pub local: LocalSection,
    #[serde(default)]
    pub openpbs: OpenPbsSection,
}

/// The configuration file exactly as deserialized, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub driver: DriverConfig,
}

/// A configuration file that passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub driver: DriverConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(driver: DriverConfig) -> Self {
        Self { driver }
    }
}

fn default_terminate_timeout_secs() -> f64 {
    10.0
}

fn default_poll_period_secs() -> f64 {
    2.0
}
