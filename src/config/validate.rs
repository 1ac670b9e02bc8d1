// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DriverError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DriverError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.driver))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_local_section(cfg)?;
    validate_openpbs_section(cfg)?;
    Ok(())
}

fn validate_local_section(cfg: &RawConfigFile) -> Result<()> {
    // `system` is strongly typed and validated during deserialization, so
    // only the numeric fields need checking here.

    let timeout = cfg.driver.local.terminate_timeout_secs;
    if !timeout.is_finite() || timeout <= 0.0 {
        return Err(DriverError::ConfigError(format!(
            "[driver.local].terminate_timeout_secs must be > 0 (got {timeout})"
        )));
    }

    Ok(())
}

fn validate_openpbs_section(cfg: &RawConfigFile) -> Result<()> {
    let period = cfg.driver.openpbs.poll_period_secs;
    if !period.is_finite() || period <= 0.0 {
        return Err(DriverError::ConfigError(format!(
            "[driver.openpbs].poll_period_secs must be > 0 (got {period})"
        )));
    }

    if let Some(queue_name) = &cfg.driver.openpbs.queue_name {
        if queue_name.trim().is_empty() {
            return Err(DriverError::ConfigError(
                "[driver.openpbs].queue_name must not be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}
