// tests/config_loading.rs

//! Configuration loading and validation.

use std::time::Duration;

use jobdrive::config::{load_and_validate, DriverSystem};
use jobdrive::driver::driver_from_config;
use jobdrive::errors::DriverError;
use jobdrive_test_utils::init_tracing;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("Jobdrive.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[test]
fn empty_config_falls_back_to_the_local_driver_defaults() {
    init_tracing();

    let (_dir, path) = write_config("");
    let config = load_and_validate(&path).expect("load");

    assert_eq!(config.driver.system, DriverSystem::Local);
    assert_eq!(
        config.driver.local.terminate_timeout(),
        Duration::from_secs(10)
    );
    assert_eq!(
        config.driver.openpbs.to_options().poll_period,
        Duration::from_secs(2)
    );
}

#[test]
fn openpbs_section_is_picked_up() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver]
        system = "openpbs"

        [driver.openpbs]
        queue_name = "hpc"
        poll_period_secs = 0.5
        qstat = "/opt/pbs/bin/qstat"
        "#,
    );
    let config = load_and_validate(&path).expect("load");

    assert_eq!(config.driver.system, DriverSystem::Openpbs);
    let options = config.driver.openpbs.to_options();
    assert_eq!(options.queue_name.as_deref(), Some("hpc"));
    assert_eq!(options.poll_period, Duration::from_millis(500));
    assert_eq!(options.qstat, std::path::PathBuf::from("/opt/pbs/bin/qstat"));
    assert_eq!(options.qsub, std::path::PathBuf::from("qsub"));
}

#[test]
fn non_positive_poll_period_is_rejected() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver.openpbs]
        poll_period_secs = 0.0
        "#,
    );

    match load_and_validate(&path) {
        Err(DriverError::ConfigError(msg)) => {
            assert!(msg.contains("poll_period_secs"));
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn non_positive_terminate_timeout_is_rejected() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver.local]
        terminate_timeout_secs = -1.0
        "#,
    );

    match load_and_validate(&path) {
        Err(DriverError::ConfigError(msg)) => {
            assert!(msg.contains("terminate_timeout_secs"));
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn blank_queue_name_is_rejected() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver.openpbs]
        queue_name = "  "
        "#,
    );

    match load_and_validate(&path) {
        Err(DriverError::ConfigError(msg)) => {
            assert!(msg.contains("queue_name"));
        }
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn driver_system_parses_from_str() {
    assert_eq!("OpenPBS".parse::<DriverSystem>(), Ok(DriverSystem::Openpbs));
    assert_eq!("local".parse::<DriverSystem>(), Ok(DriverSystem::Local));
    assert!("slurm".parse::<DriverSystem>().is_err());
}

#[test]
fn unknown_driver_system_is_a_toml_error() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver]
        system = "slurm"
        "#,
    );

    assert!(matches!(
        load_and_validate(&path),
        Err(DriverError::TomlError(_))
    ));
}

#[tokio::test]
async fn the_factory_builds_a_usable_driver() {
    init_tracing();

    let (_dir, path) = write_config(
        r#"
        [driver]
        system = "local"
        "#,
    );
    let config = load_and_validate(&path).expect("load");

    let mut driver = driver_from_config(&config.driver);
    let events = driver.take_event_queue();
    assert!(events.is_some());
    assert!(driver.take_event_queue().is_none());
}
