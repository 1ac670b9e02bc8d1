// src/lib.rs

//! `jobdrive`: submit, monitor, and terminate external compute jobs.
//!
//! The crate is a driver layer between an orchestrator and the execution
//! backends it runs realizations on. Each backend implements the
//! [`Driver`] contract (submit/kill/poll/finish) and reports every state
//! change as an [`Event`] on a shared FIFO [`EventQueue`]:
//!
//! ```no_run
//! use jobdrive::{Driver, JobSpec, LocalDriver};
//!
//! # async fn demo() -> jobdrive::errors::Result<()> {
//! let mut driver = LocalDriver::new();
//! let mut events = driver.take_event_queue().expect("queue taken once");
//! let monitor = tokio::spawn(driver.poll());
//!
//! driver.submit(42, JobSpec::new("/usr/bin/env").arg("true")).await?;
//! while let Some(event) = events.get().await {
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//!
//! driver.finish().await;
//! monitor.await.expect("monitor task");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod errors;
pub mod events;
pub mod logging;

pub use config::{ConfigFile, DriverConfig, DriverSystem};
pub use driver::{Driver, JobSpec, LocalDriver, OpenPbsDriver, driver_from_config};
pub use events::{Event, EventQueue, EventSender, JobIndex};
