// src/driver/mod.rs

//! Pluggable job-driver abstraction.
//!
//! A [`Driver`] owns one execution backend (local subprocesses, an OpenPBS
//! cluster, ...) and exposes the same four capabilities for all of them:
//! submit a job, request a kill, run a perpetual monitoring loop, and shut
//! down. Everything a driver observes is reported through the shared
//! [`EventQueue`](crate::events::EventQueue); the orchestrator never
//! reaches into a driver's internal job tables.
//!
//! - [`local`] runs jobs as direct OS subprocesses.
//! - [`openpbs`] maps jobs onto an OpenPBS batch queue.
//!
//! The trait returns boxed futures instead of using `async fn` so that the
//! orchestrator can hold a `Box<dyn Driver>` and stay agnostic of which
//! backend it is driving.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::config::{DriverConfig, DriverSystem};
use crate::errors::Result;
use crate::events::{EventQueue, JobIndex};

pub mod local;
pub mod openpbs;

pub use local::LocalDriver;
pub use openpbs::OpenPbsDriver;

/// Boxed future returned by [`Driver`] methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What to run for one realization.
///
/// Built with chainable setters:
///
/// ```no_run
/// use jobdrive::driver::JobSpec;
///
/// let spec = JobSpec::new("/usr/bin/env")
///     .arg("sleep")
///     .arg("10")
///     .name("sleeper");
/// ```
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Display name attached to the job where the backend supports one.
    pub name: String,
    /// Working directory hint; not every backend uses it.
    pub runpath: Option<PathBuf>,
}

impl JobSpec {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            name: "dummy".to_string(),
            runpath: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn runpath(mut self, runpath: impl Into<PathBuf>) -> Self {
        self.runpath = Some(runpath.into());
        self
    }
}

/// Capability contract implemented by every execution backend.
pub trait Driver: Send + Sync {
    /// Register and launch the job under `iens`.
    ///
    /// Fails synchronously when the backend rejects the job; in that case
    /// nothing is registered and no event is emitted. Call at most once per
    /// `iens`; a second submit for the same index is not defined.
    fn submit(&self, iens: JobIndex, spec: JobSpec) -> DriverFuture<'_, Result<()>>;

    /// Request termination of the job under `iens`.
    ///
    /// Never fails: an unknown index (already finished, or never submitted)
    /// is a silent no-op, and repeated kills have no effect beyond the
    /// first. The terminal event is delivered through the queue, not here.
    fn kill(&self, iens: JobIndex) -> DriverFuture<'_, ()>;

    /// The driver's perpetual monitoring loop.
    ///
    /// Spawn the returned future as a background task; it idles with zero
    /// outstanding jobs, survives transient backend failures, and returns
    /// only after [`finish`](Driver::finish) raised the shutdown signal.
    fn poll(&self) -> DriverFuture<'static, ()>;

    /// Orderly shutdown: release backend resources and stop the poll loop.
    ///
    /// Events already queued stay queued; the orchestrator can still drain
    /// them afterwards.
    fn finish(&self) -> DriverFuture<'_, ()>;

    /// Hand over the consuming half of the event queue.
    ///
    /// Yields `Some` exactly once; the queue belongs to whoever took it.
    fn take_event_queue(&mut self) -> Option<EventQueue>;
}

/// Construct the driver selected by a validated [`DriverConfig`].
pub fn driver_from_config(config: &DriverConfig) -> Box<dyn Driver> {
    match config.system {
        DriverSystem::Local => {
            Box::new(LocalDriver::new().with_terminate_timeout(config.local.terminate_timeout()))
        }
        DriverSystem::Openpbs => Box::new(OpenPbsDriver::new(config.openpbs.to_options())),
    }
}
