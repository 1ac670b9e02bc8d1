// src/driver/local.rs

//! Driver running jobs as direct OS subprocesses.
//!
//! Every submitted job gets its own watcher task that spawns the process
//! and waits for either a natural exit or a cancellation request from
//! [`kill`](Driver::kill). Cancellation terminates the whole process group:
//! first SIGTERM, then SIGKILL if the process has not exited within the
//! grace period.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::events::{self, Event, EventQueue, EventSender, JobIndex};

use super::{Driver, DriverFuture, JobSpec};

/// How long a SIGTERM'd process gets before escalation to SIGKILL.
const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Returncode reported when the executable cannot be launched at all.
const SPAWN_FAILED_RETURNCODE: i32 = 127;

/// Watcher-task handle for one in-flight job.
///
/// - `cancel` delivers the kill request to the watcher; it is consumed by
///   the first effective kill, which is what makes repeated kills no-ops.
/// - `handle` is the Tokio task awaiting the process.
struct LocalJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Direct-subprocess backend.
pub struct LocalDriver {
    jobs: Arc<Mutex<HashMap<JobIndex, LocalJob>>>,
    events: EventSender,
    queue: Option<EventQueue>,
    terminate_timeout: Duration,
    shutdown: watch::Sender<bool>,
}

impl LocalDriver {
    pub fn new() -> Self {
        let (events, queue) = events::channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            events,
            queue: Some(queue),
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            shutdown,
        }
    }

    /// Override the SIGTERM grace period (mostly useful in tests).
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for LocalDriver {
    fn submit(&self, iens: JobIndex, spec: JobSpec) -> DriverFuture<'_, Result<()>> {
        Box::pin(async move {
            let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
            let events = self.events.clone();
            let timeout = self.terminate_timeout;

            debug!(iens, executable = %spec.executable.display(), "submitting local job");

            let handle = tokio::spawn(async move {
                run_job(iens, spec, events, cancel_rx, timeout).await;
            });

            let mut jobs = self.jobs.lock().unwrap();
            jobs.insert(
                iens,
                LocalJob {
                    cancel: Some(cancel_tx),
                    handle,
                },
            );
            Ok(())
        })
    }

    fn kill(&self, iens: JobIndex) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let cancel = {
                let mut jobs = self.jobs.lock().unwrap();
                jobs.get_mut(&iens).and_then(|job| job.cancel.take())
            };

            match cancel {
                Some(tx) => {
                    if tx.send(()).is_err() {
                        debug!(iens, "job already finished; kill is a no-op");
                    } else {
                        info!(iens, "termination requested for local job");
                    }
                }
                None => {
                    debug!(iens, "kill for untracked or already-killed job ignored");
                }
            }
        })
    }

    fn poll(&self) -> DriverFuture<'static, ()> {
        // Monitoring happens in the per-job watcher tasks; this loop only
        // has to stay alive until shutdown.
        let mut shutdown = self.shutdown.subscribe();
        Box::pin(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    fn finish(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let handles: Vec<JoinHandle<()>> = {
                let mut jobs = self.jobs.lock().unwrap();
                jobs.drain().map(|(_, job)| job.handle).collect()
            };

            for handle in handles {
                let _ = handle.await;
            }

            let _ = self.shutdown.send(true);
            debug!("local driver finished");
        })
    }

    fn take_event_queue(&mut self) -> Option<EventQueue> {
        self.queue.take()
    }
}

/// Watcher task body for one job: spawn, report, await exit or kill.
async fn run_job(
    iens: JobIndex,
    spec: JobSpec,
    events: EventSender,
    mut cancel_rx: oneshot::Receiver<()>,
    terminate_timeout: Duration,
) {
    let mut cmd = Command::new(&spec.executable);
    cmd.args(&spec.args);
    if let Some(runpath) = &spec.runpath {
        cmd.current_dir(runpath);
    }
    // Own process group, so kill() can signal the job and its children.
    cmd.process_group(0);
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                iens,
                executable = %spec.executable.display(),
                error = %err,
                "could not launch job"
            );
            events.send(Event::Finished {
                iens,
                returncode: SPAWN_FAILED_RETURNCODE,
                aborted: true,
            });
            return;
        }
    };

    events.send(Event::Submitted { iens });
    events.send(Event::Started { iens });

    tokio::select! {
        // Biased so that a process which already exited naturally wins the
        // race against a simultaneous kill request.
        biased;

        status_res = child.wait() => {
            report_natural_exit(iens, status_res, &events);
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    let returncode = terminate(iens, &mut child, terminate_timeout).await;
                    info!(iens, returncode, "local job terminated on request");
                    events.send(Event::Finished {
                        iens,
                        returncode,
                        aborted: true,
                    });
                }
                Err(_) => {
                    // The driver dropped its handle without killing (e.g.
                    // during finish()); keep waiting for the natural exit.
                    let status_res = child.wait().await;
                    report_natural_exit(iens, status_res, &events);
                }
            }
        }
    }
}

fn report_natural_exit(
    iens: JobIndex,
    status_res: std::io::Result<ExitStatus>,
    events: &EventSender,
) {
    match status_res {
        Ok(status) => {
            let returncode = returncode_of(&status);
            debug!(iens, returncode, "local job exited");
            events.send(Event::Finished {
                iens,
                returncode,
                aborted: false,
            });
        }
        Err(err) => {
            warn!(iens, error = %err, "waiting for local job failed");
            events.send(Event::Finished {
                iens,
                returncode: -1,
                aborted: true,
            });
        }
    }
}

/// Terminate `child` with escalation: SIGTERM to the process group, a grace
/// period, then SIGKILL. Returns the final returncode (negative signal
/// number for a signal death).
async fn terminate(iens: JobIndex, child: &mut Child, grace: Duration) -> i32 {
    if let Some(pid) = child.id() {
        let pgid = Pid::from_raw(pid as i32);

        if let Err(err) = signal::killpg(pgid, Signal::SIGTERM) {
            debug!(iens, error = %err, "SIGTERM delivery failed; process group likely gone");
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => return returncode_of(&status),
            Ok(Err(err)) => {
                warn!(iens, error = %err, "waiting for SIGTERM'd job failed");
            }
            Err(_) => {
                warn!(iens, "job survived SIGTERM grace period; escalating to SIGKILL");
                if let Err(err) = signal::killpg(pgid, Signal::SIGKILL) {
                    debug!(iens, error = %err, "SIGKILL delivery failed");
                }
            }
        }
    }

    match child.wait().await {
        Ok(status) => returncode_of(&status),
        Err(err) => {
            warn!(iens, error = %err, "could not reap killed job");
            -(Signal::SIGKILL as i32)
        }
    }
}

/// Exit code for a normal exit, negative signal number for a signal death.
fn returncode_of(status: &ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(0))
}
