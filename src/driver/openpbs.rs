// src/driver/openpbs.rs

//! Driver running jobs on an OpenPBS / PBS Pro batch queue.
//!
//! Jobs are handed to the cluster with `qsub`, cancelled with `qdel`, and
//! observed through a periodic batched `qstat -fxFjson` query. The driver
//! keeps the mapping between realization indices and PBS job ids; state
//! changes reported by `qstat` are translated into [`Event`]s.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::{DriverError, Result};
use crate::events::{self, Event, EventQueue, EventSender, JobIndex};

use super::{Driver, DriverFuture, JobSpec};

const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(2);

/// OpenPBS encodes a job terminated by the queue system (killed, or dying
/// to a signal) as 256 + signal number. Backend-specific policy, not part
/// of the shared event model.
const ABNORMAL_RETURNCODE: i32 = 256;

/// Construction-time options for [`OpenPbsDriver`].
///
/// The command paths default to the bare `qsub`/`qstat`/`qdel` names so the
/// cluster's own PATH decides; overriding them enables site wrappers and
/// test doubles.
#[derive(Debug, Clone)]
pub struct OpenPbsOptions {
    /// Target queue (`qsub -q`); the cluster default queue when absent.
    pub queue_name: Option<String>,
    pub poll_period: Duration,
    pub qsub: PathBuf,
    pub qstat: PathBuf,
    pub qdel: PathBuf,
}

impl Default for OpenPbsOptions {
    fn default() -> Self {
        Self {
            queue_name: None,
            poll_period: DEFAULT_POLL_PERIOD,
            qsub: PathBuf::from("qsub"),
            qstat: PathBuf::from("qstat"),
            qdel: PathBuf::from("qdel"),
        }
    }
}

/// Last state reported by `qstat` for a tracked job. Terminal jobs are
/// dropped from the tables instead of getting a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PbsState {
    Queued,
    Held,
    Running,
}

struct TrackedJob {
    iens: JobIndex,
    state: PbsState,
}

/// Both lookup directions for the driver's jobs. Only ever touched by this
/// driver's own tasks; the lock is never held across an await.
#[derive(Default)]
struct JobTables {
    by_job_id: HashMap<String, TrackedJob>,
    job_id_by_iens: HashMap<JobIndex, String>,
}

/// One job out of a `qstat -fxFjson` document, discriminated on the
/// `job_state` tag. Only finished jobs carry an exit status. Any other
/// state letter makes the document malformed, which fails the poll cycle
/// without crashing the loop.
#[derive(Debug, Deserialize)]
#[serde(tag = "job_state")]
enum QstatJob {
    #[serde(rename = "F")]
    Finished {
        #[serde(rename = "Exit_status")]
        exit_status: i32,
    },
    #[serde(rename = "H")]
    Held,
    #[serde(rename = "Q")]
    Queued,
    #[serde(rename = "R")]
    Running,
}

#[derive(Debug, Deserialize)]
struct QstatPayload {
    #[serde(rename = "Jobs")]
    jobs: HashMap<String, QstatJob>,
}

/// OpenPBS batch-queue backend.
pub struct OpenPbsDriver {
    options: OpenPbsOptions,
    jobs: Arc<Mutex<JobTables>>,
    events: EventSender,
    queue: Option<EventQueue>,
    shutdown: watch::Sender<bool>,
}

impl OpenPbsDriver {
    pub fn new(options: OpenPbsOptions) -> Self {
        let (events, queue) = events::channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            jobs: Arc::new(Mutex::new(JobTables::default())),
            events,
            queue: Some(queue),
            shutdown,
        }
    }
}

impl Driver for OpenPbsDriver {
    fn submit(&self, iens: JobIndex, spec: JobSpec) -> DriverFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut cmd = Command::new(&self.options.qsub);
            cmd.arg("-koe") // discard the job's stdout/stderr at the queue layer
                .arg("-rn") // don't restart on failure
                .arg(format!("-N{}", spec.name));
            if let Some(queue_name) = &self.options.queue_name {
                cmd.arg("-q").arg(queue_name);
            }
            cmd.arg("--").arg(&spec.executable).args(&spec.args);

            debug!(iens, executable = %spec.executable.display(), "submitting to PBS");

            let output = cmd.output().await.map_err(|err| DriverError::Submit {
                iens,
                reason: format!("could not run qsub: {err}"),
            })?;

            if !output.status.success() {
                return Err(DriverError::Submit {
                    iens,
                    reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let job_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if job_id.is_empty() {
                return Err(DriverError::Submit {
                    iens,
                    reason: "qsub reported no job id".to_string(),
                });
            }

            info!(iens, job_id = %job_id, "job accepted by PBS");

            {
                let mut tables = self.jobs.lock().unwrap();
                tables.by_job_id.insert(
                    job_id.clone(),
                    TrackedJob {
                        iens,
                        state: PbsState::Queued,
                    },
                );
                tables.job_id_by_iens.insert(iens, job_id);
            }
            self.events.send(Event::Submitted { iens });
            Ok(())
        })
    }

    fn kill(&self, iens: JobIndex) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let job_id = {
                let tables = self.jobs.lock().unwrap();
                tables.job_id_by_iens.get(&iens).cloned()
            };

            let Some(job_id) = job_id else {
                debug!(iens, "kill for untracked job ignored");
                return;
            };

            // qdel only requests the cancellation; the actual termination
            // shows up as a finished job in a later qstat cycle.
            info!(iens, job_id = %job_id, "cancelling PBS job");
            match Command::new(&self.options.qdel).arg(&job_id).output().await {
                Ok(output) if !output.status.success() => {
                    warn!(
                        iens,
                        job_id = %job_id,
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "qdel failed"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(iens, job_id = %job_id, error = %err, "could not run qdel");
                }
            }
        })
    }

    fn poll(&self) -> DriverFuture<'static, ()> {
        let jobs = Arc::clone(&self.jobs);
        let events = self.events.clone();
        let options = self.options.clone();
        let mut shutdown = self.shutdown.subscribe();

        Box::pin(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let tracked_ids: Vec<String> = {
                    let tables = jobs.lock().unwrap();
                    tables.by_job_id.keys().cloned().collect()
                };

                // With nothing tracked there is nothing to ask the batch
                // system; just sleep out the period.
                if !tracked_ids.is_empty() {
                    if let Err(err) = poll_cycle(&options, &tracked_ids, &jobs, &events).await {
                        warn!(error = %err, "qstat poll cycle failed; retrying next period");
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(options.poll_period) => {}
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn finish(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.shutdown.send(true);
            debug!("PBS driver finished");
        })
    }

    fn take_event_queue(&mut self) -> Option<EventQueue> {
        self.queue.take()
    }
}

/// One batched status query and the resulting state transitions.
async fn poll_cycle(
    options: &OpenPbsOptions,
    tracked_ids: &[String],
    jobs: &Arc<Mutex<JobTables>>,
    events: &EventSender,
) -> Result<()> {
    let output = Command::new(&options.qstat)
        .arg("-fxFjson")
        .args(tracked_ids)
        .output()
        .await?;

    // qstat errors per-job on ids it has purged while still reporting the
    // rest, so the document is parsed regardless of the exit status.
    let payload: QstatPayload = serde_json::from_slice(&output.stdout)?;

    let mut to_emit = Vec::new();
    {
        let mut tables = jobs.lock().unwrap();
        for (job_id, remote) in &payload.jobs {
            let Some(tracked) = tables.by_job_id.get_mut(job_id) else {
                // Finished earlier, or foreign to this driver instance.
                continue;
            };
            let iens = tracked.iens;

            match remote {
                // No event for waiting states; recording them avoids
                // re-comparing the same report next cycle.
                QstatJob::Queued => tracked.state = PbsState::Queued,
                QstatJob::Held => tracked.state = PbsState::Held,
                QstatJob::Running => {
                    if tracked.state != PbsState::Running {
                        tracked.state = PbsState::Running;
                        debug!(iens, job_id = %job_id, "PBS job is running");
                        to_emit.push(Event::Started { iens });
                    }
                }
                QstatJob::Finished { exit_status } => {
                    let returncode = *exit_status;
                    let aborted = returncode >= ABNORMAL_RETURNCODE;
                    if aborted {
                        warn!(iens, job_id = %job_id, returncode, "PBS job failed");
                    } else {
                        info!(iens, job_id = %job_id, returncode, "PBS job succeeded");
                    }
                    // Terminal: stop polling this job.
                    tables.by_job_id.remove(job_id);
                    tables.job_id_by_iens.remove(&iens);
                    to_emit.push(Event::Finished {
                        iens,
                        returncode,
                        aborted,
                    });
                }
            }
        }
    }

    for event in to_emit {
        events.send(event);
    }
    Ok(())
}
