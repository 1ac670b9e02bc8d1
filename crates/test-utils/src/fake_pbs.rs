//! Shell doubles for the OpenPBS commands.
//!
//! [`FakePbs::install`] drops `qsub`/`qstat`/`qdel` scripts into a
//! caller-owned directory. The scripts log every invocation next to
//! themselves and answer from files the test controls, so the OpenPBS
//! driver can be exercised end-to-end without a cluster:
//!
//! - `qsub` appends its arguments (one per line) to `qsub.log` and prints
//!   the contents of `job_id` (default `1.fake`).
//! - `qstat` appends one line per invocation to `qstat.log` and prints the
//!   contents of `qstat_response.json`.
//! - `qdel` appends its arguments to `qdel.log`.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobdrive::driver::openpbs::OpenPbsOptions;

const QSUB_SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
for arg in "$@"; do printf '%s\n' "$arg"; done >> "$dir/qsub.log"
if [ -f "$dir/job_id" ]; then cat "$dir/job_id"; else echo "1.fake"; fi
"#;

const QSTAT_SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
printf '%s\n' "$*" >> "$dir/qstat.log"
cat "$dir/qstat_response.json"
"#;

const QDEL_SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
printf '%s\n' "$*" >> "$dir/qdel.log"
"#;

pub struct FakePbs {
    dir: PathBuf,
}

impl FakePbs {
    /// Write the three command scripts into `dir` and seed an empty
    /// status document.
    pub fn install(dir: &Path) -> io::Result<Self> {
        let fake = Self {
            dir: dir.to_path_buf(),
        };
        fake.write_script("qsub", QSUB_SCRIPT)?;
        fake.write_script("qstat", QSTAT_SCRIPT)?;
        fake.write_script("qdel", QDEL_SCRIPT)?;
        fake.set_status(r#"{"Jobs": {}}"#)?;
        Ok(fake)
    }

    /// Driver options pointing at the fake commands, with a poll period
    /// short enough for tests.
    pub fn options(&self) -> OpenPbsOptions {
        OpenPbsOptions {
            poll_period: Duration::from_millis(50),
            qsub: self.dir.join("qsub"),
            qstat: self.dir.join("qstat"),
            qdel: self.dir.join("qdel"),
            ..OpenPbsOptions::default()
        }
    }

    /// Replace the document the fake `qstat` answers with.
    pub fn set_status(&self, json: &str) -> io::Result<()> {
        fs::write(self.dir.join("qstat_response.json"), json)
    }

    /// Set the job id the next `qsub` invocation reports.
    pub fn set_next_job_id(&self, job_id: &str) -> io::Result<()> {
        fs::write(self.dir.join("job_id"), format!("{job_id}\n"))
    }

    /// All arguments `qsub` has seen so far, one entry per argument.
    pub fn qsub_args(&self) -> Vec<String> {
        self.read_log("qsub.log")
    }

    /// One entry per `qdel` invocation (the arguments, space-joined).
    pub fn qdel_calls(&self) -> Vec<String> {
        self.read_log("qdel.log")
    }

    /// How many times `qstat` has been invoked.
    pub fn qstat_calls(&self) -> usize {
        self.read_log("qstat.log").len()
    }

    fn write_script(&self, name: &str, contents: &str) -> io::Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, contents)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    fn read_log(&self, name: &str) -> Vec<String> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }
}
