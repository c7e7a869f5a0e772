//! Background job registry
//!
//! Jobs are added by a background `exec` and removed by `wait`, both on the
//! script's own thread; the collector threads never touch the registry.

use std::time::Duration;

use crate::error::{ErrorKind, ScriptError};
use crate::process::{ProcessOutput, ProcessTask};

/// A named background process waiting to be joined by `wait`.
pub struct BackgroundJob {
    /// Unique name among live jobs
    pub name: String,
    /// Program and arguments (for logging)
    pub args: Vec<String>,
    /// Whether the spawning line was negated (! prefix)
    pub negate: bool,
    task: ProcessTask,
}

impl BackgroundJob {
    pub fn new(name: String, args: Vec<String>, negate: bool, task: ProcessTask) -> Self {
        Self { name, args, negate, task }
    }

    /// Block until the job's process exits.
    pub fn join(self, limit: Option<Duration>, grace: Duration) -> JoinedJob {
        tracing::debug!(job = %self.name, pid = self.task.pid(), "joining background job");
        let output = self.task.wait(limit, grace);
        JoinedJob {
            name: self.name,
            args: self.args,
            negate: self.negate,
            output,
        }
    }
}

/// A background job after it has been waited on.
pub struct JoinedJob {
    pub name: String,
    pub args: Vec<String>,
    pub negate: bool,
    pub output: ProcessOutput,
}

impl JoinedJob {
    /// Compare the recorded expectation with the actual exit outcome.
    pub fn mismatch(&self) -> Option<String> {
        match (&self.output.error, self.negate) {
            (Some(err), false) => Some(format!("{}: {}", self.name, err)),
            (None, true) => Some(format!("{}: unexpected command success", self.name)),
            _ => None,
        }
    }
}

/// Live background jobs in spawn order.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Vec<BackgroundJob>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.iter().any(|job| job.name == name)
    }

    /// Names of live jobs, in spawn order.
    pub fn names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name.as_str()).collect()
    }

    /// Name for a job spawned without `&name`.
    pub fn implicit_name(&self) -> String {
        format!("bg{}", self.jobs.len())
    }

    /// Register a job; a live job with the same name is an error.
    ///
    /// On collision the rejected job is dropped, which kills its process.
    pub fn insert(&mut self, job: BackgroundJob) -> Result<(), ScriptError> {
        if self.contains(&job.name) {
            return Err(ScriptError::new(
                ErrorKind::DuplicateName,
                format!("duplicate background process name {:?}", job.name),
            ));
        }
        tracing::debug!(job = %job.name, "registered background job");
        self.jobs.push(job);
        Ok(())
    }

    /// Remove and return every live job.
    pub fn take_all(&mut self) -> Vec<BackgroundJob> {
        std::mem::take(&mut self.jobs)
    }

    /// Remove and return exactly the named jobs, in the order given.
    ///
    /// Every name is checked before anything is removed.
    pub fn take_named(&mut self, names: &[String]) -> Result<Vec<BackgroundJob>, ScriptError> {
        for (i, name) in names.iter().enumerate() {
            if !self.contains(name) {
                return Err(ScriptError::new(
                    ErrorKind::UsageError,
                    format!("unknown background process {:?}", name),
                ));
            }
            if names[..i].contains(name) {
                return Err(ScriptError::new(
                    ErrorKind::UsageError,
                    format!("background process {:?} listed twice", name),
                ));
            }
        }

        let mut taken = Vec::with_capacity(names.len());
        for name in names {
            if let Some(pos) = self.jobs.iter().position(|job| &job.name == name) {
                taken.push(self.jobs.remove(pos));
            }
        }
        Ok(taken)
    }

    /// Interrupt and reap every live job. Used when a script ends with
    /// jobs that were never waited on.
    pub fn terminate_all(&mut self, grace: Duration) {
        for job in self.take_all() {
            tracing::debug!(job = %job.name, "terminating unjoined background job");
            let _ = job.join(Some(Duration::ZERO), grace);
        }
    }
}
