// src/engine/report.rs

//! Final pipeline run report.

use std::fmt;
use std::time::Duration;

use crate::engine::JobOutcome;
use crate::graph::{JobStatus, Pipeline};

/// Final state of one job, extracted after the run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub name: String,
    pub status: JobStatus,
    pub outcome: Option<JobOutcome>,
    pub duration: Option<Duration>,
}

/// Summary of a finished pipeline run, one entry per job.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let jobs = pipeline
            .jobs()
            .map(|job| JobReport {
                name: job.name.clone(),
                status: job.status,
                outcome: job.outcome.clone(),
                duration: job.duration(),
            })
            .collect();
        Self { jobs }
    }

    /// True when every job reached a success-final status.
    pub fn success(&self) -> bool {
        self.jobs.iter().all(|job| job.status.is_success_final())
    }

    /// Process exit code for the run: zero on success, one otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Waiting => "waiting",
        JobStatus::Pulling => "pulling",
        JobStatus::Building => "building",
        JobStatus::Running => "running",
        JobStatus::Built => "built",
        JobStatus::ExitedZero => "exited (0)",
        JobStatus::ExitedNonZero => "exited (non-zero)",
        JobStatus::Blocked => "blocked",
        JobStatus::Error => "error",
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .jobs
            .iter()
            .map(|job| job.name.len())
            .max()
            .unwrap_or(0);

        for job in &self.jobs {
            match job.duration {
                Some(duration) => writeln!(
                    f,
                    "{:width$}  {:18} {:.1}s",
                    job.name,
                    status_label(job.status),
                    duration.as_secs_f64(),
                )?,
                None => writeln!(f, "{:width$}  {}", job.name, status_label(job.status))?,
            }
        }
        write!(
            f,
            "pipeline {}",
            if self.success() { "succeeded" } else { "failed" }
        )
    }
}
