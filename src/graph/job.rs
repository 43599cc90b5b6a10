// src/graph/job.rs

//! Job metadata and status state machine.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::compose::service::{Build, Entrypoint, Healthcheck, Service, Volume};
use crate::engine::JobOutcome;
use crate::graph::Condition;

/// Index of a job in the pipeline's job table.
pub type JobId = usize;

/// Lifecycle of a job.
///
/// ```text
/// WAITING → {PULLING|BUILDING} → RUNNING → {BUILT|EXITED_ZERO|EXITED_NON_ZERO}
/// WAITING → BLOCKED
/// any     → ERROR
/// ```
///
/// `Blocked`, `Error` and `ExitedNonZero` are failure-final; `Built` and
/// `ExitedZero` are success-final; nothing else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Waiting,
    Pulling,
    Building,
    Running,
    Built,
    ExitedZero,
    ExitedNonZero,
    Blocked,
    Error,
}

impl JobStatus {
    pub fn is_final(self) -> bool {
        self.is_success_final() || self.is_failure_final()
    }

    pub fn is_success_final(self) -> bool {
        matches!(self, JobStatus::Built | JobStatus::ExitedZero)
    }

    pub fn is_failure_final(self) -> bool {
        matches!(
            self,
            JobStatus::Blocked | JobStatus::Error | JobStatus::ExitedNonZero
        )
    }
}

/// Everything the execution layer needs to know about a job's service:
/// an immutable snapshot taken from the resolved [`Service`].
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub image: Option<String>,
    pub build: Option<Build>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Entrypoint>,
    pub env_files: Vec<std::path::PathBuf>,
    pub environment: Vec<String>,
    pub expose: Vec<String>,
    pub group_add: Vec<String>,
    pub healthcheck: Option<Healthcheck>,
    pub labels: Vec<String>,
    pub scale: u32,
    pub user: Option<String>,
    pub volumes: Vec<Volume>,
    pub working_dir: Option<String>,
    /// Complete once built; no container ever runs.
    pub build_only: bool,
}

impl JobSpec {
    pub fn from_service(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            image: service.image.clone(),
            build: service.build.clone(),
            command: service.command.clone(),
            entrypoint: service.entrypoint.clone(),
            env_files: service.env_files.clone(),
            environment: service.environment.clone(),
            expose: service.expose.clone(),
            group_add: service.group_add.clone(),
            healthcheck: service.healthcheck.clone(),
            labels: service.labels.clone(),
            scale: service.scale,
            user: service.user.clone(),
            volumes: service.volumes.clone(),
            working_dir: service.working_dir.clone(),
            build_only: service.is_build_only(),
        }
    }
}

/// One running replica of a job.
#[derive(Debug, Clone, Default)]
pub struct JobInstance {
    pub index: usize,
    pub running: bool,
    pub exited: bool,
    pub exit_code: Option<i64>,
}

/// One elected, non-abstract service in the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub spec: Arc<JobSpec>,

    pub status: JobStatus,
    pub outcome: Option<JobOutcome>,

    /// Unresolved dependencies: dependency job → condition this job requires
    /// of it. Always mutually consistent with the dependency's `dependents`
    /// entry for this job.
    pub dependencies: BTreeMap<JobId, Condition>,
    /// Reciprocal map: dependent job → condition it requires of this job.
    pub dependents: BTreeMap<JobId, Condition>,

    /// Build-time dependency ids, unaffected by runtime edge removal.
    pub static_dependencies: Vec<JobId>,
    /// Build-time dependents that have not yet reached a final status.
    /// Drives auto-stop; unlike the edge maps, this only shrinks on
    /// dependent finalization.
    pub remaining_dependents: BTreeSet<JobId>,

    /// Longest path (in edges) back to a job with no dependencies.
    pub level: usize,
    /// Nothing downstream needs this job's outcome, only its liveness:
    /// safe to stop once no dependent still needs it.
    pub auto_stop: bool,
    /// An auto-stop or shutdown stop was already issued.
    pub stop_requested: bool,

    pub started: bool,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,

    pub instances: Vec<JobInstance>,
}

impl Job {
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        let instances = (0..spec.scale as usize)
            .map(|index| JobInstance {
                index,
                ..JobInstance::default()
            })
            .collect();

        Self {
            id,
            name: spec.name.clone(),
            spec: Arc::new(spec),
            status: JobStatus::Waiting,
            outcome: None,
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
            static_dependencies: Vec::new(),
            remaining_dependents: BTreeSet::new(),
            level: 0,
            auto_stop: false,
            stop_requested: false,
            started: false,
            started_at: None,
            finished_at: None,
            instances,
        }
    }

    /// Set the final status. A job's final status is set at most once and is
    /// never overwritten afterwards; late attempts are ignored.
    pub fn finalize(&mut self, status: JobStatus, outcome: JobOutcome) {
        if self.status.is_final() {
            debug!(
                job = %self.name,
                current = ?self.status,
                ignored = ?status,
                "job already final; ignoring late status"
            );
            return;
        }
        self.status = status;
        self.outcome = Some(outcome);
        self.finished_at = Some(Instant::now());
    }

    /// Wall-clock duration, once both endpoints are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }
}

/// Description of a job the scheduler wants the execution layer to run now.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub spec: Arc<JobSpec>,
    /// Independent countdown for the whole job; firing forces a stop.
    pub timeout: Duration,
    /// Some dependent still requires `service_healthy`: poll readiness and
    /// report once healthy.
    pub wants_healthy: bool,
}
