// src/engine/mod.rs

//! Orchestration engine for convoy.
//!
//! This module ties together:
//! - the pure pipeline scheduler (queues, admission control, edge removal,
//!   failure propagation, auto-stop)
//! - the async runtime event loop that reacts to:
//!   - job phase events (started, healthy)
//!   - job completion events
//!   - shutdown signals
//!
//! The pure scheduler lives in [`scheduler`]; the async/IO shell is
//! implemented in [`runtime`]. Job tasks report back exclusively through
//! [`PipelineEvent`]s over a channel, so all graph and queue mutation
//! happens inside the single-threaded scheduler core.

use crate::graph::JobId;

/// Canonical job name type used throughout the engine.
pub type JobName = String;

/// How a job ended.
///
/// Most variants are reported by the execution layer; `Blocked` is produced
/// by the scheduler itself for jobs that never start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Build-only job: complete once built, no container ever ran.
    Built,
    /// Every instance exited; one exit code per replica.
    Exited { codes: Vec<i64> },
    /// Deliberately stopped because no dependent needed it anymore.
    Stopped,
    /// The per-job timeout countdown fired and forced a stop. Always kept
    /// distinct from a genuine non-zero exit.
    TimedOut,
    /// Stopped by pipeline shutdown before reaching a natural outcome.
    Interrupted,
    /// The adapter call or the job task itself failed.
    Error(String),
    /// Never started: a dependency failed, or a required condition became
    /// unsatisfiable.
    Blocked,
}

/// Why the runtime is asking a job task to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No dependent needs the job anymore (auto-stop).
    AutoStop,
    /// The whole pipeline is shutting down.
    Shutdown,
}

/// A stop request for a running job, emitted by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct StopRequest {
    pub job: JobId,
    pub reason: StopReason,
}

/// Events flowing into the runtime from job tasks and signal handlers.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A job's containers were created and started.
    JobStarted { job: JobId },
    /// A job's readiness probe reported healthy.
    JobHealthy { job: JobId },
    /// A job task finished with a concrete outcome.
    JobFinished { job: JobId, outcome: JobOutcome },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Runtime options used by both the scheduler core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Maximum number of simultaneously running jobs.
    pub concurrency: usize,
    /// Per-job timeout; firing forces a stop.
    pub job_timeout: std::time::Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            job_timeout: std::time::Duration::from_secs(3600),
        }
    }
}

pub mod report;
pub mod runtime;
pub mod scheduler;

pub use report::RunReport;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerStep};
