// src/engine/scheduler.rs

//! Pure pipeline scheduler core.
//!
//! The scheduler owns the job table and the four runtime queues
//! (waiting-for-dependencies, scheduled, running, finished) and is the only
//! code that mutates either. It is synchronous and deterministic: events go
//! in, a [`SchedulerStep`] comes out telling the async shell which job tasks
//! to start or stop. It never calls the container adapter and holds no
//! channels or Tokio types, so it can be unit tested without any IO.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, info, warn};

use crate::engine::{JobName, JobOutcome, PipelineEvent, RuntimeOptions, StopReason, StopRequest};
use crate::graph::job::{JobId, JobStatus, ScheduledJob};
use crate::graph::{Condition, Pipeline};

/// What the async shell should do after one scheduler step.
#[derive(Debug, Default)]
pub struct SchedulerStep {
    /// Jobs admitted into the running queue; spawn a job task for each.
    pub to_start: Vec<ScheduledJob>,
    /// Running jobs that should be stopped.
    pub to_stop: Vec<StopRequest>,
    /// Jobs that transitioned to `Blocked` during this step.
    pub newly_blocked: Vec<JobName>,
    /// Every job has reached a final status.
    pub run_finished: bool,
}

/// Scheduler state: the pipeline plus the four disjoint queues.
#[derive(Debug)]
pub struct Scheduler {
    pipeline: Pipeline,
    waiting: Vec<JobId>,
    scheduled: VecDeque<JobId>,
    running: BTreeSet<JobId>,
    finished: Vec<JobId>,
    limit: usize,
    job_timeout: std::time::Duration,
    shutting_down: bool,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, options: RuntimeOptions) -> Self {
        Self {
            pipeline,
            waiting: Vec::new(),
            scheduled: VecDeque::new(),
            running: BTreeSet::new(),
            finished: Vec::new(),
            limit: options.concurrency.max(1),
            job_timeout: options.job_timeout,
            shutting_down: false,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Number of jobs currently in the running queue (exposed for tests).
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Place every job into the waiting queue and admit the first batch.
    pub fn start(&mut self) -> SchedulerStep {
        self.waiting = (0..self.pipeline.len()).collect();
        info!(
            jobs = self.pipeline.len(),
            limit = self.limit,
            "pipeline scheduler starting"
        );

        let mut step = SchedulerStep::default();
        self.update_queue(&mut step);
        step
    }

    /// Feed one event into the scheduler and collect the resulting commands.
    pub fn handle_event(&mut self, event: PipelineEvent) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match event {
            PipelineEvent::JobStarted { job } => self.on_started(job),
            PipelineEvent::JobHealthy { job } => self.on_healthy(job),
            PipelineEvent::JobFinished { job, outcome } => {
                self.on_finished(job, outcome, &mut step)
            }
            PipelineEvent::ShutdownRequested => self.on_shutdown(&mut step),
        }

        self.collect_auto_stops(&mut step);
        self.update_queue(&mut step);
        step
    }

    fn on_started(&mut self, id: JobId) {
        let job = self.pipeline.job_mut(id);
        if job.status.is_final() {
            warn!(job = %job.name, "started event for already-final job; ignoring");
            return;
        }
        job.started = true;
        job.status = JobStatus::Running;
        for instance in &mut job.instances {
            instance.running = true;
        }
        debug!(job = %job.name, "job running");

        self.satisfy(id, Condition::ServiceStarted);
    }

    fn on_healthy(&mut self, id: JobId) {
        let job = self.pipeline.job(id);
        if job.status.is_final() {
            debug!(job = %job.name, "healthy event for already-final job; ignoring");
            return;
        }
        debug!(job = %job.name, "job healthy");
        self.satisfy(id, Condition::ServiceHealthy);
    }

    fn on_finished(&mut self, id: JobId, outcome: JobOutcome, step: &mut SchedulerStep) {
        let status = match &outcome {
            JobOutcome::Built => JobStatus::Built,
            JobOutcome::Exited { codes } => {
                if codes.iter().all(|&c| c == 0) {
                    JobStatus::ExitedZero
                } else {
                    JobStatus::ExitedNonZero
                }
            }
            // A deliberate stop is not a failure: the job did exactly what
            // the pipeline needed from it.
            JobOutcome::Stopped => JobStatus::ExitedZero,
            JobOutcome::TimedOut | JobOutcome::Interrupted | JobOutcome::Error(_) => {
                JobStatus::Error
            }
            JobOutcome::Blocked => JobStatus::Blocked,
        };

        if let JobOutcome::Exited { codes } = &outcome {
            let job = self.pipeline.job_mut(id);
            for (index, &code) in codes.iter().enumerate() {
                if let Some(instance) = job.instances.get_mut(index) {
                    instance.running = false;
                    instance.exited = true;
                    instance.exit_code = Some(code);
                }
            }
        }

        self.finalize(id, status, outcome, step);
    }

    fn on_shutdown(&mut self, step: &mut SchedulerStep) {
        info!("shutdown requested; stopping all running jobs");
        self.shutting_down = true;

        for &id in self.running.clone().iter() {
            let job = self.pipeline.job_mut(id);
            if !job.stop_requested {
                job.stop_requested = true;
                step.to_stop.push(StopRequest {
                    job: id,
                    reason: StopReason::Shutdown,
                });
            }
        }

        // Jobs that never started surface as Error (interrupted while
        // waiting on dependencies). Running jobs finalize through their own
        // JobFinished events.
        let pending: Vec<JobId> = self
            .waiting
            .iter()
            .copied()
            .chain(self.scheduled.iter().copied())
            .collect();
        for id in pending {
            self.finalize(id, JobStatus::Error, JobOutcome::Interrupted, step);
        }
    }

    /// Remove every `condition` edge pointing at `source` (and the symmetric
    /// dependents entry), unblocking its dependents.
    fn satisfy(&mut self, source: JobId, condition: Condition) {
        let dependents: Vec<JobId> = self
            .pipeline
            .job(source)
            .dependents
            .iter()
            .filter(|&(_, &c)| c == condition)
            .map(|(&id, _)| id)
            .collect();

        for dependent in dependents {
            self.pipeline.remove_edge(dependent, source);
            debug!(
                job = %self.pipeline.job(dependent).name,
                dependency = %self.pipeline.job(source).name,
                condition = %condition,
                "dependency condition satisfied"
            );
        }
    }

    /// Set a job's final status, propagate edge satisfaction and blocking,
    /// and update auto-stop bookkeeping. Idempotent for already-final jobs.
    fn finalize(
        &mut self,
        id: JobId,
        status: JobStatus,
        outcome: JobOutcome,
        step: &mut SchedulerStep,
    ) {
        if self.pipeline.job(id).status.is_final() {
            return;
        }

        self.waiting.retain(|&j| j != id);
        self.scheduled.retain(|&j| j != id);
        self.running.remove(&id);

        let job = self.pipeline.job_mut(id);
        job.finalize(status, outcome);
        self.finished.push(id);

        let job = self.pipeline.job(id);
        info!(job = %job.name, status = ?status, "job finished");
        if status == JobStatus::Blocked {
            step.newly_blocked.push(job.name.clone());
        }

        if status.is_success_final() {
            // Success trivially covers "started"; residual healthy/failure
            // requirements can never be met now and block their dependents.
            self.satisfy(id, Condition::ServiceStarted);
            self.satisfy(id, Condition::ServiceCompletedSuccessfully);
        } else {
            // Failure satisfies dependents that were waiting for exactly
            // that; everyone else still holding an edge becomes blocked.
            self.satisfy(id, Condition::ServiceFailed);
        }
        self.block_remaining_dependents(id, step);

        // Auto-stop bookkeeping: this job no longer counts as a pending
        // dependent of its build-time dependencies.
        for dep in self.pipeline.job(id).static_dependencies.clone() {
            self.pipeline.job_mut(dep).remaining_dependents.remove(&id);
        }
    }

    /// Every dependent still holding an edge to `id` can never proceed:
    /// transition it straight to `Blocked`. Blocking is transitive: a
    /// blocked job is failure-final and propagates with the same rule.
    fn block_remaining_dependents(&mut self, id: JobId, step: &mut SchedulerStep) {
        let dependents: Vec<JobId> = self.pipeline.job(id).dependents.keys().copied().collect();
        for dependent in dependents {
            self.pipeline.remove_edge(dependent, id);
            warn!(
                job = %self.pipeline.job(dependent).name,
                dependency = %self.pipeline.job(id).name,
                "blocking dependent: required condition can no longer be satisfied"
            );
            self.finalize(dependent, JobStatus::Blocked, JobOutcome::Blocked, step);
        }
    }

    /// Stop auto-stop jobs once no dependent still needs them: all
    /// build-time dependents have reached a final status.
    fn collect_auto_stops(&mut self, step: &mut SchedulerStep) {
        let candidates: Vec<JobId> = self
            .pipeline
            .jobs()
            .filter(|job| {
                job.auto_stop
                    && job.started
                    && !job.status.is_final()
                    && !job.stop_requested
                    && job.remaining_dependents.is_empty()
            })
            .map(|job| job.id)
            .collect();

        for id in candidates {
            let job = self.pipeline.job_mut(id);
            job.stop_requested = true;
            info!(job = %job.name, "auto-stopping: no dependent needs it anymore");
            step.to_stop.push(StopRequest {
                job: id,
                reason: StopReason::AutoStop,
            });
        }
    }

    /// Move dependency-free waiting jobs into the scheduled queue, then
    /// start scheduled jobs (FIFO) until the running-queue limit is reached.
    fn update_queue(&mut self, step: &mut SchedulerStep) {
        if !self.shutting_down {
            let ready: Vec<JobId> = self
                .waiting
                .iter()
                .copied()
                .filter(|&id| self.pipeline.job(id).dependencies.is_empty())
                .collect();
            self.waiting.retain(|id| !ready.contains(id));
            for id in ready {
                debug!(job = %self.pipeline.job(id).name, "dependencies satisfied; scheduling");
                self.scheduled.push_back(id);
            }

            while self.running.len() < self.limit {
                let Some(id) = self.scheduled.pop_front() else {
                    break;
                };
                self.running.insert(id);

                let job = self.pipeline.job_mut(id);
                job.status = if job.spec.build.is_some() {
                    JobStatus::Building
                } else {
                    JobStatus::Pulling
                };
                job.started_at = Some(std::time::Instant::now());

                let wants_healthy = job
                    .dependents
                    .values()
                    .any(|&c| c == Condition::ServiceHealthy);

                info!(
                    job = %job.name,
                    level = job.level,
                    running = self.running.len(),
                    limit = self.limit,
                    "starting job"
                );
                step.to_start.push(ScheduledJob {
                    id,
                    name: job.name.clone(),
                    spec: job.spec.clone(),
                    timeout: self.job_timeout,
                    wants_healthy,
                });
            }
        }

        step.run_finished = self.finished.len() == self.pipeline.len();
    }
}
