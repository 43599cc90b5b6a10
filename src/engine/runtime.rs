// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::scheduler::{Scheduler, SchedulerStep};
use crate::engine::{PipelineEvent, RunReport, RuntimeOptions, StopReason, StopRequest};
use crate::errors::Result;
use crate::exec::{job_task, ContainerAdapter};
use crate::graph::job::{JobId, ScheduledJob};
use crate::graph::Pipeline;

/// Drives the pipeline scheduler in response to [`PipelineEvent`]s, and
/// delegates container operations to a [`ContainerAdapter`].
///
/// This is a pure IO shell around [`Scheduler`], which contains all the
/// pipeline semantics. The shell reads events from a channel, feeds them
/// into the scheduler, and executes the resulting step: spawning a job task
/// per started job and signalling stop requests over per-job channels.
pub struct Runtime<A: ContainerAdapter> {
    scheduler: Scheduler,
    event_tx: mpsc::Sender<PipelineEvent>,
    event_rx: mpsc::Receiver<PipelineEvent>,
    adapter: Arc<A>,
    active: BTreeMap<JobId, ActiveJob>,
}

/// Handle to one spawned job task.
struct ActiveJob {
    stop_tx: Option<oneshot::Sender<StopReason>>,
    handle: JoinHandle<()>,
}

impl<A: ContainerAdapter> fmt::Debug for Runtime<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<A: ContainerAdapter + 'static> Runtime<A> {
    pub fn new(pipeline: Pipeline, options: RuntimeOptions, adapter: Arc<A>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(64);
        Self {
            scheduler: Scheduler::new(pipeline, options),
            event_tx,
            event_rx,
            adapter,
            active: BTreeMap::new(),
        }
    }

    /// Sender for injecting external events, e.g. `ShutdownRequested` from a
    /// signal handler.
    pub fn event_sender(&self) -> mpsc::Sender<PipelineEvent> {
        self.event_tx.clone()
    }

    /// Main event loop.
    ///
    /// - Admits the initial batch of jobs.
    /// - Consumes [`PipelineEvent`]s from the channel and feeds them into the
    ///   scheduler.
    /// - Executes each resulting step until every job is final.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("pipeline runtime started");

        let step = self.scheduler.start();
        let mut finished = self.apply_step(step);

        while !finished {
            let event = match self.event_rx.recv().await {
                Some(event) => event,
                None => {
                    warn!("runtime event channel closed before run finished");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if let PipelineEvent::JobFinished { job, .. } = &event {
                self.active.remove(job);
            }

            let step = self.scheduler.handle_event(event);
            finished = self.apply_step(step);
        }

        for (id, active) in self.active {
            debug!(job = id, "aborting leftover job task");
            active.handle.abort();
        }

        let report = RunReport::from_pipeline(self.scheduler.pipeline());
        info!(success = report.success(), "pipeline runtime finished");
        Ok(report)
    }

    /// Execute one scheduler step; returns true once the run is finished.
    fn apply_step(&mut self, step: SchedulerStep) -> bool {
        for name in &step.newly_blocked {
            warn!(job = %name, "job blocked; it will not run");
        }
        for task in step.to_start {
            self.spawn_job(task);
        }
        for request in step.to_stop {
            self.signal_stop(request);
        }
        step.run_finished
    }

    fn spawn_job(&mut self, task: ScheduledJob) {
        let id = task.id;
        let (stop_tx, stop_rx) = oneshot::channel();

        debug!(job = %task.name, "spawning job task");
        let handle = tokio::spawn(job_task::run_job(
            task,
            Arc::clone(&self.adapter),
            self.event_tx.clone(),
            stop_rx,
        ));

        self.active.insert(
            id,
            ActiveJob {
                stop_tx: Some(stop_tx),
                handle,
            },
        );
    }

    fn signal_stop(&mut self, request: StopRequest) {
        let Some(active) = self.active.get_mut(&request.job) else {
            debug!(job = request.job, "stop requested for job with no active task");
            return;
        };
        if let Some(stop_tx) = active.stop_tx.take() {
            // A dropped receiver just means the task finished on its own.
            let _ = stop_tx.send(request.reason);
        }
    }
}
