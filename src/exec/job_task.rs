// src/exec/job_task.rs

//! Individual job task.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{JobOutcome, PipelineEvent, StopReason};
use crate::graph::job::{JobSpec, ScheduledJob};

use super::ContainerAdapter;

/// Drive one job from admission to a final outcome, reporting phase changes
/// through `event_tx` and always ending with a `JobFinished` event.
///
/// Three things race:
/// - the job's own execution (pull/build, start, wait for exit)
/// - the per-job timeout countdown
/// - a stop request from the scheduler (auto-stop or shutdown)
///
/// A timeout or stop interrupts execution, stops the containers, and reports
/// the corresponding outcome instead of an exit code. The readiness poll
/// runs in its own task alongside the exit waits, so an instance exiting
/// before it ever turns healthy still reports its real exit code.
pub async fn run_job<A: ContainerAdapter + 'static>(
    task: ScheduledJob,
    adapter: Arc<A>,
    event_tx: mpsc::Sender<PipelineEvent>,
    mut stop_rx: oneshot::Receiver<StopReason>,
) {
    let name = task.name.clone();
    let id = task.id;
    let mut health_poll: Option<tokio::task::JoinHandle<()>> = None;

    let outcome = tokio::select! {
        result = execute(&task, &adapter, &event_tx, &mut health_poll) => match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(job = %name, error = %err, "job execution error");
                stop_all(&task.spec, adapter.as_ref()).await;
                JobOutcome::Error(format!("{err:#}"))
            }
        },
        () = tokio::time::sleep(task.timeout) => {
            warn!(job = %name, timeout = ?task.timeout, "job timed out; stopping containers");
            stop_all(&task.spec, adapter.as_ref()).await;
            JobOutcome::TimedOut
        }
        reason = &mut stop_rx => {
            // A dropped sender only happens when the runtime itself is going
            // away; treat it like a shutdown.
            let reason = reason.unwrap_or(StopReason::Shutdown);
            info!(job = %name, ?reason, "stop requested; stopping containers");
            stop_all(&task.spec, adapter.as_ref()).await;
            match reason {
                StopReason::AutoStop => JobOutcome::Stopped,
                StopReason::Shutdown => JobOutcome::Interrupted,
            }
        }
    };

    if let Some(handle) = health_poll.take() {
        handle.abort();
    }

    if event_tx
        .send(PipelineEvent::JobFinished { job: id, outcome })
        .await
        .is_err()
    {
        debug!(job = %name, "runtime gone before job could report its outcome");
    }
}

async fn execute<A: ContainerAdapter + 'static>(
    task: &ScheduledJob,
    adapter: &Arc<A>,
    event_tx: &mpsc::Sender<PipelineEvent>,
    health_poll: &mut Option<tokio::task::JoinHandle<()>>,
) -> Result<JobOutcome> {
    let spec = &task.spec;

    if spec.build.is_some() {
        info!(job = %task.name, "building image");
        adapter.build_image(spec).await?;
    } else {
        info!(job = %task.name, image = ?spec.image, "pulling image");
        adapter.pull_image(spec).await?;
    }

    if spec.build_only {
        info!(job = %task.name, "build-only job complete");
        return Ok(JobOutcome::Built);
    }

    let scale = spec.scale as usize;
    for index in 0..scale {
        adapter.create_container(spec, index).await?;
    }
    for index in 0..scale {
        adapter.start_container(spec, index).await?;
    }

    info!(job = %task.name, instances = scale, "containers started");
    event_tx
        .send(PipelineEvent::JobStarted { job: task.id })
        .await
        .context("sending started event to runtime")?;

    if task.wants_healthy {
        *health_poll = Some(spawn_health_poll(task, adapter, event_tx));
    }

    // Wait for every instance; codes are indexed by replica.
    let mut waits = JoinSet::new();
    for index in 0..scale {
        let adapter = Arc::clone(adapter);
        let spec = Arc::clone(&task.spec);
        waits.spawn(async move {
            let code = adapter.wait_container(&spec, index).await?;
            Ok::<_, anyhow::Error>((index, code))
        });
    }

    let mut codes = vec![0i64; scale];
    while let Some(joined) = waits.join_next().await {
        let (index, code) = joined.context("job instance task panicked")??;
        debug!(job = %task.name, instance = index, exit_code = code, "instance exited");
        codes[index] = code;
    }

    Ok(JobOutcome::Exited { codes })
}

/// Spawn the readiness poll for a started job. It reports `JobHealthy` at
/// most once; [`run_job`] aborts it when the job settles.
fn spawn_health_poll<A: ContainerAdapter + 'static>(
    task: &ScheduledJob,
    adapter: &Arc<A>,
    event_tx: &mpsc::Sender<PipelineEvent>,
) -> tokio::task::JoinHandle<()> {
    let name = task.name.clone();
    let id = task.id;
    let spec = Arc::clone(&task.spec);
    let adapter = Arc::clone(adapter);
    let event_tx = event_tx.clone();

    tokio::spawn(async move {
        poll_until_healthy(&name, &spec, adapter.as_ref()).await;
        if event_tx
            .send(PipelineEvent::JobHealthy { job: id })
            .await
            .is_err()
        {
            debug!(job = %name, "runtime gone before healthy could be reported");
        }
    })
}

/// Poll the readiness probe until every instance reports healthy.
///
/// Unbounded on purpose: the per-job timeout raced in [`run_job`] is the
/// only limit on how long a dependent will wait for health. Probe errors
/// count as not-yet-healthy.
async fn poll_until_healthy<A: ContainerAdapter + ?Sized>(
    name: &str,
    spec: &JobSpec,
    adapter: &A,
) {
    let interval = spec
        .healthcheck
        .as_ref()
        .map(|h| h.interval)
        .unwrap_or(Duration::from_secs(1));

    let scale = spec.scale as usize;
    let mut healthy = vec![false; scale];

    loop {
        for index in 0..scale {
            if !healthy[index] {
                match adapter.probe_healthy(spec, index).await {
                    Ok(ok) => healthy[index] = ok,
                    Err(err) => {
                        warn!(job = %name, instance = index, error = %err, "health probe failed");
                    }
                }
            }
        }
        if healthy.iter().all(|&h| h) {
            info!(job = %name, "all instances healthy");
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn stop_all<A: ContainerAdapter + ?Sized>(spec: &JobSpec, adapter: &A) {
    if spec.build_only {
        return;
    }
    for index in 0..spec.scale as usize {
        if let Err(err) = adapter.stop_container(spec, index).await {
            warn!(
                job = %spec.name,
                instance = index,
                error = %err,
                "failed to stop container"
            );
        }
    }
}
