// src/exec/mod.rs

//! Container execution layer.
//!
//! The runtime talks to a [`ContainerAdapter`] instead of a concrete
//! container engine. This keeps every scheduling decision independent of
//! Docker and makes it easy to swap in a fake adapter in tests.
//!
//! - [`docker`] implements the adapter on top of the `docker` CLI.
//! - [`job_task`] is the per-job async task the runtime spawns: it drives a
//!   job through its pull/build, start, health and wait phases and reports
//!   back through [`PipelineEvent`]s.

use anyhow::Result;
use async_trait::async_trait;

use crate::graph::JobSpec;

pub mod docker;
pub mod job_task;

pub use docker::DockerCli;

/// Operations a container engine must provide, one job instance at a time.
///
/// Implementations must be safe to call from multiple job tasks at once.
#[async_trait]
pub trait ContainerAdapter: Send + Sync {
    /// Ensure the job's image exists locally.
    async fn pull_image(&self, spec: &JobSpec) -> Result<()>;

    /// Build the job's image from its build context.
    async fn build_image(&self, spec: &JobSpec) -> Result<()>;

    /// Create the container for one instance of the job.
    async fn create_container(&self, spec: &JobSpec, index: usize) -> Result<()>;

    /// Start a previously created container.
    async fn start_container(&self, spec: &JobSpec, index: usize) -> Result<()>;

    /// Block until the instance's container exits; returns its exit code.
    async fn wait_container(&self, spec: &JobSpec, index: usize) -> Result<i64>;

    /// Stop the instance's container.
    async fn stop_container(&self, spec: &JobSpec, index: usize) -> Result<()>;

    /// Whether the instance's container currently reports healthy.
    async fn probe_healthy(&self, spec: &JobSpec, index: usize) -> Result<bool>;
}
