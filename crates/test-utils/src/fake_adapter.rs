use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;

use convoy::exec::ContainerAdapter;
use convoy::graph::JobSpec;

/// Scripted behaviour for one job in a [`FakeAdapter`].
#[derive(Debug, Clone)]
pub struct JobScript {
    /// Exit code per replica; missing entries exit 0.
    pub exit_codes: Vec<i64>,
    /// How long each replica "runs" before exiting.
    pub run_for: Duration,
    /// Replicas never exit on their own (long-lived service).
    pub forever: bool,
    /// Readiness probe flips to healthy this long after start.
    pub healthy_after: Duration,
    pub fail_build: bool,
    pub fail_pull: bool,
}

impl Default for JobScript {
    fn default() -> Self {
        Self {
            exit_codes: Vec::new(),
            run_for: Duration::ZERO,
            forever: false,
            healthy_after: Duration::ZERO,
            fail_build: false,
            fail_pull: false,
        }
    }
}

impl JobScript {
    /// Exit 0 immediately (also the behaviour of unscripted jobs).
    pub fn succeeds() -> Self {
        Self::default()
    }

    pub fn exits(code: i64) -> Self {
        Self {
            exit_codes: vec![code],
            ..Self::default()
        }
    }

    /// One exit code per replica, by instance index.
    pub fn exits_each(codes: Vec<i64>) -> Self {
        Self {
            exit_codes: codes,
            ..Self::default()
        }
    }

    pub fn runs_for(duration: Duration) -> Self {
        Self {
            run_for: duration,
            ..Self::default()
        }
    }

    /// A long-lived service: runs until the runtime stops it.
    pub fn service() -> Self {
        Self {
            forever: true,
            ..Self::default()
        }
    }

    pub fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Self::default()
        }
    }

    pub fn healthy_after(mut self, duration: Duration) -> Self {
        self.healthy_after = duration;
        self
    }
}

#[derive(Debug, Default)]
struct State {
    scripts: BTreeMap<String, JobScript>,
    calls: Vec<String>,
    started: BTreeMap<String, Instant>,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory [`ContainerAdapter`]: records every call and simulates
/// container lifecycles according to per-job [`JobScript`]s.
///
/// Unscripted jobs pull, start and exit 0 without delay.
#[derive(Debug, Default)]
pub struct FakeAdapter {
    state: Mutex<State>,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, job: &str, script: JobScript) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(job.to_string(), script);
    }

    /// Every adapter call so far, e.g. `"start web[0]"`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, job: &str) -> Vec<String> {
        let suffix = format!(" {job}");
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&suffix) || c.contains(&format!(" {job}[")))
            .collect()
    }

    /// Highest number of jobs simultaneously between admission and exit.
    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }

    fn script_for(&self, job: &str) -> JobScript {
        self.state
            .lock()
            .unwrap()
            .scripts
            .get(job)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn admit(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

#[async_trait]
impl ContainerAdapter for FakeAdapter {
    async fn pull_image(&self, spec: &JobSpec) -> Result<()> {
        self.record(format!("pull {}", spec.name));
        self.admit();
        if self.script_for(&spec.name).fail_pull {
            self.release();
            bail!("scripted pull failure for '{}'", spec.name);
        }
        Ok(())
    }

    async fn build_image(&self, spec: &JobSpec) -> Result<()> {
        self.record(format!("build {}", spec.name));
        self.admit();
        let script = self.script_for(&spec.name);
        if script.fail_build {
            self.release();
            bail!("scripted build failure for '{}'", spec.name);
        }
        if spec.build_only {
            self.release();
        }
        Ok(())
    }

    async fn create_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        self.record(format!("create {}[{index}]", spec.name));
        Ok(())
    }

    async fn start_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        self.record(format!("start {}[{index}]", spec.name));
        self.state
            .lock()
            .unwrap()
            .started
            .insert(spec.name.clone(), Instant::now());
        Ok(())
    }

    async fn wait_container(&self, spec: &JobSpec, index: usize) -> Result<i64> {
        let script = self.script_for(&spec.name);
        if script.forever {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(script.run_for).await;
        self.record(format!("exit {}[{index}]", spec.name));
        if index + 1 == spec.scale as usize {
            self.release();
        }
        Ok(script.exit_codes.get(index).copied().unwrap_or(0))
    }

    async fn stop_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        self.record(format!("stop {}[{index}]", spec.name));
        if index == 0 {
            self.release();
        }
        Ok(())
    }

    async fn probe_healthy(&self, spec: &JobSpec, _index: usize) -> Result<bool> {
        let script = self.script_for(&spec.name);
        let started = self.state.lock().unwrap().started.get(&spec.name).copied();
        Ok(match started {
            Some(at) => at.elapsed() >= script.healthy_after,
            None => false,
        })
    }
}
