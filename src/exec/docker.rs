// src/exec/docker.rs

//! Container adapter backed by the `docker` CLI.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::compose::service::Entrypoint;
use crate::graph::JobSpec;

use super::ContainerAdapter;

/// Production adapter: every operation shells out to `docker`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    project: String,
}

impl DockerCli {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            program: "docker".to_string(),
            project: project.into(),
        }
    }

    /// Compose-style container name: `<project>-<job>-<replica>`.
    fn container_name(&self, spec: &JobSpec, index: usize) -> String {
        format!("{}-{}-{}", self.project, spec.name, index + 1)
    }

    /// Image reference: the declared image, or a project-local tag for jobs
    /// that only have a build section.
    fn image_ref(&self, spec: &JobSpec) -> String {
        spec.image
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.project, spec.name))
    }

    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, ?args, "running container command");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning '{} {}'", self.program, args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{} {}' failed: {}",
                self.program,
                args.join(" "),
                stderr.trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn create_args(&self, spec: &JobSpec, index: usize) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            self.container_name(spec, index),
        ];

        for file in &spec.env_files {
            args.push("--env-file".to_string());
            args.push(file.display().to_string());
        }
        for entry in &spec.environment {
            args.push("--env".to_string());
            args.push(entry.clone());
        }
        for port in &spec.expose {
            args.push("--expose".to_string());
            args.push(port.clone());
        }
        for group in &spec.group_add {
            args.push("--group-add".to_string());
            args.push(group.clone());
        }
        for label in &spec.labels {
            args.push("--label".to_string());
            args.push(label.clone());
        }
        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        for volume in &spec.volumes {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", volume.source.display(), volume.target));
        }
        if let Some(dir) = &spec.working_dir {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }

        if let Some(healthcheck) = &spec.healthcheck {
            if healthcheck.disabled {
                args.push("--no-healthcheck".to_string());
            } else if !healthcheck.test.is_empty() {
                args.push("--health-cmd".to_string());
                args.push(healthcheck.test.join(" "));
                args.push("--health-interval".to_string());
                args.push(format!("{}s", healthcheck.interval.as_secs()));
                args.push("--health-timeout".to_string());
                args.push(format!("{}s", healthcheck.timeout.as_secs()));
                args.push("--health-retries".to_string());
                args.push(healthcheck.retries.to_string());
                args.push("--health-start-period".to_string());
                args.push(format!("{}s", healthcheck.start_period.as_secs()));
            }
        }

        // The entrypoint and command land after the image reference; a reset
        // entrypoint maps to docker's empty-string form.
        let mut trailing: Vec<String> = Vec::new();
        match &spec.entrypoint {
            Some(Entrypoint::Reset) => {
                args.push("--entrypoint".to_string());
                args.push(String::new());
            }
            Some(Entrypoint::Command(parts)) if !parts.is_empty() => {
                args.push("--entrypoint".to_string());
                args.push(parts[0].clone());
                trailing.extend(parts[1..].iter().cloned());
            }
            Some(Entrypoint::Command(_)) | None => {}
        }

        args.push(self.image_ref(spec));
        args.extend(trailing);
        if let Some(command) = &spec.command {
            args.extend(command.iter().cloned());
        }
        args
    }
}

#[async_trait]
impl ContainerAdapter for DockerCli {
    async fn pull_image(&self, spec: &JobSpec) -> Result<()> {
        let Some(image) = &spec.image else {
            return Ok(());
        };
        self.run(&["pull".to_string(), image.clone()]).await?;
        Ok(())
    }

    async fn build_image(&self, spec: &JobSpec) -> Result<()> {
        let Some(build) = &spec.build else {
            return Ok(());
        };
        let mut args = vec![
            "build".to_string(),
            "--tag".to_string(),
            self.image_ref(spec),
        ];
        if let Some(dockerfile) = &build.dockerfile {
            args.push("--file".to_string());
            args.push(build.context.join(dockerfile).display().to_string());
        }
        args.push(build.context.display().to_string());
        self.run(&args).await?;
        Ok(())
    }

    async fn create_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        // Leftovers from an aborted run would collide on the name.
        let _ = self
            .run(&[
                "rm".to_string(),
                "--force".to_string(),
                self.container_name(spec, index),
            ])
            .await;
        self.run(&self.create_args(spec, index)).await?;
        Ok(())
    }

    async fn start_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        self.run(&["start".to_string(), self.container_name(spec, index)])
            .await?;
        Ok(())
    }

    async fn wait_container(&self, spec: &JobSpec, index: usize) -> Result<i64> {
        let stdout = self
            .run(&["wait".to_string(), self.container_name(spec, index)])
            .await?;
        stdout
            .parse::<i64>()
            .with_context(|| format!("parsing exit code from 'docker wait': {stdout:?}"))
    }

    async fn stop_container(&self, spec: &JobSpec, index: usize) -> Result<()> {
        self.run(&["stop".to_string(), self.container_name(spec, index)])
            .await?;
        Ok(())
    }

    async fn probe_healthy(&self, spec: &JobSpec, index: usize) -> Result<bool> {
        let status = self
            .run(&[
                "inspect".to_string(),
                "--format".to_string(),
                "{{.State.Health.Status}}".to_string(),
                self.container_name(spec, index),
            ])
            .await?;
        Ok(status == "healthy")
    }
}
