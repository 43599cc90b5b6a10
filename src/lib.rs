// src/lib.rs

pub mod cli;
pub mod compose;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::compose::load_and_resolve;
use crate::engine::{PipelineEvent, Runtime, RuntimeOptions};
use crate::exec::DockerCli;
use crate::graph::{build_pipeline, Pipeline, Selection};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - document loading and resolution
/// - job graph construction (election, leveling)
/// - scheduler / runtime
/// - container adapter
/// - Ctrl-C handling
///
/// Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let path = PathBuf::from(&args.file);
    let model = load_and_resolve(&path)?;

    let selection = Selection {
        targets: args.target.clone(),
        skips: args.skip.clone(),
    };
    let pipeline = build_pipeline(&model, &selection)?;

    if args.dry_run {
        print_dry_run(&pipeline);
        return Ok(0);
    }

    let options = RuntimeOptions {
        concurrency: args.concurrency,
        job_timeout: Duration::from_secs(args.timeout),
    };
    let project = args.project.clone().unwrap_or_else(|| project_name(&path));
    info!(project = %project, jobs = pipeline.len(), "starting pipeline");

    let adapter = Arc::new(DockerCli::new(project));
    let runtime = Runtime::new(pipeline, options, adapter);

    // Ctrl-C → graceful shutdown.
    {
        let tx = runtime.event_sender();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(PipelineEvent::ShutdownRequested).await;
        });
    }

    let report = runtime.run().await?;
    println!("{report}");
    Ok(report.exit_code())
}

/// Default project name: the directory containing the document.
fn project_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .and_then(|p| {
            p.parent()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "convoy".to_string())
}

/// Simple dry-run output: jobs in dependency-level order with their edges.
fn print_dry_run(pipeline: &Pipeline) {
    println!("convoy dry-run");
    println!("jobs ({}):", pipeline.len());

    let mut jobs: Vec<_> = pipeline.jobs().collect();
    jobs.sort_by_key(|job| (job.level, job.name.clone()));

    for job in jobs {
        println!("  - {} (level {})", job.name, job.level);
        for (dep, condition) in &job.dependencies {
            println!("      needs: {} ({})", pipeline.job(*dep).name, condition);
        }
        if job.spec.build_only {
            println!("      build-only");
        }
        if job.spec.scale > 1 {
            println!("      scale: {}", job.spec.scale);
        }
        if job.auto_stop {
            println!("      auto-stop: stopped once no dependent needs it");
        }
    }
}
