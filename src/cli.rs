// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `convoy`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "convoy",
    version,
    about = "Run container job pipelines from compose-style documents.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline document (YAML).
    #[arg(long, short = 'f', value_name = "PATH", default_value = "convoy.yml")]
    pub file: String,

    /// Run only these jobs and their transitive dependencies (repeatable).
    ///
    /// Abstract (`.`-prefixed) names select all their concrete variants.
    /// Without targets, every concrete job runs.
    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub target: Vec<String>,

    /// Leave these jobs out entirely; their dependents run without waiting
    /// for them (repeatable).
    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Maximum number of simultaneously running jobs.
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub concurrency: usize,

    /// Per-job timeout in seconds; a job exceeding it is stopped and fails.
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    pub timeout: u64,

    /// Project name used to scope container names.
    ///
    /// Defaults to the name of the directory containing the document.
    #[arg(long, value_name = "NAME")]
    pub project: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONVOY_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + resolve, print the job graph, but don't run any containers.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
