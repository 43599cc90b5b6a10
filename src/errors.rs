// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvoyError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error(
        "Unknown dependency condition '{0}' (expected service_started, service_healthy, \
         service_completed_successfully or service_failed)"
    )]
    UnknownCondition(String),

    #[error("Extends cycle detected: {0}")]
    ExtendsCycle(String),

    #[error("Cycle detected in depends_on graph: {0}")]
    DependsOnCycle(String),

    #[error("Dependency loop detected in job graph: {0}")]
    DependencyLoop(String),

    #[error("Ambiguous dependency: {0}")]
    AmbiguousCondition(String),

    #[error("Unreachable dependency: {0}")]
    UnreachableDependency(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConvoyError>;
