// src/graph/mod.rs

//! Job graph construction.
//!
//! - [`condition`] defines dependency conditions and their relevance ranking.
//! - [`job`] holds job metadata, specs and the status state machine.
//! - [`pipeline`] is the indexed job table the scheduler mutates at runtime.
//! - [`builder`] turns a resolved compose model into a [`Pipeline`]:
//!   dependency forwarding, target/skip election, leveling, auto-stop.

pub mod builder;
pub mod condition;
pub mod job;
pub mod pipeline;

pub use builder::{build_pipeline, Selection};
pub use condition::Condition;
pub use job::{Job, JobId, JobInstance, JobSpec, JobStatus, ScheduledJob};
pub use pipeline::Pipeline;
