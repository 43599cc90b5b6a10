// src/graph/pipeline.rs

//! The pipeline's job table.
//!
//! Jobs live in a plain `Vec` indexed by [`JobId`]; dependency and dependent
//! edges are id-keyed maps on the jobs themselves, kept mutually consistent
//! by routing every edge removal through [`Pipeline::remove_edge`]. Built
//! once by the graph builder, mutated only by the scheduler for the life of
//! the run.

use std::collections::BTreeMap;

use crate::graph::job::{Job, JobId};
use crate::graph::Condition;

#[derive(Debug, Clone)]
pub struct Pipeline {
    jobs: Vec<Job>,
    index: BTreeMap<String, JobId>,
}

impl Pipeline {
    pub fn new(jobs: Vec<Job>) -> Self {
        let index = jobs
            .iter()
            .map(|job| (job.name.clone(), job.id))
            .collect();
        Self { jobs, index }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job(&self, id: JobId) -> &Job {
        &self.jobs[id]
    }

    pub fn job_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id]
    }

    pub fn by_name(&self, name: &str) -> Option<&Job> {
        self.index.get(name).map(|&id| &self.jobs[id])
    }

    pub fn id_of(&self, name: &str) -> Option<JobId> {
        self.index.get(name).copied()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|j| j.name.as_str())
    }

    /// Remove the edge `dependent --requires--> dependency` from both maps.
    ///
    /// Returns the condition the dependent was waiting for, if the edge
    /// existed.
    pub fn remove_edge(&mut self, dependent: JobId, dependency: JobId) -> Option<Condition> {
        let condition = self.jobs[dependent].dependencies.remove(&dependency);
        if condition.is_some() {
            self.jobs[dependency].dependents.remove(&dependent);
        }
        condition
    }
}
