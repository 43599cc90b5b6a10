// src/graph/builder.rs

//! Job-graph construction from a resolved compose model.
//!
//! Responsible for:
//! - instantiating job drafts 1:1 with the root document's services
//! - forwarding dependency edges through extends children and abstract
//!   services
//! - target/skip election (which jobs actually run)
//! - dependency leveling (longest path, diamond-safe) and auto-stop flagging

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::compose::resolver::ResolvedModel;
use crate::compose::service::Service;
use crate::errors::{ConvoyError, Result};
use crate::graph::job::{Job, JobSpec};
use crate::graph::pipeline::Pipeline;
use crate::graph::Condition;

/// Job/skip selection, names as given on the selection surface.
///
/// Abstract (`.`-prefixed) names expand to their non-abstract children; an
/// empty target set means "every non-abstract job".
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub targets: Vec<String>,
    pub skips: Vec<String>,
}

/// Build the executable [`Pipeline`] from a resolved model.
pub fn build_pipeline(model: &ResolvedModel, selection: &Selection) -> Result<Pipeline> {
    let mut drafts = instantiate_drafts(model);

    forward_dependencies(model, &mut drafts)?;
    drop_abstract_edges(&mut drafts);
    fill_dependents(&mut drafts);

    elect(model, &mut drafts, &selection.targets)?;
    skip(model, &mut drafts, &selection.skips)?;

    // Abstract jobs have been redistributed, non-elected jobs are not
    // wanted: delete both and scrub any edge that still references them.
    let removed: BTreeSet<String> = drafts
        .iter()
        .filter(|(name, d)| !d.elected || is_abstract(name))
        .map(|(name, _)| name.clone())
        .collect();
    for name in &removed {
        drafts.remove(name);
    }
    for draft in drafts.values_mut() {
        draft.dependencies.retain(|dep, _| !removed.contains(dep));
        draft.dependents.retain(|dep, _| !removed.contains(dep));
    }

    let levels = compute_levels(&drafts)?;
    materialize(model, drafts, levels)
}

#[derive(Debug, Clone, Default)]
struct Draft {
    dependencies: BTreeMap<String, Condition>,
    dependents: BTreeMap<String, Condition>,
    elected: bool,
}

fn is_abstract(name: &str) -> bool {
    name.starts_with('.')
}

fn instantiate_drafts(model: &ResolvedModel) -> BTreeMap<String, Draft> {
    model
        .services
        .keys()
        .map(|name| (name.clone(), Draft::default()))
        .collect()
}

/// Resolve every `(dependency service, condition)` pair into effective
/// job-level edges.
fn forward_dependencies(
    model: &ResolvedModel,
    drafts: &mut BTreeMap<String, Draft>,
) -> Result<()> {
    let names: Vec<String> = model.services.keys().cloned().collect();
    for name in names {
        let declared: Vec<(String, Condition)> = model.services[&name]
            .depends_on
            .iter()
            .map(|(dep, c)| (dep.clone(), *c))
            .collect();
        for (dep, condition) in declared {
            forward_one(model, drafts, &name, &dep, condition)?;
        }
    }
    Ok(())
}

/// Forward a single dependency request (spec order):
///
/// 1. a dependency with extends children redirects to every child (depending
///    on a base template means depending on all its concrete variants);
/// 2. an abstract dependency without children redirects to *its* own
///    dependencies, carrying the more relevant of the two conditions;
/// 3. otherwise the edge is recorded directly, with relevance override and
///    success/failure ambiguity detection.
fn forward_one(
    model: &ResolvedModel,
    drafts: &mut BTreeMap<String, Draft>,
    from: &str,
    target: &str,
    condition: Condition,
) -> Result<()> {
    let target_service: &Service = model
        .services
        .get(target)
        .ok_or_else(|| ConvoyError::ServiceNotFound(target.to_string()))?;

    if !target_service.children.is_empty() {
        for child in target_service.children.clone() {
            forward_one(model, drafts, from, &child, condition)?;
        }
        return Ok(());
    }

    if target_service.is_abstract() && !target_service.depends_on.is_empty() {
        for (transitive, transitive_condition) in target_service.depends_on.clone() {
            forward_one(
                model,
                drafts,
                from,
                &transitive,
                condition.most_relevant(transitive_condition),
            )?;
        }
        return Ok(());
    }

    record_edge(drafts, from, target, condition)
}

fn record_edge(
    drafts: &mut BTreeMap<String, Draft>,
    from: &str,
    target: &str,
    condition: Condition,
) -> Result<()> {
    let draft = drafts
        .get_mut(from)
        .ok_or_else(|| ConvoyError::ServiceNotFound(from.to_string()))?;

    match draft.dependencies.get(target).copied() {
        None => {
            draft.dependencies.insert(target.to_string(), condition);
        }
        Some(existing) if existing == condition => {}
        Some(existing) if existing.conflicts_with(condition) => {
            return Err(ConvoyError::AmbiguousCondition(format!(
                "'{from}' requires both {existing} and {condition} of '{target}'"
            )));
        }
        Some(existing) => {
            let winner = existing.most_relevant(condition);
            if winner != existing {
                debug!(
                    job = %from,
                    dependency = %target,
                    old = %existing,
                    new = %winner,
                    "overriding dependency condition with more relevant one"
                );
                draft.dependencies.insert(target.to_string(), winner);
            }
        }
    }
    Ok(())
}

/// Drop any residual edge still pointing at an abstract job: forwarding has
/// already redistributed the request (an abstract leaf with no dependencies
/// simply dissolves).
fn drop_abstract_edges(drafts: &mut BTreeMap<String, Draft>) {
    for draft in drafts.values_mut() {
        draft.dependencies.retain(|dep, _| !is_abstract(dep));
    }
}

fn fill_dependents(drafts: &mut BTreeMap<String, Draft>) {
    let edges: Vec<(String, String, Condition)> = drafts
        .iter()
        .flat_map(|(name, d)| {
            d.dependencies
                .iter()
                .map(|(dep, c)| (name.clone(), dep.clone(), *c))
                .collect::<Vec<_>>()
        })
        .collect();

    for (dependent, dependency, condition) in edges {
        if let Some(dep_draft) = drafts.get_mut(&dependency) {
            dep_draft.dependents.insert(dependent, condition);
        }
    }
}

/// Expand a selection name set: abstract names become their non-abstract
/// children (recursively), concrete names pass through unchanged.
fn expand_names(model: &ResolvedModel, names: &[String]) -> Result<BTreeSet<String>> {
    let mut expanded = BTreeSet::new();
    let mut queue: Vec<String> = names.to_vec();

    while let Some(name) = queue.pop() {
        let service = model
            .services
            .get(&name)
            .ok_or_else(|| ConvoyError::ServiceNotFound(name.clone()))?;
        if service.is_abstract() {
            queue.extend(service.children.iter().cloned());
        } else {
            expanded.insert(name);
        }
    }
    Ok(expanded)
}

/// Election is a closure: each target is elected, then its dependencies are
/// elected recursively, so a target always pulls in its full transitive
/// dependency set and nothing more.
fn elect(
    model: &ResolvedModel,
    drafts: &mut BTreeMap<String, Draft>,
    targets: &[String],
) -> Result<()> {
    let roots: Vec<String> = if targets.is_empty() {
        drafts
            .keys()
            .filter(|name| !is_abstract(name))
            .cloned()
            .collect()
    } else {
        expand_names(model, targets)?.into_iter().collect()
    };

    let mut queue = roots;
    while let Some(name) = queue.pop() {
        let draft = drafts
            .get_mut(&name)
            .ok_or_else(|| ConvoyError::ServiceNotFound(name.clone()))?;
        if draft.elected {
            continue;
        }
        draft.elected = true;
        queue.extend(drafts[&name].dependencies.keys().cloned());
    }
    Ok(())
}

/// Un-elect skipped jobs and remove every edge pointing at them; their
/// dependents keep running, simply without that edge.
fn skip(
    model: &ResolvedModel,
    drafts: &mut BTreeMap<String, Draft>,
    skips: &[String],
) -> Result<()> {
    if skips.is_empty() {
        return Ok(());
    }

    for name in expand_names(model, skips)? {
        let Some(draft) = drafts.get_mut(&name) else {
            continue;
        };
        draft.elected = false;
        let dependents: Vec<String> = draft.dependents.keys().cloned().collect();
        draft.dependents.clear();

        for dependent in dependents {
            if let Some(dep_draft) = drafts.get_mut(&dependent) {
                dep_draft.dependencies.remove(&name);
                debug!(job = %dependent, skipped = %name, "removed edge to skipped job");
            }
        }
    }
    Ok(())
}

/// Longest-path depth per job, depth-first carrying the *current path* so
/// diamond dependencies are not mistaken for cycles.
fn compute_levels(drafts: &BTreeMap<String, Draft>) -> Result<BTreeMap<String, usize>> {
    let mut levels: BTreeMap<String, usize> = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();

    fn visit(
        name: &str,
        drafts: &BTreeMap<String, Draft>,
        levels: &mut BTreeMap<String, usize>,
        path: &mut Vec<String>,
    ) -> Result<usize> {
        if let Some(&level) = levels.get(name) {
            return Ok(level);
        }
        if path.iter().any(|p| p == name) {
            let mut cycle = path.clone();
            cycle.push(name.to_string());
            return Err(ConvoyError::DependencyLoop(cycle.join(" -> ")));
        }

        path.push(name.to_string());
        let mut level = 0;
        if let Some(draft) = drafts.get(name) {
            for dep in draft.dependencies.keys() {
                level = level.max(1 + visit(dep, drafts, levels, path)?);
            }
        }
        path.pop();

        levels.insert(name.to_string(), level);
        Ok(level)
    }

    for name in drafts.keys() {
        visit(name, drafts, &mut levels, &mut path)?;
    }
    Ok(levels)
}

fn materialize(
    model: &ResolvedModel,
    drafts: BTreeMap<String, Draft>,
    levels: BTreeMap<String, usize>,
) -> Result<Pipeline> {
    let ids: BTreeMap<String, usize> = drafts
        .keys()
        .enumerate()
        .map(|(id, name)| (name.clone(), id))
        .collect();

    let mut jobs = Vec::with_capacity(drafts.len());
    for (name, draft) in &drafts {
        let service = model.service(name)?;
        let mut job = Job::new(ids[name], JobSpec::from_service(service));

        job.dependencies = draft
            .dependencies
            .iter()
            .map(|(dep, c)| (ids[dep], *c))
            .collect();
        job.dependents = draft
            .dependents
            .iter()
            .map(|(dep, c)| (ids[dep], *c))
            .collect();
        job.static_dependencies = job.dependencies.keys().copied().collect();
        job.remaining_dependents = job.dependents.keys().copied().collect();
        job.level = levels.get(name).copied().unwrap_or(0);

        // Auto-stop: dependents only need liveness (started/healthy), never
        // an outcome (success/failure).
        let conditions: Vec<Condition> = job.dependents.values().copied().collect();
        job.auto_stop = conditions.iter().any(|c| c.is_liveness())
            && conditions.iter().all(|c| c.is_liveness());

        debug!(
            job = %name,
            level = job.level,
            auto_stop = job.auto_stop,
            dependencies = job.dependencies.len(),
            "materialized job"
        );
        jobs.push(job);
    }

    Ok(Pipeline::new(jobs))
}
