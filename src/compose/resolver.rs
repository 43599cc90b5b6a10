// src/compose/resolver.rs

//! Inheritance and dependency resolution over a [`ComposeSet`].
//!
//! Two passes, in order:
//!
//! 1. `extends` merging: for each service with an `extends` clause the
//!    referenced base is resolved first (depth-first, memoized), then merged
//!    base → child with the per-property semantics of
//!    [`Service::merge_from_parent`]. A chain that revisits a service is an
//!    extends cycle; a base from a *different* document that carries its own
//!    `depends_on` is rejected (its targets may not exist in the consuming
//!    document's graph).
//! 2. `depends_on` closure: each service's dependency set is grown into its
//!    transitive closure (post-order), after a petgraph toposort over the
//!    declared edges has ruled out cycles.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::compose::loader::ComposeSet;
use crate::compose::service::{Service, ServiceKey};
use crate::errors::{ConvoyError, Result};
use crate::graph::Condition;

/// Fully resolved model: the root document's services, merged and with
/// transitive dependency sets, ready for job-graph construction.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub root: PathBuf,
    /// Root-document services by name, fully merged.
    pub services: BTreeMap<String, Service>,
}

impl ResolvedModel {
    pub fn service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| ConvoyError::ServiceNotFound(name.to_string()))
    }
}

/// Resolves a [`ComposeSet`] into a [`ResolvedModel`].
pub struct ComposeResolver {
    set: ComposeSet,
}

impl ComposeResolver {
    pub fn new(set: ComposeSet) -> Self {
        Self { set }
    }

    pub fn resolve(self) -> Result<ResolvedModel> {
        let root = self.set.root.clone();
        let mut services = instantiate_services(&self.set)?;

        // Pass 1: extends merging, every service of every document.
        let keys: Vec<ServiceKey> = services.keys().cloned().collect();
        let mut merged: BTreeSet<ServiceKey> = BTreeSet::new();
        for key in &keys {
            let mut chain = Vec::new();
            merge_extends(key, &mut services, &mut merged, &mut chain)?;
        }

        record_children(&mut services);

        // Root-document view: only its services become jobs.
        let mut root_services: BTreeMap<String, Service> = services
            .into_iter()
            .filter(|(key, _)| key.file == root)
            .map(|(key, svc)| (key.name, svc))
            .collect();

        validate_dependency_targets(&root_services)?;
        validate_no_cycles(&root_services)?;

        // Pass 2: transitive dependency closure.
        let names: Vec<String> = root_services.keys().cloned().collect();
        let mut closed: BTreeSet<String> = BTreeSet::new();
        for name in &names {
            close_dependencies(name, &mut root_services, &mut closed)?;
        }

        debug!(
            root = %root.display(),
            services = root_services.len(),
            "compose model resolved"
        );

        Ok(ResolvedModel {
            root,
            services: root_services,
        })
    }
}

fn instantiate_services(set: &ComposeSet) -> Result<BTreeMap<ServiceKey, Service>> {
    let mut services = BTreeMap::new();
    for (path, doc) in &set.docs {
        let doc_dir = path.parent().unwrap_or_else(|| Path::new("."));
        for (name, raw) in &doc.services {
            let key = ServiceKey {
                file: path.clone(),
                name: name.clone(),
            };
            let service = Service::from_raw(key.clone(), raw, doc_dir)?;
            services.insert(key, service);
        }
    }
    Ok(services)
}

/// Resolve the extends chain of `key`, depth-first and memoized, then merge
/// the base into the child.
fn merge_extends(
    key: &ServiceKey,
    services: &mut BTreeMap<ServiceKey, Service>,
    merged: &mut BTreeSet<ServiceKey>,
    chain: &mut Vec<ServiceKey>,
) -> Result<()> {
    if merged.contains(key) {
        return Ok(());
    }
    if chain.contains(key) {
        let mut cycle: Vec<String> = chain.iter().map(|k| k.name.clone()).collect();
        cycle.push(key.name.clone());
        return Err(ConvoyError::ExtendsCycle(cycle.join(" -> ")));
    }
    chain.push(key.clone());

    let extends = services
        .get(key)
        .ok_or_else(|| ConvoyError::ServiceNotFound(key.to_string()))?
        .extends
        .clone();

    if let Some(extends) = extends {
        let parent_key = ServiceKey {
            file: extends.file.clone().unwrap_or_else(|| key.file.clone()),
            name: extends.service.clone(),
        };
        if !services.contains_key(&parent_key) {
            return Err(ConvoyError::ServiceNotFound(format!(
                "'{}' extends unknown service {parent_key}",
                key.name
            )));
        }

        merge_extends(&parent_key, services, merged, chain)?;

        let parent = services[&parent_key].clone();
        if parent_key.file != key.file && !parent.depends_on.is_empty() {
            return Err(ConvoyError::UnreachableDependency(format!(
                "'{}' extends '{}' from {}, which declares depends_on; a base used across \
                 files must not carry dependencies",
                key.name,
                parent.name,
                parent_key.file.display()
            )));
        }

        let child = services
            .get_mut(key)
            .ok_or_else(|| ConvoyError::ServiceNotFound(key.to_string()))?;
        child.merge_from_parent(&parent);
        child.parents = std::iter::once(parent_key)
            .chain(parent.parents.iter().cloned())
            .collect();

        debug!(service = %key.name, base = %parent.name, "merged extends base");
    }

    chain.pop();
    merged.insert(key.clone());
    Ok(())
}

/// Record, on each same-document parent, the names of the services that
/// extend it (used for dependency forwarding).
fn record_children(services: &mut BTreeMap<ServiceKey, Service>) {
    let links: Vec<(ServiceKey, String)> = services
        .values()
        .flat_map(|svc| {
            svc.parents
                .iter()
                .filter(|p| p.file == svc.key.file)
                .map(|p| (p.clone(), svc.name.clone()))
                .collect::<Vec<_>>()
        })
        .collect();

    for (parent, child) in links {
        if let Some(parent) = services.get_mut(&parent) {
            parent.children.insert(child);
        }
    }
}

/// Every declared dependency must name a service of the root document.
fn validate_dependency_targets(services: &BTreeMap<String, Service>) -> Result<()> {
    for service in services.values() {
        for dep in service.depends_on.keys() {
            if !services.contains_key(dep) {
                return Err(ConvoyError::ServiceNotFound(format!(
                    "'{}' depends on unknown service '{dep}'",
                    service.name
                )));
            }
        }
    }
    Ok(())
}

/// Reject cycles in the declared dependency graph.
///
/// Edge direction: dependency -> dependent, so a topological sort yields
/// dependencies first and fails exactly when there is a cycle.
fn validate_no_cycles(services: &BTreeMap<String, Service>) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in services.keys() {
        graph.add_node(name.as_str());
    }
    for (name, service) in services {
        for dep in service.depends_on.keys() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ConvoyError::DependsOnCycle(format!(
            "cycle involving service '{}'",
            cycle.node_id()
        ))),
    }
}

/// Grow `name`'s dependency set into its transitive closure, post-order.
///
/// Entries already present are never overwritten: the nearest declaration
/// wins. A service that ends up depending on itself is a cycle (normally
/// caught earlier by [`validate_no_cycles`]).
fn close_dependencies(
    name: &str,
    services: &mut BTreeMap<String, Service>,
    closed: &mut BTreeSet<String>,
) -> Result<()> {
    if closed.contains(name) {
        return Ok(());
    }
    // Insert before recursing; the toposort above guarantees we cannot
    // actually re-enter, this just keeps the recursion finite regardless.
    closed.insert(name.to_string());

    let direct: Vec<String> = services
        .get(name)
        .map(|s| s.depends_on.keys().cloned().collect())
        .unwrap_or_default();

    let mut inherited: BTreeMap<String, Condition> = BTreeMap::new();
    for dep in direct {
        close_dependencies(&dep, services, closed)?;
        if let Some(dep_service) = services.get(&dep) {
            for (transitive, condition) in &dep_service.depends_on {
                inherited.entry(transitive.clone()).or_insert(*condition);
            }
        }
    }

    if let Some(service) = services.get_mut(name) {
        for (dep, condition) in inherited {
            service.depends_on.entry(dep).or_insert(condition);
        }
        if service.depends_on.contains_key(name) {
            return Err(ConvoyError::DependsOnCycle(format!(
                "service '{name}' transitively depends on itself"
            )));
        }
    }

    Ok(())
}
