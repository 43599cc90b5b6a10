// src/compose/service.rs

//! Resolved service representation.
//!
//! A [`Service`] is one named entry of a document after per-field
//! normalisation: multi-shape YAML fields are collapsed into canonical types,
//! relative paths are anchored at the declaring document, and `depends_on`
//! conditions are validated. `extends` merging and transitive dependency
//! resolution mutate services in place and are driven by
//! [`crate::compose::resolver`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compose::model::{
    BuildField, DependsOnField, ExtendsField, RawHealthcheck, RawService, StringOrList,
};
use crate::errors::{ConvoyError, Result};
use crate::graph::Condition;

/// Identity of a service: the document it was declared in plus its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey {
    pub file: PathBuf,
    pub name: String,
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.name)
    }
}

/// Resolved `build` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Build context directory, absolute.
    pub context: PathBuf,
    pub dockerfile: Option<String>,
}

/// Resolved entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entrypoint {
    /// A single blank string in the document: reset the inherited entrypoint
    /// to none.
    Reset,
    Command(Vec<String>),
}

impl Entrypoint {
    pub fn is_reset(&self) -> bool {
        matches!(self, Entrypoint::Reset)
    }
}

/// Resolved `source:target` volume mapping, source absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub source: PathBuf,
    pub target: String,
}

/// Resolved healthcheck settings with compose-ish defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Healthcheck {
    pub disabled: bool,
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
    pub start_period: Duration,
}

impl Default for Healthcheck {
    fn default() -> Self {
        Self {
            disabled: false,
            test: Vec::new(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
            retries: 3,
            start_period: Duration::ZERO,
        }
    }
}

/// One fully normalised service.
///
/// Invariant maintained by the resolver: the property set is fully merged
/// (no inheritance pending) before dependency or job resolution reads it.
#[derive(Debug, Clone)]
pub struct Service {
    pub key: ServiceKey,
    pub name: String,

    /// Declared `extends` reference, if any (consumed by the resolver).
    pub extends: Option<ExtendsRef>,

    /// Parent chain from `extends`, nearest first. Filled by the resolver.
    pub parents: Vec<ServiceKey>,

    /// Services (in the same document) that extend this one. Filled by the
    /// resolver.
    pub children: BTreeSet<String>,

    /// Dependency set, keyed by service name within the owning document.
    ///
    /// Starts as the declared (and extends-merged) set; the resolver grows it
    /// into the merge-safe transitive closure.
    pub depends_on: BTreeMap<String, Condition>,

    pub build: Option<Build>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Entrypoint>,
    pub env_files: Vec<PathBuf>,
    pub environment: Vec<String>,
    pub expose: Vec<String>,
    pub group_add: Vec<String>,
    pub healthcheck: Option<Healthcheck>,
    pub image: Option<String>,
    pub labels: Vec<String>,
    pub profiles: Vec<String>,
    pub scale: u32,
    pub user: Option<String>,
    pub volumes: Vec<Volume>,
    pub working_dir: Option<String>,
}

/// Normalised `extends` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendsRef {
    /// Referenced document, absolute; `None` means the declaring document.
    pub file: Option<PathBuf>,
    pub service: String,
}

impl Service {
    /// Build a service from its raw document entry.
    ///
    /// `doc_dir` is the directory of the declaring document; `env_file` and
    /// volume sources are resolved against it.
    pub fn from_raw(key: ServiceKey, raw: &RawService, doc_dir: &Path) -> Result<Self> {
        let depends_on = parse_depends_on(&key.name, raw.depends_on.as_ref())?;

        let build = raw.build.as_ref().map(|b| match b {
            BuildField::Context(context) => Build {
                context: absolutize(doc_dir, context),
                dockerfile: None,
            },
            BuildField::Detailed {
                context,
                dockerfile,
            } => Build {
                context: absolutize(doc_dir, context),
                dockerfile: dockerfile.clone(),
            },
        });

        let entrypoint = raw.entrypoint.clone().map(|e| {
            let parts = e.into_vec();
            if parts.len() == 1 && parts[0].trim().is_empty() {
                Entrypoint::Reset
            } else {
                Entrypoint::Command(parts)
            }
        });

        let command = raw.command.clone().map(|c| match c {
            StringOrList::One(s) => s.split_whitespace().map(str::to_string).collect(),
            StringOrList::Many(v) => v,
        });

        let env_files = raw
            .env_file
            .clone()
            .map(StringOrList::into_vec)
            .unwrap_or_default()
            .iter()
            .map(|p| absolutize(doc_dir, p))
            .collect();

        let volumes = raw
            .volumes
            .clone()
            .unwrap_or_default()
            .iter()
            .map(|v| parse_volume(&key.name, v, doc_dir))
            .collect::<Result<Vec<_>>>()?;

        let extends = raw.extends.clone().map(|e| match e {
            ExtendsField::Service(service) => ExtendsRef {
                file: None,
                service,
            },
            ExtendsField::Detailed { file, service } => ExtendsRef {
                file: file.map(|f| absolutize(doc_dir, &f)),
                service,
            },
        });

        let healthcheck = raw
            .healthcheck
            .as_ref()
            .map(|h| parse_healthcheck(&key.name, h))
            .transpose()?;

        Ok(Self {
            name: key.name.clone(),
            key,
            extends,
            parents: Vec::new(),
            children: BTreeSet::new(),
            depends_on,
            build,
            command,
            entrypoint,
            env_files,
            environment: raw
                .environment
                .clone()
                .map(|e| e.into_entries())
                .unwrap_or_default(),
            expose: raw.expose.clone().unwrap_or_default(),
            group_add: raw.group_add.clone().unwrap_or_default(),
            healthcheck,
            image: raw.image.clone(),
            labels: raw
                .labels
                .clone()
                .map(|l| l.into_entries())
                .unwrap_or_default(),
            profiles: raw.profiles.clone().unwrap_or_default(),
            scale: raw.scale.unwrap_or(1).max(1),
            user: raw.user.clone(),
            volumes,
            working_dir: raw.working_dir.clone(),
        })
    }

    /// Abstract services (`.`-prefixed) never execute; they are inheritance
    /// and dependency-forwarding anchors.
    pub fn is_abstract(&self) -> bool {
        self.name.starts_with('.')
    }

    /// A build-only service is complete once built: it has a build step, a
    /// resolved image tag, an explicitly reset entrypoint, and no command.
    pub fn is_build_only(&self) -> bool {
        self.build.is_some()
            && self.image.is_some()
            && self.entrypoint.as_ref().is_some_and(Entrypoint::is_reset)
            && self.command.is_none()
    }

    /// Merge a fully-resolved parent into this service:
    ///
    /// - scalar properties: keep the child's value, inherit otherwise;
    /// - list properties: parent entries are *prepended*, nothing deduped;
    /// - `depends_on`: merged by key, the child's entry is never overwritten.
    pub fn merge_from_parent(&mut self, parent: &Service) {
        if self.build.is_none() {
            self.build = parent.build.clone();
        }
        if self.image.is_none() {
            self.image = parent.image.clone();
        }
        if self.healthcheck.is_none() {
            self.healthcheck = parent.healthcheck.clone();
        }
        if self.user.is_none() {
            self.user = parent.user.clone();
        }
        if self.working_dir.is_none() {
            self.working_dir = parent.working_dir.clone();
        }
        if self.command.is_none() {
            self.command = parent.command.clone();
        }
        if self.entrypoint.is_none() {
            self.entrypoint = parent.entrypoint.clone();
        }

        prepend(&mut self.env_files, &parent.env_files);
        prepend(&mut self.environment, &parent.environment);
        prepend(&mut self.expose, &parent.expose);
        prepend(&mut self.group_add, &parent.group_add);
        prepend(&mut self.labels, &parent.labels);
        prepend(&mut self.volumes, &parent.volumes);
        prepend(&mut self.profiles, &parent.profiles);

        for (dep, condition) in &parent.depends_on {
            self.depends_on
                .entry(dep.clone())
                .or_insert(*condition);
        }
    }
}

fn prepend<T: Clone>(own: &mut Vec<T>, parent: &[T]) {
    let mut merged = parent.to_vec();
    merged.append(own);
    *own = merged;
}

fn absolutize(doc_dir: &Path, path: &str) -> PathBuf {
    let p = PathBuf::from(path);
    if p.is_absolute() {
        p
    } else {
        doc_dir.join(p)
    }
}

fn parse_depends_on(
    service: &str,
    field: Option<&DependsOnField>,
) -> Result<BTreeMap<String, Condition>> {
    let mut deps = BTreeMap::new();
    match field {
        None => {}
        Some(DependsOnField::One(name)) => {
            deps.insert(name.clone(), Condition::ServiceStarted);
        }
        Some(DependsOnField::Many(names)) => {
            for name in names {
                deps.insert(name.clone(), Condition::ServiceStarted);
            }
        }
        Some(DependsOnField::Detailed(map)) => {
            for (name, spec) in map {
                let condition = match &spec.condition {
                    None => Condition::ServiceStarted,
                    Some(s) => s
                        .parse()
                        .map_err(|_| ConvoyError::UnknownCondition(format!("{service}: {s}")))?,
                };
                deps.insert(name.clone(), condition);
            }
        }
    }
    Ok(deps)
}

fn parse_volume(service: &str, entry: &str, doc_dir: &Path) -> Result<Volume> {
    match entry.split_once(':') {
        Some((source, target)) if !source.is_empty() && !target.is_empty() => Ok(Volume {
            source: absolutize(doc_dir, source),
            target: target.to_string(),
        }),
        _ => Err(ConvoyError::ConfigError(format!(
            "service '{service}': volume '{entry}' must be 'source:target'"
        ))),
    }
}

fn parse_healthcheck(service: &str, raw: &RawHealthcheck) -> Result<Healthcheck> {
    let defaults = Healthcheck::default();
    Ok(Healthcheck {
        disabled: raw.disable,
        test: raw.test.clone().map(StringOrList::into_vec).unwrap_or_default(),
        interval: parse_opt_duration(service, raw.interval.as_deref(), defaults.interval)?,
        timeout: parse_opt_duration(service, raw.timeout.as_deref(), defaults.timeout)?,
        retries: raw.retries.unwrap_or(defaults.retries),
        start_period: parse_opt_duration(
            service,
            raw.start_period.as_deref(),
            defaults.start_period,
        )?,
    })
}

fn parse_opt_duration(service: &str, s: Option<&str>, default: Duration) -> Result<Duration> {
    match s {
        None => Ok(default),
        Some(s) => parse_duration(s).ok_or_else(|| {
            ConvoyError::ConfigError(format!(
                "service '{service}': invalid duration '{s}' (expected e.g. 500ms, 5s, 2m, 1h)"
            ))
        }),
    }
}

/// Parse durations like `"500ms"`, `"5s"`, `"2m"`, `"1h"`; bare digits are
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        None => (s, "s"),
        Some(idx) => s.split_at(idx),
    };
    let value: u64 = value.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}
