// src/compose/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::compose::model::{ComposeDocument, ExtendsField};
use crate::compose::resolver::{ComposeResolver, ResolvedModel};
use crate::errors::Result;

/// A set of parsed documents: the root file plus every document reachable
/// through `extends.file` references.
///
/// The loader is the only place that touches the filesystem; the resolver
/// operates purely on a `ComposeSet`, which tests can also build in memory.
#[derive(Debug, Clone)]
pub struct ComposeSet {
    /// Path of the root document (canonical for on-disk sets).
    pub root: PathBuf,
    pub docs: BTreeMap<PathBuf, ComposeDocument>,
}

impl ComposeSet {
    /// Build a set from pre-parsed documents (used by tests and builders).
    pub fn from_documents(root: PathBuf, docs: BTreeMap<PathBuf, ComposeDocument>) -> Self {
        Self { root, docs }
    }
}

/// Read the root document and every document it (transitively) references
/// via `extends.file`.
///
/// This only performs YAML deserialization and link chasing; it does **not**
/// resolve inheritance or dependencies. Use [`load_and_resolve`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ComposeSet> {
    let root = fs::canonicalize(path.as_ref())?;

    let mut docs = BTreeMap::new();
    let mut queue = vec![root.clone()];

    while let Some(path) = queue.pop() {
        if docs.contains_key(&path) {
            continue;
        }
        let doc = load_document(&path)?;

        for path in referenced_files(&path, &doc) {
            let path = fs::canonicalize(&path)?;
            if !docs.contains_key(&path) {
                queue.push(path);
            }
        }

        docs.insert(path, doc);
    }

    Ok(ComposeSet { root, docs })
}

/// Load and fully resolve a pipeline document.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads the root YAML file and any linked documents.
/// - Resolves `extends` inheritance (merge/override per property).
/// - Resolves `depends_on` into per-service transitive dependency sets.
/// - Rejects structural errors: extends cycles, depends-on cycles,
///   cross-file bases that carry their own dependencies.
pub fn load_and_resolve(path: impl AsRef<Path>) -> Result<ResolvedModel> {
    let set = load_from_path(path)?;
    ComposeResolver::new(set).resolve()
}

/// Parse a single document from a YAML string, no link chasing.
pub fn parse_document(yaml: &str) -> Result<ComposeDocument> {
    Ok(serde_yaml::from_str(yaml)?)
}

fn load_document(path: &Path) -> Result<ComposeDocument> {
    let contents = fs::read_to_string(path)?;
    let doc = parse_document(&contents)?;

    // Unknown keys are ignored with a warning, never a hard failure.
    for key in doc.unknown.keys() {
        warn!(file = %path.display(), key = %key, "ignoring unrecognised top-level key");
    }
    for (name, service) in &doc.services {
        for key in service.unknown.keys() {
            warn!(
                file = %path.display(),
                service = %name,
                key = %key,
                "ignoring unrecognised service key"
            );
        }
    }

    Ok(doc)
}

/// Collect the absolute paths of documents referenced by `extends.file`
/// from the given document.
fn referenced_files(doc_path: &Path, doc: &ComposeDocument) -> Vec<PathBuf> {
    let doc_dir = doc_path.parent().unwrap_or_else(|| Path::new("."));

    doc.services
        .values()
        .filter_map(|raw| match &raw.extends {
            Some(ExtendsField::Detailed {
                file: Some(file), ..
            }) => {
                let p = PathBuf::from(file);
                Some(if p.is_absolute() { p } else { doc_dir.join(p) })
            }
            _ => None,
        })
        .collect()
}
