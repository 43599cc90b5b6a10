#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use convoy::compose::{ComposeDocument, ComposeResolver, ComposeSet, ResolvedModel};
use convoy::errors::Result;
use convoy::graph::{build_pipeline, Pipeline, Selection};

/// Default path used for the root document of in-memory sets.
pub const ROOT_DOC: &str = "/pipeline/convoy.yml";

/// Builder for in-memory [`ComposeSet`]s, one YAML string per document.
///
/// The first added document becomes the root unless `root` is called.
pub struct ComposeSetBuilder {
    root: Option<PathBuf>,
    docs: BTreeMap<PathBuf, ComposeDocument>,
}

impl ComposeSetBuilder {
    pub fn new() -> Self {
        Self {
            root: None,
            docs: BTreeMap::new(),
        }
    }

    /// Add a document at the given (absolute) path.
    pub fn doc(mut self, path: &str, yaml: &str) -> Self {
        let parsed: ComposeDocument = convoy::compose::parse_document(yaml)
            .unwrap_or_else(|e| panic!("invalid YAML for {path}: {e}"));
        let path = PathBuf::from(path);
        if self.root.is_none() {
            self.root = Some(path.clone());
        }
        self.docs.insert(path, parsed);
        self
    }

    pub fn root(mut self, path: &str) -> Self {
        self.root = Some(PathBuf::from(path));
        self
    }

    pub fn build(self) -> ComposeSet {
        let root = self.root.expect("builder needs at least one document");
        ComposeSet::from_documents(root, self.docs)
    }

    pub fn try_resolve(self) -> Result<ResolvedModel> {
        ComposeResolver::new(self.build()).resolve()
    }

    pub fn resolve(self) -> ResolvedModel {
        self.try_resolve().expect("document set should resolve")
    }
}

impl Default for ComposeSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a single-document pipeline written inline.
pub fn resolve_yaml(yaml: &str) -> ResolvedModel {
    ComposeSetBuilder::new().doc(ROOT_DOC, yaml).resolve()
}

/// Like [`resolve_yaml`] but surfacing resolution errors.
pub fn try_resolve_yaml(yaml: &str) -> Result<ResolvedModel> {
    ComposeSetBuilder::new().doc(ROOT_DOC, yaml).try_resolve()
}

/// Resolve and build the full job pipeline with no targets or skips.
pub fn pipeline_from_yaml(yaml: &str) -> Pipeline {
    build_pipeline(&resolve_yaml(yaml), &Selection::default())
        .expect("pipeline should build")
}

/// Resolve and build with an explicit selection.
pub fn pipeline_with_selection(yaml: &str, targets: &[&str], skips: &[&str]) -> Result<Pipeline> {
    let selection = Selection {
        targets: targets.iter().map(|s| s.to_string()).collect(),
        skips: skips.iter().map(|s| s.to_string()).collect(),
    };
    build_pipeline(&resolve_yaml(yaml), &selection)
}
