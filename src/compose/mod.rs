// src/compose/mod.rs

//! Compose document model and resolution.
//!
//! - [`model`] is the raw serde mapping of the YAML document.
//! - [`service`] is the normalised per-service representation.
//! - [`loader`] reads the root document and any `extends.file`-linked
//!   documents from disk.
//! - [`resolver`] merges `extends` inheritance and resolves `depends_on`
//!   into per-service transitive dependency sets.

pub mod loader;
pub mod model;
pub mod resolver;
pub mod service;

pub use loader::{load_and_resolve, load_from_path, parse_document, ComposeSet};
pub use model::ComposeDocument;
pub use resolver::{ComposeResolver, ResolvedModel};
pub use service::{Service, ServiceKey};
