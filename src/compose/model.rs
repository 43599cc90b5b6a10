// src/compose/model.rs

//! Raw document model as read from a compose YAML file.
//!
//! This is a direct mapping of the on-disk format:
//!
//! ```yaml
//! services:
//!   web:
//!     image: nginx:alpine
//!     depends_on:
//!       db:
//!         condition: service_healthy
//!   db:
//!     image: postgres:16
//!     healthcheck:
//!       test: ["CMD", "pg_isready"]
//! ```
//!
//! Several properties accept more than one YAML shape (string or list,
//! list or map); those are modelled as untagged enums here and normalised
//! in [`crate::compose::service`]. Unknown keys are captured and warned
//! about, never rejected.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level document: a `services` map plus anything we don't understand.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComposeDocument {
    /// All services, keyed by name. Names starting with `.` are abstract:
    /// inheritance/forwarding anchors that never execute.
    #[serde(default)]
    pub services: BTreeMap<String, RawService>,

    /// Unrecognised top-level keys (warned about at load time).
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

/// One service entry, fields as written in the document.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawService {
    #[serde(default)]
    pub build: Option<BuildField>,

    #[serde(default)]
    pub command: Option<StringOrList>,

    #[serde(default)]
    pub depends_on: Option<DependsOnField>,

    /// A list, or a single string. A single *blank* string means "reset the
    /// inherited entrypoint to none".
    #[serde(default)]
    pub entrypoint: Option<StringOrList>,

    #[serde(default)]
    pub env_file: Option<StringOrList>,

    #[serde(default)]
    pub environment: Option<EnvironmentField>,

    #[serde(default)]
    pub expose: Option<Vec<String>>,

    #[serde(default)]
    pub extends: Option<ExtendsField>,

    #[serde(default)]
    pub group_add: Option<Vec<String>>,

    #[serde(default)]
    pub healthcheck: Option<RawHealthcheck>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub labels: Option<LabelsField>,

    #[serde(default)]
    pub profiles: Option<Vec<String>>,

    /// Number of replicas to run (default 1).
    #[serde(default)]
    pub scale: Option<u32>,

    #[serde(default)]
    pub user: Option<String>,

    /// `source:target` entries; sources are resolved to absolute paths
    /// relative to the declaring document.
    #[serde(default)]
    pub volumes: Option<Vec<String>>,

    #[serde(default)]
    pub working_dir: Option<String>,

    /// Unrecognised per-service keys (warned about at load time).
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

/// A property that may be written as a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Normalise to a list; a single string becomes a one-element list.
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

/// `build: ./dir` or `build: { context: ./dir, dockerfile: Dockerfile.ci }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BuildField {
    Context(String),
    Detailed {
        context: String,
        #[serde(default)]
        dockerfile: Option<String>,
    },
}

/// `depends_on` in its three accepted shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependsOnField {
    One(String),
    Many(Vec<String>),
    Detailed(BTreeMap<String, DependsOnSpec>),
}

/// Per-dependency spec in the map form of `depends_on`.
///
/// The condition string is validated against the known set during
/// resolution, so a typo is a load-time error rather than a silent default.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DependsOnSpec {
    #[serde(default)]
    pub condition: Option<String>,
}

/// `extends: base` or `extends: { file: common.yml, service: base }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtendsField {
    Service(String),
    Detailed {
        #[serde(default)]
        file: Option<String>,
        service: String,
    },
}

/// `environment` as a `KEY=VALUE` list or a map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvironmentField {
    List(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

impl EnvironmentField {
    /// Normalise to `KEY=VALUE` entries, map keys in document order.
    pub fn into_entries(self) -> Vec<String> {
        match self {
            EnvironmentField::List(v) => v,
            EnvironmentField::Map(m) => m
                .into_iter()
                .map(|(k, v)| format!("{k}={}", scalar_to_string(&v)))
                .collect(),
        }
    }
}

/// `labels` as a single string, a list, or a map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LabelsField {
    One(String),
    Many(Vec<String>),
    Map(BTreeMap<String, serde_yaml::Value>),
}

impl LabelsField {
    pub fn into_entries(self) -> Vec<String> {
        match self {
            LabelsField::One(s) => vec![s],
            LabelsField::Many(v) => v,
            LabelsField::Map(m) => m
                .into_iter()
                .map(|(k, v)| format!("{k}={}", scalar_to_string(&v)))
                .collect(),
        }
    }
}

/// `healthcheck` map, fields as written.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHealthcheck {
    #[serde(default)]
    pub disable: bool,

    #[serde(default)]
    pub test: Option<StringOrList>,

    /// Duration strings like `"5s"`, `"500ms"`, `"1m"`.
    #[serde(default)]
    pub interval: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub retries: Option<u32>,

    #[serde(default)]
    pub start_period: Option<String>,
}

/// Render a YAML scalar the way it was written, without quotes.
fn scalar_to_string(v: &serde_yaml::Value) -> String {
    match v {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_depends_on_shapes() {
        let yaml = r#"
services:
  a:
    image: img
    depends_on: b
  b:
    image: img
    depends_on: [c]
  c:
    image: img
    depends_on:
      d:
        condition: service_healthy
  d:
    image: img
"#;
        let doc: ComposeDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            doc.services["a"].depends_on,
            Some(DependsOnField::One(_))
        ));
        assert!(matches!(
            doc.services["b"].depends_on,
            Some(DependsOnField::Many(_))
        ));
        assert!(matches!(
            doc.services["c"].depends_on,
            Some(DependsOnField::Detailed(_))
        ));
    }

    #[test]
    fn environment_map_becomes_key_value_entries() {
        let yaml = r#"
services:
  a:
    image: img
    environment:
      PORT: 8080
      DEBUG: "true"
"#;
        let doc: ComposeDocument = serde_yaml::from_str(yaml).unwrap();
        let env = doc.services["a"]
            .environment
            .clone()
            .unwrap()
            .into_entries();
        assert!(env.contains(&"PORT=8080".to_string()));
        assert!(env.contains(&"DEBUG=true".to_string()));
    }

    #[test]
    fn unknown_keys_are_captured_not_rejected() {
        let yaml = r#"
version: "3.9"
services:
  a:
    image: img
    restart: always
"#;
        let doc: ComposeDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(doc.unknown.contains_key("version"));
        assert!(doc.services["a"].unknown.contains_key("restart"));
    }
}
