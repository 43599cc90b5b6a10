// tests/extends_resolution.rs

//! Inheritance (`extends`) and `depends_on` resolution.

use convoy::errors::ConvoyError;
use convoy::graph::Condition;
use convoy_test_utils::builders::{resolve_yaml, try_resolve_yaml, ComposeSetBuilder};
use convoy_test_utils::init_tracing;

#[test]
fn child_scalar_wins_missing_scalars_inherit() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  .base:
    image: postgres:16
    user: postgres
    working_dir: /base
  db:
    extends: .base
    working_dir: /db
"#,
    );

    let db = model.service("db").unwrap();
    assert_eq!(db.image.as_deref(), Some("postgres:16"));
    assert_eq!(db.user.as_deref(), Some("postgres"));
    assert_eq!(db.working_dir.as_deref(), Some("/db"));
}

#[test]
fn parent_list_entries_are_prepended() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  .base:
    image: img
    environment:
      - FROM=base
    labels:
      - layer=base
  app:
    extends: .base
    environment:
      - FROM=app
    labels:
      - layer=app
"#,
    );

    let app = model.service("app").unwrap();
    assert_eq!(app.environment, vec!["FROM=base", "FROM=app"]);
    assert_eq!(app.labels, vec!["layer=base", "layer=app"]);
}

#[test]
fn depends_on_merges_by_key_child_wins() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  .base:
    image: img
    depends_on:
      db:
        condition: service_started
      cache:
        condition: service_started
  app:
    extends: .base
    depends_on:
      db:
        condition: service_healthy
  db:
    image: img
  cache:
    image: img
"#,
    );

    let app = model.service("app").unwrap();
    assert_eq!(app.depends_on["db"], Condition::ServiceHealthy);
    assert_eq!(app.depends_on["cache"], Condition::ServiceStarted);
}

#[test]
fn extends_chains_merge_through_grandparents() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  .root:
    image: img
    environment: [A=1]
  .mid:
    extends: .root
    environment: [B=2]
  leaf:
    extends: .mid
    environment: [C=3]
"#,
    );

    let leaf = model.service("leaf").unwrap();
    assert_eq!(leaf.environment, vec!["A=1", "B=2", "C=3"]);
    assert_eq!(leaf.image.as_deref(), Some("img"));
    let parents: Vec<&str> = leaf.parents.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(parents, vec![".mid", ".root"]);
}

#[test]
fn extends_cycle_is_rejected() {
    init_tracing();
    let err = try_resolve_yaml(
        r#"
services:
  a:
    extends: b
  b:
    extends: a
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::ExtendsCycle(_)), "{err}");
}

#[test]
fn extends_unknown_base_is_rejected() {
    init_tracing();
    let err = try_resolve_yaml(
        r#"
services:
  a:
    extends: ghost
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::ServiceNotFound(_)), "{err}");
}

#[test]
fn cross_file_base_without_dependencies_is_fine() {
    init_tracing();
    let model = ComposeSetBuilder::new()
        .doc(
            "/pipeline/convoy.yml",
            r#"
services:
  app:
    extends:
      file: common.yml
      service: .runtime
"#,
        )
        .doc(
            "/pipeline/common.yml",
            r#"
services:
  .runtime:
    image: company/runtime:1
    environment: [STAGE=ci]
"#,
        )
        .resolve();

    let app = model.service("app").unwrap();
    assert_eq!(app.image.as_deref(), Some("company/runtime:1"));
    assert_eq!(app.environment, vec!["STAGE=ci"]);
    // Only root-document services become part of the model.
    assert!(model.service(".runtime").is_err());
}

#[test]
fn cross_file_base_with_dependencies_is_rejected() {
    init_tracing();
    let err = ComposeSetBuilder::new()
        .doc(
            "/pipeline/convoy.yml",
            r#"
services:
  app:
    extends:
      file: common.yml
      service: .runtime
"#,
        )
        .doc(
            "/pipeline/common.yml",
            r#"
services:
  .runtime:
    image: img
    depends_on: [db]
  db:
    image: img
"#,
        )
        .try_resolve()
        .unwrap_err();
    assert!(matches!(err, ConvoyError::UnreachableDependency(_)), "{err}");
}

#[test]
fn dependency_sets_become_transitive_closures() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  a:
    image: img
    depends_on:
      b:
        condition: service_completed_successfully
  b:
    image: img
    depends_on:
      c:
        condition: service_healthy
  c:
    image: img
"#,
    );

    let a = model.service("a").unwrap();
    assert_eq!(a.depends_on["b"], Condition::ServiceCompletedSuccessfully);
    // Inherited from b, with b's declared condition.
    assert_eq!(a.depends_on["c"], Condition::ServiceHealthy);
}

#[test]
fn closure_never_overwrites_a_direct_declaration() {
    init_tracing();
    let model = resolve_yaml(
        r#"
services:
  a:
    image: img
    depends_on:
      b: {}
      c:
        condition: service_started
  b:
    image: img
    depends_on:
      c:
        condition: service_healthy
  c:
    image: img
"#,
    );

    let a = model.service("a").unwrap();
    assert_eq!(a.depends_on["c"], Condition::ServiceStarted);
}

#[test]
fn depends_on_cycles_are_rejected() {
    init_tracing();
    let err = try_resolve_yaml(
        r#"
services:
  a:
    image: img
    depends_on: [b]
  b:
    image: img
    depends_on: [a]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::DependsOnCycle(_)), "{err}");
}

#[test]
fn unknown_dependency_target_is_rejected() {
    init_tracing();
    let err = try_resolve_yaml(
        r#"
services:
  a:
    image: img
    depends_on: [ghost]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::ServiceNotFound(_)), "{err}");
}

#[test]
fn unknown_condition_string_is_rejected() {
    init_tracing();
    let err = try_resolve_yaml(
        r#"
services:
  a:
    image: img
    depends_on:
      b:
        condition: service_up
  b:
    image: img
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::UnknownCondition(_)), "{err}");
}

#[test]
fn resolution_is_idempotent_per_shape() {
    init_tracing();
    let yaml = r#"
services:
  .base:
    image: img
    environment: [A=1]
  app:
    extends: .base
    depends_on: [db]
  db:
    image: img
"#;
    let first = resolve_yaml(yaml);
    let second = resolve_yaml(yaml);

    let a = first.service("app").unwrap();
    let b = second.service("app").unwrap();
    assert_eq!(a.environment, b.environment);
    assert_eq!(a.depends_on, b.depends_on);
}
