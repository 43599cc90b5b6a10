// tests/graph_building.rs

//! Job-graph construction: forwarding, election, skipping, leveling and
//! auto-stop flagging.

use convoy::errors::ConvoyError;
use convoy::graph::{Condition, Pipeline};
use convoy_test_utils::builders::{pipeline_from_yaml, pipeline_with_selection};
use convoy_test_utils::init_tracing;

fn edge(pipeline: &Pipeline, dependent: &str, dependency: &str) -> Option<Condition> {
    let from = pipeline.by_name(dependent)?;
    let to = pipeline.id_of(dependency)?;
    from.dependencies.get(&to).copied()
}

#[test]
fn abstract_jobs_never_materialize() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  .base:
    image: img
  app:
    extends: .base
"#,
    );

    let names: Vec<&str> = pipeline.job_names().collect();
    assert_eq!(names, vec!["app"]);
}

#[test]
fn depending_on_a_base_means_depending_on_all_its_variants() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  .worker:
    image: img
  worker-a:
    extends: .worker
  worker-b:
    extends: .worker
  smoke:
    image: img
    depends_on:
      .worker:
        condition: service_completed_successfully
"#,
    );

    assert_eq!(
        edge(&pipeline, "smoke", "worker-a"),
        Some(Condition::ServiceCompletedSuccessfully)
    );
    assert_eq!(
        edge(&pipeline, "smoke", "worker-b"),
        Some(Condition::ServiceCompletedSuccessfully)
    );
    assert!(pipeline.by_name(".worker").is_none());
}

#[test]
fn abstract_dependency_forwards_to_its_own_dependencies() {
    init_tracing();
    // `.gate` is abstract with no children; depending on it means depending
    // on what it depends on, carrying the more relevant condition.
    let pipeline = pipeline_from_yaml(
        r#"
services:
  .gate:
    depends_on:
      db:
        condition: service_healthy
  db:
    image: img
  app:
    image: img
    depends_on:
      .gate:
        condition: service_started
"#,
    );

    assert_eq!(edge(&pipeline, "app", "db"), Some(Condition::ServiceHealthy));
}

#[test]
fn more_relevant_condition_overrides_on_convergence() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  .gate:
    depends_on:
      db:
        condition: service_completed_successfully
  db:
    image: img
  app:
    image: img
    depends_on:
      db:
        condition: service_started
      .gate:
        condition: service_started
"#,
    );

    assert_eq!(
        edge(&pipeline, "app", "db"),
        Some(Condition::ServiceCompletedSuccessfully)
    );
}

#[test]
fn success_and_failure_of_same_dependency_is_ambiguous() {
    init_tracing();
    let err = pipeline_with_selection(
        r#"
services:
  .gate:
    depends_on:
      db:
        condition: service_failed
  db:
    image: img
  app:
    image: img
    depends_on:
      db:
        condition: service_completed_successfully
      .gate:
        condition: service_started
"#,
        &[],
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::AmbiguousCondition(_)), "{err}");
}

#[test]
fn targets_elect_their_transitive_dependency_closure() {
    init_tracing();
    let pipeline = pipeline_with_selection(
        r#"
services:
  db:
    image: img
  api:
    image: img
    depends_on: [db]
  web:
    image: img
    depends_on: [api]
  unrelated:
    image: img
"#,
        &["web"],
        &[],
    )
    .unwrap();

    let mut names: Vec<&str> = pipeline.job_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["api", "db", "web"]);
}

#[test]
fn abstract_target_selects_its_variants() {
    init_tracing();
    let pipeline = pipeline_with_selection(
        r#"
services:
  .job:
    image: img
  one:
    extends: .job
  two:
    extends: .job
  other:
    image: img
"#,
        &[".job"],
        &[],
    )
    .unwrap();

    let mut names: Vec<&str> = pipeline.job_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["one", "two"]);
}

#[test]
fn skipped_jobs_drop_out_and_release_their_dependents() {
    init_tracing();
    let pipeline = pipeline_with_selection(
        r#"
services:
  migrate:
    image: img
  api:
    image: img
    depends_on:
      migrate:
        condition: service_completed_successfully
"#,
        &[],
        &["migrate"],
    )
    .unwrap();

    let names: Vec<&str> = pipeline.job_names().collect();
    assert_eq!(names, vec!["api"]);
    assert!(pipeline.by_name("api").unwrap().dependencies.is_empty());
}

#[test]
fn levels_are_longest_paths_and_diamonds_are_not_cycles() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  base:
    image: img
  left:
    image: img
    depends_on: [base]
  right:
    image: img
    depends_on: [left]
  top:
    image: img
    depends_on: [left, right]
"#,
    );

    assert_eq!(pipeline.by_name("base").unwrap().level, 0);
    assert_eq!(pipeline.by_name("left").unwrap().level, 1);
    assert_eq!(pipeline.by_name("right").unwrap().level, 2);
    // Longest path wins: top -> right -> left -> base.
    assert_eq!(pipeline.by_name("top").unwrap().level, 3);
}

#[test]
fn auto_stop_requires_liveness_only_dependents() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  db:
    image: img
  cache:
    image: img
  test:
    image: img
    depends_on:
      db:
        condition: service_healthy
      cache:
        condition: service_completed_successfully
"#,
    );

    // Only liveness is needed from db; once `test` is done it can stop.
    assert!(pipeline.by_name("db").unwrap().auto_stop);
    // cache's outcome matters, so it must run to completion on its own.
    assert!(!pipeline.by_name("cache").unwrap().auto_stop);
    // Nothing depends on `test` at all.
    assert!(!pipeline.by_name("test").unwrap().auto_stop);
}

#[test]
fn unknown_selection_names_are_rejected() {
    init_tracing();
    let err = pipeline_with_selection(
        r#"
services:
  a:
    image: img
"#,
        &["ghost"],
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, ConvoyError::ServiceNotFound(_)), "{err}");
}

#[test]
fn dependency_and_dependent_maps_are_mirror_images() {
    init_tracing();
    let pipeline = pipeline_from_yaml(
        r#"
services:
  a:
    image: img
  b:
    image: img
    depends_on: [a]
  c:
    image: img
    depends_on: [a, b]
"#,
    );

    for job in pipeline.jobs() {
        for (&dep, &condition) in &job.dependencies {
            assert_eq!(
                pipeline.job(dep).dependents.get(&job.id),
                Some(&condition),
                "edge {} -> {} not mirrored",
                job.name,
                pipeline.job(dep).name
            );
        }
    }
}
