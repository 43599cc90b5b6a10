// tests/runtime_fake_adapter.rs

//! End-to-end runs over the fake container adapter.

use std::sync::Arc;
use std::time::Duration;

use convoy::engine::{JobOutcome, PipelineEvent, RunReport, Runtime, RuntimeOptions};
use convoy::graph::JobStatus;
use convoy_test_utils::builders::pipeline_from_yaml;
use convoy_test_utils::fake_adapter::{FakeAdapter, JobScript};
use convoy_test_utils::{init_tracing, with_timeout};

async fn run_pipeline(
    yaml: &str,
    options: RuntimeOptions,
    adapter: Arc<FakeAdapter>,
) -> RunReport {
    let pipeline = pipeline_from_yaml(yaml);
    let runtime = Runtime::new(pipeline, options, adapter);
    with_timeout(runtime.run()).await.expect("run failed")
}

fn call_index(calls: &[String], call: &str) -> usize {
    calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("call {call:?} not found in {calls:?}"))
}

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    let report = run_pipeline(
        r#"
services:
  a:
    image: img
  b:
    image: img
    depends_on:
      a:
        condition: service_completed_successfully
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(report.success());
    let calls = adapter.calls();
    assert!(call_index(&calls, "exit a[0]") < call_index(&calls, "pull b"));
}

#[tokio::test]
async fn failed_dependency_blocks_dependents_without_starting_them() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("a", JobScript::exits(2));

    let report = run_pipeline(
        r#"
services:
  a:
    image: img
  b:
    image: img
    depends_on:
      a:
        condition: service_completed_successfully
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(!report.success());
    assert_eq!(report.job("a").unwrap().status, JobStatus::ExitedNonZero);
    assert_eq!(report.job("b").unwrap().status, JobStatus::Blocked);
    assert!(!adapter.calls().contains(&"pull b".to_string()));
}

#[tokio::test]
async fn failure_hook_runs_when_its_dependency_fails() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("deploy", JobScript::exits(1));

    let report = run_pipeline(
        r#"
services:
  deploy:
    image: img
  rollback:
    image: img
    depends_on:
      deploy:
        condition: service_failed
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    // The hook ran and succeeded; the run still reports the failure.
    assert!(!report.success());
    assert_eq!(report.job("rollback").unwrap().status, JobStatus::ExitedZero);
    assert!(adapter.calls().contains(&"exit rollback[0]".to_string()));
}

#[tokio::test]
async fn concurrency_limit_bounds_simultaneous_jobs() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    for job in ["a", "b", "c", "d"] {
        adapter.script(job, JobScript::runs_for(Duration::from_millis(40)));
    }

    let report = run_pipeline(
        r#"
services:
  a: {image: img}
  b: {image: img}
  c: {image: img}
  d: {image: img}
"#,
        RuntimeOptions {
            concurrency: 2,
            ..RuntimeOptions::default()
        },
        Arc::clone(&adapter),
    )
    .await;

    assert!(report.success());
    assert!(adapter.max_in_flight() <= 2, "ran {} jobs at once", adapter.max_in_flight());
}

#[tokio::test]
async fn replicas_run_together_and_one_bad_exit_fails_the_job() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("workers", JobScript::exits_each(vec![0, 7, 0]));

    let report = run_pipeline(
        r#"
services:
  workers:
    image: img
    scale: 3
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(!report.success());
    assert_eq!(
        report.job("workers").unwrap().status,
        JobStatus::ExitedNonZero
    );
    assert_eq!(
        report.job("workers").unwrap().outcome,
        Some(JobOutcome::Exited {
            codes: vec![0, 7, 0]
        })
    );
    let calls = adapter.calls();
    for index in 0..3 {
        assert!(calls.contains(&format!("start workers[{index}]")));
    }
}

#[tokio::test]
async fn long_lived_dependency_is_auto_stopped_after_its_dependents() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("db", JobScript::service());
    adapter.script("test", JobScript::runs_for(Duration::from_millis(20)));

    let report = run_pipeline(
        r#"
services:
  db:
    image: img
  test:
    image: img
    depends_on:
      db:
        condition: service_started
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(report.success(), "{report}");
    assert_eq!(report.job("db").unwrap().status, JobStatus::ExitedZero);
    assert_eq!(report.job("db").unwrap().outcome, Some(JobOutcome::Stopped));

    let calls = adapter.calls();
    assert!(call_index(&calls, "exit test[0]") < call_index(&calls, "stop db[0]"));
}

#[tokio::test]
async fn healthy_gate_delays_the_dependent() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script(
        "db",
        JobScript::service().healthy_after(Duration::from_millis(30)),
    );

    let report = run_pipeline(
        r#"
services:
  db:
    image: img
    healthcheck:
      test: ["CMD", "ready"]
      interval: 10ms
  app:
    image: img
    depends_on:
      db:
        condition: service_healthy
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(report.success(), "{report}");
    let calls = adapter.calls();
    assert!(call_index(&calls, "start db[0]") < call_index(&calls, "pull app"));
}

#[tokio::test]
async fn exit_before_healthy_still_reports_the_real_exit_code() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    // svc exits 0 right away but its probe never turns green.
    adapter.script(
        "svc",
        JobScript::succeeds().healthy_after(Duration::from_secs(3600)),
    );

    let report = run_pipeline(
        r#"
services:
  svc:
    image: img
  app:
    image: img
    depends_on:
      svc:
        condition: service_healthy
"#,
        RuntimeOptions {
            job_timeout: Duration::from_millis(300),
            ..RuntimeOptions::default()
        },
        Arc::clone(&adapter),
    )
    .await;

    // The exit is observed, not swallowed by the readiness poll: svc keeps
    // its true status and app is blocked instead of waiting out the timeout.
    assert!(!report.success());
    assert_eq!(report.job("svc").unwrap().status, JobStatus::ExitedZero);
    assert_eq!(report.job("app").unwrap().status, JobStatus::Blocked);
    assert!(adapter.calls().contains(&"exit svc[0]".to_string()));
}

#[tokio::test]
async fn timed_out_job_is_an_error() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("stuck", JobScript::service());

    let report = run_pipeline(
        r#"
services:
  stuck:
    image: img
"#,
        RuntimeOptions {
            job_timeout: Duration::from_millis(50),
            ..RuntimeOptions::default()
        },
        Arc::clone(&adapter),
    )
    .await;

    assert!(!report.success());
    assert_eq!(report.job("stuck").unwrap().status, JobStatus::Error);
    assert_eq!(
        report.job("stuck").unwrap().outcome,
        Some(JobOutcome::TimedOut)
    );
    assert!(adapter.calls().contains(&"stop stuck[0]".to_string()));
}

#[tokio::test]
async fn build_failure_surfaces_as_job_error() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("lib", JobScript::failing_build());

    let report = run_pipeline(
        r#"
services:
  lib:
    build: ./lib
    image: company/lib:dev
    entrypoint: ""
  app:
    image: img
    depends_on:
      lib:
        condition: service_completed_successfully
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(!report.success());
    assert_eq!(report.job("lib").unwrap().status, JobStatus::Error);
    assert_eq!(report.job("app").unwrap().status, JobStatus::Blocked);
}

#[tokio::test]
async fn build_only_job_never_runs_a_container() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());

    let report = run_pipeline(
        r#"
services:
  lib:
    build: ./lib
    image: company/lib:dev
    entrypoint: ""
"#,
        RuntimeOptions::default(),
        Arc::clone(&adapter),
    )
    .await;

    assert!(report.success());
    assert_eq!(report.job("lib").unwrap().status, JobStatus::Built);
    let calls = adapter.calls();
    assert_eq!(calls, vec!["build lib".to_string()]);
}

#[tokio::test]
async fn shutdown_interrupts_running_jobs() {
    init_tracing();
    let adapter = Arc::new(FakeAdapter::new());
    adapter.script("svc", JobScript::service());

    let pipeline = pipeline_from_yaml(
        r#"
services:
  svc:
    image: img
"#,
    );
    let runtime = Runtime::new(pipeline, RuntimeOptions::default(), Arc::clone(&adapter));
    let tx = runtime.event_sender();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = tx.send(PipelineEvent::ShutdownRequested).await;
    });

    let report = with_timeout(runtime.run()).await.expect("run failed");
    assert!(!report.success());
    assert_eq!(report.job("svc").unwrap().status, JobStatus::Error);
    assert_eq!(
        report.job("svc").unwrap().outcome,
        Some(JobOutcome::Interrupted)
    );
}
