// tests/pool_fake_backend.rs

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use less_cluster::engine::{Pool, PoolCore, PoolEvent, PoolOptions};
use less_cluster::errors::ClusterError;
use less_cluster::types::WorkerId;
use less_cluster_test_utils::builders::plan_of;
use less_cluster_test_utils::fake_backend::{FakeBackend, Script};
use less_cluster_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn core(workers: usize) -> PoolCore {
    PoolCore::new(PoolOptions {
        workers,
        source_root: "/src".into(),
        output_root: "/out".into(),
    })
}

fn lines_starting(log: &[String], prefix: &str) -> Vec<String> {
    log.iter().filter(|l| l.starts_with(prefix)).cloned().collect()
}

async fn run_with(
    workers: usize,
    batches: Vec<Vec<&str>>,
    script: Script,
) -> (Result<less_cluster::engine::PoolSummary, ClusterError>, Vec<String>) {
    let (tx, rx) = mpsc::channel::<PoolEvent>(256);
    let log = Arc::new(Mutex::new(Vec::new()));
    let backend = FakeBackend::scripted(tx.clone(), log.clone(), script);

    for files in batches {
        tx.send(PoolEvent::BatchRequested(plan_of(&files))).await.unwrap();
    }

    let pool = Pool::new(core(workers), rx, backend);
    let result = timeout(Duration::from_secs(3), pool.run())
        .await
        .expect("pool did not finish in time");

    let log = log.lock().unwrap().clone();
    (result, log)
}

#[tokio::test]
async fn two_workers_build_three_files() -> TestResult {
    init_tracing();

    let (result, log) = run_with(
        2,
        vec![vec!["/src/f1.less", "/src/f2.less", "/src/f3.less"]],
        Script::default(),
    )
    .await;

    let summary = result?;
    assert_eq!(summary.built, 3);
    assert_eq!(summary.batches, 1);

    assert_eq!(lines_starting(&log, "fork"), vec!["fork 1", "fork 2"]);
    assert_eq!(lines_starting(&log, "build").len(), 3);
    assert!(log.contains(&"build 1 /src/f1.less -> /out/f1.css".to_string()));
    assert_eq!(lines_starting(&log, "disconnect").len(), 2);
    Ok(())
}

#[tokio::test]
async fn no_build_is_sent_before_every_worker_started() -> TestResult {
    init_tracing();

    let (result, log) = run_with(
        3,
        vec![vec!["/src/a.less", "/src/b.less", "/src/c.less", "/src/d.less"]],
        Script::default(),
    )
    .await;
    result?;

    let first_build = log.iter().position(|l| l.starts_with("build")).unwrap();
    let last_start = log.iter().rposition(|l| l.starts_with("start")).unwrap();
    assert!(last_start < first_build, "log: {log:?}");
    Ok(())
}

#[tokio::test]
async fn crashed_worker_is_replaced_once() -> TestResult {
    init_tracing();

    let script = Script {
        crash_builds: [PathBuf::from("/src/b.less")].into(),
        ..Script::default()
    };
    let (result, log) = run_with(
        2,
        vec![vec!["/src/a.less", "/src/b.less", "/src/c.less", "/src/d.less"]],
        script,
    )
    .await;

    let summary = result?;
    assert_eq!(summary.replaced, 1);
    // b.less went down with its worker and is not retried.
    assert_eq!(summary.built, 3);
    assert_eq!(lines_starting(&log, "fork"), vec!["fork 1", "fork 2", "fork 3"]);
    // The dead worker's channel is released as well as the survivors'.
    let mut disconnects = lines_starting(&log, "disconnect");
    disconnects.sort();
    assert_eq!(disconnects, vec!["disconnect 1", "disconnect 2", "disconnect 3"]);
    Ok(())
}

#[tokio::test]
async fn worker_error_fails_the_run() -> TestResult {
    init_tracing();

    let script = Script {
        fail_builds: [PathBuf::from("/src/bad.less")].into(),
        ..Script::default()
    };
    let (result, log) = run_with(
        2,
        vec![vec!["/src/bad.less", "/src/good.less"], vec!["/src/next.less"]],
        script,
    )
    .await;

    match result {
        Err(ClusterError::WorkerFailed { id, detail }) => {
            assert_eq!(id, WorkerId(1));
            assert!(detail.contains("bad.less"));
        }
        other => panic!("expected WorkerFailed, got {other:?}"),
    }
    assert_eq!(lines_starting(&log, "disconnect").len(), 2);
    assert!(!log.iter().any(|l| l.contains("next.less")));
    Ok(())
}

#[tokio::test]
async fn malformed_messages_are_survivable() -> TestResult {
    init_tracing();

    let script = Script {
        garbage_before_ready: true,
        ..Script::default()
    };
    let (result, _log) = run_with(1, vec![vec!["/src/a.less"]], script).await;
    assert_eq!(result?.built, 1);
    Ok(())
}

#[tokio::test]
async fn queued_batches_run_in_request_order() -> TestResult {
    init_tracing();

    let (result, log) = run_with(
        2,
        vec![
            vec!["/src/one/a.less", "/src/one/b.less"],
            vec!["/src/two/a.less"],
            vec!["/src/three/a.less"],
        ],
        Script::default(),
    )
    .await;

    let summary = result?;
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.built, 4);

    let builds = lines_starting(&log, "build");
    let pos = |needle: &str| builds.iter().position(|l| l.contains(needle)).unwrap();
    assert!(pos("/src/one/a.less") < pos("/src/two/a.less"));
    assert!(pos("/src/one/b.less") < pos("/src/two/a.less"));
    assert!(pos("/src/two/a.less") < pos("/src/three/a.less"));

    // The pool is reused between batches, and torn down once at the end.
    assert_eq!(lines_starting(&log, "fork").len(), 2);
    assert_eq!(lines_starting(&log, "disconnect").len(), 2);
    Ok(())
}

#[tokio::test]
async fn shutdown_request_interrupts_the_run() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<PoolEvent>(256);
    let log = Arc::new(Mutex::new(Vec::new()));
    let backend = FakeBackend::new(tx.clone(), log.clone());

    tx.send(PoolEvent::ShutdownRequested).await?;
    tx.send(PoolEvent::BatchRequested(plan_of(&["/src/a.less"]))).await?;

    let pool = Pool::new(core(2), rx, backend);
    let result = timeout(Duration::from_secs(3), pool.run()).await?;

    assert!(matches!(result, Err(ClusterError::Interrupted)));
    assert!(log.lock().unwrap().is_empty());
    Ok(())
}
