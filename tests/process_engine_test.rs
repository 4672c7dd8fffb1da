#![cfg(unix)]

use license_issuer::application::orchestrator::IssuanceOrchestrator;
use license_issuer::config::DurationPolicy;
use license_issuer::domain::engine::{EngineFailure, EngineResult};
use license_issuer::domain::ports::{IssuanceStore, LicenseEngine};
use license_issuer::domain::record::{FailureCategory, IssuanceStatus};
use license_issuer::error::IssuanceError;
use license_issuer::infrastructure::process_engine::ProcessEngine;
use license_issuer::infrastructure::sqlite::SqliteIssuanceStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

mod common;
use common::{all_records, request, script_engine_config, write_engine_script};

fn engine(dir: &Path, body: &str) -> ProcessEngine {
    let script = write_engine_script(dir, body);
    ProcessEngine::new(script_engine_config(&script)).unwrap()
}

#[tokio::test]
async fn test_script_engine_outputs() {
    let cases = [
        (
            "printf 'LIC-%s-%s\\n' \"$1\" \"$2\"",
            EngineResult::Success("LIC-QUJD-60".to_string()),
        ),
        (
            "echo one; echo two",
            EngineResult::Failure(EngineFailure::UnexpectedOutputShape(String::new())),
        ),
        (
            "exit 0",
            EngineResult::Failure(EngineFailure::UnexpectedOutputShape(String::new())),
        ),
        (
            "echo 'Error while decrypting the request'",
            EngineResult::Failure(EngineFailure::ReportedError(String::new())),
        ),
    ];

    for (body, expected) in cases {
        let dir = tempdir().unwrap();
        let result = engine(dir.path(), body).generate("QUJD", 60).await;
        match (&result, &expected) {
            (EngineResult::Success(got), EngineResult::Success(want)) => assert_eq!(got, want),
            (EngineResult::Failure(got), EngineResult::Failure(want)) => {
                assert_eq!(got.category(), want.category(), "{body}")
            }
            _ => panic!("{body}: expected {expected:?}, got {result:?}"),
        }
    }
}

#[tokio::test]
async fn test_fingerprint_is_passed_as_single_argument() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path(), "printf '%s|%s\\n' \"$#\" \"$1\"");
    assert_eq!(
        engine.generate("QUJD+/=", 60).await,
        EngineResult::Success("2|QUJD+/=".to_string())
    );
}

#[tokio::test]
async fn test_end_to_end_with_sqlite() {
    let dir = tempdir().unwrap();
    let script = write_engine_script(
        dir.path(),
        "if [ \"$1\" = BAD ]; then echo 'Error bad request'; else printf 'LIC-%s\\n' \"$1\"; fi",
    );
    let store = SqliteIssuanceStore::open(dir.path().join("issuances.db")).unwrap();
    let orchestrator = Arc::new(IssuanceOrchestrator::new(
        DurationPolicy::default(),
        Box::new(ProcessEngine::new(script_engine_config(&script)).unwrap()),
        Box::new(store.clone()),
    ));

    let issued = orchestrator.issue(request("QUJD")).await.unwrap();
    assert_eq!(issued.license, "LIC-QUJD");

    let err = orchestrator.issue(request("BAD")).await.unwrap_err();
    assert!(matches!(err, IssuanceError::EngineReportedError(_)));

    let stored = store.get(issued.record_id).await.unwrap().unwrap();
    assert_eq!(stored.license(), Some("LIC-QUJD"));

    let records = all_records(&store).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status(), IssuanceStatus::Failed);
    assert_eq!(
        records[0].failure_reason().unwrap().category,
        FailureCategory::EngineReportedError
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_engine_processes() {
    let dir = tempdir().unwrap();
    let script = write_engine_script(dir.path(), "printf 'LIC-%s\\n' \"$1\"");
    let store = SqliteIssuanceStore::open_in_memory().unwrap();
    let orchestrator = Arc::new(IssuanceOrchestrator::new(
        DurationPolicy::default(),
        Box::new(ProcessEngine::new(script_engine_config(&script).with_max_concurrent(2)).unwrap()),
        Box::new(store.clone()),
    ));

    let requests = (0..10).map(|i| request(&format!("FP{i}"))).collect();
    let results = orchestrator.issue_all(requests).await;
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().license, format!("LIC-FP{i}"));
    }
    assert_eq!(all_records(&store).await.len(), 10);
}

#[cfg(target_os = "linux")]
fn is_running(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| !rest.trim_start().starts_with('Z')),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_kills_forked_helpers() {
    use std::time::{Duration, Instant};

    let dir = tempdir().unwrap();
    let pid_file = dir.path().join("helper.pid");
    // The engine exits at once but leaves a helper holding stdout open.
    let script = write_engine_script(
        dir.path(),
        &format!("sleep 30 &\necho $! > '{}'\nexit 0\n", pid_file.display()),
    );
    let config = script_engine_config(&script).with_timeout(Duration::from_millis(500));
    let engine = ProcessEngine::new(config).unwrap();

    let started = Instant::now();
    let result = engine.generate("QUJD", 60).await;
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(matches!(
        result,
        EngineResult::Failure(EngineFailure::Unavailable(_))
    ));

    let helper = std::fs::read_to_string(&pid_file).unwrap();
    let helper = helper.trim();
    let mut alive = is_running(helper);
    for _ in 0..50 {
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        alive = is_running(helper);
    }
    assert!(!alive, "helper {helper} survived the engine timeout");
}
