#![cfg(unix)]

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

mod common;
use common::write_engine_script;

fn issue_with_rocksdb(dir: &std::path::Path) -> Command {
    let script = write_engine_script(dir, "printf 'LIC-%s\\n' \"$1\"");
    let mut cmd = Command::new(cargo_bin!("license-issuer"));
    cmd.env_remove("RUST_LOG")
        .args(["issue", "--fingerprint", "QUJD", "--backend", "rocksdb"])
        .arg("--db-path")
        .arg(dir.join("test_db"))
        .arg("--engine")
        .arg("/bin/sh")
        .arg("--engine-arg")
        .arg(script);
    cmd
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    issue_with_rocksdb(dir.path())
        .assert()
        .success()
        .stdout("LIC-QUJD\n")
        .stderr(predicate::str::contains(
            "RocksDB storage requested, but 'storage-rocksdb' feature is not enabled. Falling back to SQLite storage.",
        ));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();

    issue_with_rocksdb(dir.path())
        .assert()
        .success()
        .stdout("LIC-QUJD\n")
        .stderr(predicate::str::contains("Falling back").not());
}
