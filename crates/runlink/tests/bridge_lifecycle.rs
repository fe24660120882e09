#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! End-to-end lifecycle tests for the bridge.
//!
//! The runtime is stood in for by executable shell scripts written into a
//! temp directory, so every path through the disposal state machine can be
//! exercised against a real child process: graceful EOF exit, already-dead
//! children, stdin-ignoring children that need the force-kill escalation,
//! and the disposal race between two call sites.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};

use runlink::config::RuntimePathProvider;
use runlink::{Error, ProcessBridge};

struct ScriptProvider(PathBuf);

impl RuntimePathProvider for ScriptProvider {
    fn default_runtime_path(&self) -> PathBuf {
        self.0.clone()
    }
}

/// Write an executable shell script standing in for the runtime binary.
fn fake_runtime(dir: &tempfile::TempDir, body: &str) -> ScriptProvider {
    let path = dir.path().join("fake-runtime");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    ScriptProvider(path)
}

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn wait_for_exit(bridge: &ProcessBridge) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.is_running().await {
        assert!(Instant::now() < deadline, "child did not exit in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn eof_drives_graceful_exit() {
    init_logs();
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "cat >/dev/null\nexit 0");

    let bridge = ProcessBridge::launch(&provider).unwrap();
    bridge.write_input(b"hello runtime\n").await.unwrap();

    let start = Instant::now();
    bridge.dispose().await.unwrap();
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "EOF-driven exit must not wait out the kill window"
    );
    assert!(!bridge.is_running().await);
}

#[tokio::test]
async fn dispose_after_child_exit_is_a_noop_twice() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "exit 0");

    let bridge = ProcessBridge::launch(&provider).unwrap();
    wait_for_exit(&bridge).await;

    bridge.dispose().await.unwrap();
    bridge.dispose().await.unwrap();
}

#[tokio::test]
async fn stdin_ignoring_child_is_force_killed_with_descendants() {
    init_logs();
    let dir = tempfile::TempDir::new().unwrap();
    // Never reads stdin and leaves a descendant behind. Both inherit the
    // stdout pipe, so EOF on it is proof the whole tree is dead.
    let provider = fake_runtime(&dir, "sleep 60 &\nexec sleep 60");

    let mut bridge = ProcessBridge::launch(&provider).unwrap();
    let stdout = bridge.take_stdout().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    let start = Instant::now();
    bridge.dispose().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(5), "kill window was cut short");
    assert!(
        elapsed < Duration::from_secs(9),
        "disposal must stay close to the timeout, took {elapsed:?}"
    );

    let eof = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .expect("stdout stayed open: a descendant survived the force-kill")
        .unwrap();
    assert_eq!(eof, None);
}

#[tokio::test]
async fn child_sees_eof_before_any_kill() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("marker");
    // Logs EOF receipt, then overstays the window so disposal must escalate.
    let provider = fake_runtime(
        &dir,
        "cat >/dev/null\necho eof-received > \"$(dirname \"$0\")/marker\"\nexec sleep 60",
    );

    let bridge = ProcessBridge::launch(&provider).unwrap();
    bridge.dispose().await.unwrap();

    let logged = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(logged.trim(), "eof-received");
}

#[tokio::test]
async fn concurrent_dispose_never_errors() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "cat >/dev/null");

    let bridge = std::sync::Arc::new(ProcessBridge::launch(&provider).unwrap());
    let racing = std::sync::Arc::clone(&bridge);

    let task = tokio::spawn(async move { racing.dispose().await });
    bridge.dispose().await.unwrap();
    task.await.unwrap().unwrap();

    assert!(!bridge.is_running().await);
}

#[tokio::test]
async fn agent_identity_reaches_the_child() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "printenv RUNLINK_AGENT\ncat >/dev/null");

    let mut bridge = ProcessBridge::launch(&provider).unwrap();
    let stdout = bridge.take_stdout().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    let identity = lines.next_line().await.unwrap().unwrap();
    assert!(identity.starts_with("runlink/"), "got {identity}");
    assert_eq!(identity.split('/').count(), 4);

    bridge.dispose().await.unwrap();
}

#[tokio::test]
async fn debug_flag_absent_when_host_does_not_set_it() {
    // Meaningless if the surrounding environment carries DEBUG already.
    if std::env::var("DEBUG").is_ok_and(|v| !v.trim().is_empty()) {
        return;
    }
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "printenv DEBUG || echo missing\ncat >/dev/null");

    let mut bridge = ProcessBridge::launch(&provider).unwrap();
    let stdout = bridge.take_stdout().unwrap();
    let mut lines = BufReader::new(stdout).lines();

    assert_eq!(lines.next_line().await.unwrap().unwrap(), "missing");

    bridge.dispose().await.unwrap();
}

#[tokio::test]
async fn output_and_error_channels_deliver() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "echo out-line\necho err-line >&2\ncat >/dev/null");

    let mut bridge = ProcessBridge::launch(&provider).unwrap();
    let mut out = BufReader::new(bridge.take_stdout().unwrap()).lines();
    let mut err = BufReader::new(bridge.take_stderr().unwrap()).lines();

    assert_eq!(out.next_line().await.unwrap().unwrap(), "out-line");
    assert_eq!(err.next_line().await.unwrap().unwrap(), "err-line");

    bridge.dispose().await.unwrap();
}

#[tokio::test]
async fn write_after_dispose_is_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "cat >/dev/null");

    let bridge = ProcessBridge::launch(&provider).unwrap();
    bridge.dispose().await.unwrap();

    let err = bridge.write_input(b"too late\n").await.unwrap_err();
    assert!(matches!(err, Error::Disposed));
}

#[tokio::test]
async fn explicit_close_input_signals_eof() {
    let dir = tempfile::TempDir::new().unwrap();
    let provider = fake_runtime(&dir, "cat >/dev/null\nexit 0");

    let bridge = ProcessBridge::launch(&provider).unwrap();
    bridge.close_input().await;
    wait_for_exit(&bridge).await;

    bridge.dispose().await.unwrap();
}
