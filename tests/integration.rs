//! End-to-end tests driving the compiled `ckb` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ckb_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ckb");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // api_base points at a closed port so embedding calls fail fast;
    // retrieval must degrade instead of erroring.
    let config_content = format!(
        r#"[db]
path = "{}/data/kb.sqlite"

[chunking]
max_tokens = 450
min_tokens = 80

[embedding]
api_base = "http://127.0.0.1:1"
api_key_env = "CKB_IT_KEY"
dims = 3
batch_size = 5
batch_delay_ms = 1
max_retries = 1
retry_base_ms = 1
timeout_secs = 2

[retrieval]
limit = 5
min_similarity = 0.3
"#,
        root.display()
    );

    let config_path = config_dir.join("ckb.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ckb(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ckb_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .env("CKB_IT_KEY", "integration-test-key")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ckb binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ckb(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ckb(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ckb(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn add_registers_pending_document() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (stdout, stderr, success) = run_ckb(
        &config_path,
        &["add", "serve-manual.pdf", "--title", "Serve Manual", "--sport", "tennis"],
    );
    assert!(success, "add failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Serve Manual"));
    assert!(stdout.contains("PENDING"));

    let (stdout, _, success) = run_ckb(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Serve Manual"));
    assert!(stdout.contains("status: PENDING"));
    assert!(stdout.contains("sport: tennis"));
    assert!(stdout.contains("chunks: 0"));
}

#[test]
fn status_with_empty_database_reports_no_documents() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (stdout, _, success) = run_ckb(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("No documents."));
}

#[test]
fn process_failure_is_persisted_on_the_document() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (stdout, _, _) = run_ckb(&config_path, &["add", "/nonexistent/missing.pdf"]);
    let id = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .expect("add output should include the document id")
        .to_string();

    let (stdout, stderr, success) = run_ckb(&config_path, &["process", &id]);
    assert!(!success, "process of a missing file should exit non-zero");
    assert!(
        stdout.contains("FAILED"),
        "stdout={}, stderr={}",
        stdout,
        stderr
    );
    assert!(stdout.contains("fetch failed"));

    // The terminal status is visible to later status calls.
    let (stdout, _, _) = run_ckb(&config_path, &["status", &id]);
    assert!(stdout.contains("status: FAILED"));
}

#[test]
fn retrieve_degrades_to_no_grounding_when_embedding_unavailable() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (stdout, stderr, success) = run_ckb(&config_path, &["retrieve", "kick serve mechanics"]);
    assert!(
        success,
        "retrieve must not fail when embeddings are down: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("No grounding available."));
}

#[test]
fn retrieve_rejects_unknown_category() {
    let (_tmp, config_path) = setup_test_env();
    run_ckb(&config_path, &["init"]);

    let (_, stderr, success) = run_ckb(
        &config_path,
        &["retrieve", "anything", "--category", "NOT_A_CATEGORY"],
    );
    assert!(!success);
    assert!(stderr.contains("category"));
}
