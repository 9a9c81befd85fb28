use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragwatch_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ragwatch"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("alpha.md"),
        "# Alpha\n\nThe alpha service deploys with cargo and runs on port 8080.",
    )
    .unwrap();
    fs::write(
        docs.join("beta.txt"),
        "Beta notes about brewing green tea at eighty degrees.",
    )
    .unwrap();
    fs::write(
        docs.join("people.csv"),
        "name,role\nAda,engineer\nGrace,admiral\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[documents]
dir = "{root}/docs"

[results]
dir = "{root}/results"

[store]
backend = "sqlite"
path = "{root}/results/vectors.sqlite"

[retrieval]
k = 2
"#,
        root = root.display()
    );
    let config_path = root.join("ragwatch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragwatch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(ragwatch_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run ragwatch");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_index_then_list() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_ragwatch(&config, &["index"]);
    assert!(ok, "index failed: {stderr}");
    assert!(stdout.contains("Indexed 3 of 3 files"), "{stdout}");

    let (stdout, _, ok) = run_ragwatch(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("beta.txt"));
    assert!(stdout.contains("people.csv"));
}

#[test]
fn test_index_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    run_ragwatch(&config, &["index"]);
    let (stdout, _, ok) = run_ragwatch(&config, &["index"]);
    assert!(ok);
    assert!(stdout.contains("Indexed 0 of 3 files"), "{stdout}");
    assert!(stdout.contains("3 unchanged"), "{stdout}");
}

#[test]
fn test_query_returns_context() {
    let (_tmp, config) = setup_test_env();
    run_ragwatch(&config, &["index"]);
    let (stdout, stderr, ok) = run_ragwatch(&config, &["query", "green tea brewing", "-k", "1"]);
    assert!(ok, "query failed: {stderr}");
    assert!(stdout.contains("eighty degrees"), "{stdout}");
    assert!(stdout.contains("Sources: beta.txt"), "{stdout}");
}

#[test]
fn test_delete_by_filename() {
    let (_tmp, config) = setup_test_env();
    run_ragwatch(&config, &["index"]);
    let (stdout, _, ok) = run_ragwatch(&config, &["delete", "beta.txt"]);
    assert!(ok);
    assert!(stdout.contains("Removed 1 chunks"), "{stdout}");

    let (stdout, _, _) = run_ragwatch(&config, &["list"]);
    assert!(!stdout.contains("beta.txt"));

    let (stdout, _, ok) = run_ragwatch(&config, &["delete", "missing.txt"]);
    assert!(ok);
    assert!(stdout.contains("No indexed document"), "{stdout}");
}

#[test]
fn test_ledger_and_purge() {
    let (_tmp, config) = setup_test_env();
    run_ragwatch(&config, &["index"]);
    let (stdout, _, ok) = run_ragwatch(&config, &["ledger"]);
    assert!(ok);
    assert_eq!(stdout.lines().count(), 3);

    let (_, _, ok) = run_ragwatch(&config, &["purge"]);
    assert!(ok);
    let (stdout, _, _) = run_ragwatch(&config, &["ledger"]);
    assert!(stdout.contains("Ledger is empty."));
    let (stdout, _, _) = run_ragwatch(&config, &["list"]);
    assert!(stdout.contains("No documents indexed."));
}

#[test]
fn test_invalid_config_errors() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[chunking]\nchunk_size = 100\noverlap = 200\n").unwrap();
    let (_, stderr, ok) = run_ragwatch(&bad, &["list"]);
    assert!(!ok);
    assert!(stderr.contains("overlap"), "{stderr}");
}

#[test]
fn test_completions() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_ragwatch(&config, &["completions", "bash"]);
    assert!(ok);
    assert!(stdout.contains("ragwatch"));
}
