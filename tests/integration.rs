use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dqh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dqh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Flat-file source: one schema per subdirectory
    let files_dir = root.join("files").join("stage_sales");
    fs::create_dir_all(files_dir.join("staging")).unwrap();
    fs::write(
        files_dir.join("customers.csv"),
        "customer_id,name,email\n1,Ada,ada@example.com\n2,Grace,\n2,Grace,\n3,Linus,linus@example.com\n",
    )
    .unwrap();
    fs::write(
        files_dir.join("staging").join("orders.csv"),
        "order_id,customer_id,amount\n10,1,9.50\n11,2,12.00\n12,3,\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/dqh.sqlite"

[embedding]
provider = "hash"
model = "hash-v1"
dims = 256

[retrieval]
top_k = 3
min_relevance = 0.0

[reports]
output_dir = "{root}/reports"

[server]
bind = "127.0.0.1:7341"

[sources.files]
kind = "file"
base_path = "{root}/files/stage_sales"
aliases = ["csv"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("dqh.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dqh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dqh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dqh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn saved_reports(root: &Path, extension: &str) -> Vec<PathBuf> {
    let dir = root.join("reports");
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == extension))
        .collect();
    files.sort();
    files
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_dqh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("dqh.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_dqh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_dqh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sources_lists_configured_source() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dqh(&config_path, &["sources"]);
    assert!(success, "sources failed: {}", stderr);
    assert!(stdout.contains("files"));
    assert!(stdout.contains("file"));
    assert!(stdout.contains("true"));
    assert!(stdout.contains("csv"));
}

#[test]
fn test_index_source() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dqh(&config_path, &["index", "files"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 2 tables"), "got: {}", stdout);
    assert!(stdout.contains("rebuilt"));
}

#[test]
fn test_index_by_alias_and_rebuild_is_stable() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout1, _, _) = run_dqh(&config_path, &["index", "csv"]);
    let (stdout2, _, _) = run_dqh(&config_path, &["index", "csv"]);
    assert!(stdout1.contains("Indexed 2 tables"));
    assert!(stdout2.contains("Indexed 2 tables"));

    let (stdout, _, _) = run_dqh(&config_path, &["search", "orders", "--json", "--limit", "10"]);
    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["hits"].as_array().unwrap().len(), 2);
}

#[test]
fn test_index_unknown_source_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (_, stderr, success) = run_dqh(&config_path, &["index", "warehouse"]);
    assert!(!success);
    assert!(stderr.contains("unknown source"), "got: {}", stderr);
}

#[test]
fn test_search_before_index_reports_diagnostic() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dqh(&config_path, &["search", "customers"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
    assert!(stdout.contains("dqh index"), "got: {}", stdout);
}

#[test]
fn test_search_ranks_matching_table_first() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    run_dqh(&config_path, &["index", "files"]);

    let (stdout, stderr, success) = run_dqh(&config_path, &["search", "csv orders"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("connector: files"), "got: {}", stdout);
    let first = stdout.lines().find(|l| l.starts_with("1.")).unwrap();
    assert!(first.contains("stage_sales.staging.orders"), "got: {}", stdout);
}

#[test]
fn test_search_json_scores_are_bounded() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    run_dqh(&config_path, &["index", "files"]);

    let (stdout, _, success) = run_dqh(
        &config_path,
        &["search", "customers email", "--json", "--connector", "files"],
    );
    assert!(success);
    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["inferred_connector"], "files");
    for hit in response["hits"].as_array().unwrap() {
        let score = hit["boosted_score"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}

#[test]
fn test_assess_prints_markdown() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dqh(
        &config_path,
        &["assess", "public.customers", "--source", "files"],
    );
    assert!(success, "assess failed: {}", stderr);
    assert!(stdout.contains("# Data Quality Assessment Report"));
    assert!(stdout.contains("`public.customers`"));
    assert!(stdout.contains("- **Total Checks**: 3"));
}

#[test]
fn test_assess_missing_table_is_reported_not_fatal() {
    let (_tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, _, success) = run_dqh(
        &config_path,
        &["assess", "public.missing", "--source", "files", "--format", "json"],
    );
    assert!(success);
    let assessment: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(assessment["summary"]["error_checks"], 3);
    assert_eq!(assessment["summary"]["passed_checks"], 0);
}

#[test]
fn test_assess_save_then_report_rerenders() {
    let (tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    let (stdout, stderr, success) = run_dqh(
        &config_path,
        &[
            "assess",
            "staging.orders",
            "--source",
            "csv",
            "--check",
            "null_values",
            "--format",
            "json",
            "--save",
        ],
    );
    assert!(success, "assess failed: {}", stderr);
    assert!(stdout.contains("Saved"));

    let json_reports = saved_reports(tmp.path(), "json");
    assert_eq!(json_reports.len(), 1);
    assert_eq!(saved_reports(tmp.path(), "md").len(), 1);
    assert_eq!(saved_reports(tmp.path(), "html").len(), 1);

    let report_path = json_reports[0].to_str().unwrap();
    let (html, stderr, success) =
        run_dqh(&config_path, &["report", report_path, "--format", "html"]);
    assert!(success, "report failed: {}", stderr);
    assert!(html.contains("<!DOCTYPE html>"));
    assert!(html.contains("staging.orders"));

    let (json, _, _) = run_dqh(&config_path, &["report", report_path, "--format", "json"]);
    let saved = fs::read_to_string(report_path).unwrap();
    assert_eq!(json.trim_end(), saved.trim_end());
}

#[test]
fn test_assess_rejects_unknown_format() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_dqh(
        &config_path,
        &["assess", "customers", "--source", "files", "--format", "pdf"],
    );
    assert!(!success);
    assert!(stderr.contains("unsupported format"), "got: {}", stderr);
}

#[test]
fn test_check_query_assesses_best_table() {
    let (tmp, config_path) = setup_test_env();

    run_dqh(&config_path, &["init"]);
    run_dqh(&config_path, &["index", "files"]);

    let (stdout, stderr, success) = run_dqh(&config_path, &["check", "csv orders"]);
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("# Data Quality Assessment Report"), "got: {}", stdout);
    assert!(stdout.contains("`stage_sales.staging.orders`"));
    assert_eq!(saved_reports(tmp.path(), "json").len(), 1);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_dqh(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
