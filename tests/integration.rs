use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn labflow_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("labflow");
    path
}

const LAUDO_ENTITIES: &str = r#"{
  "text": "LABORATORIO CENTRAL\nPaciente: Ana Silva\nHEMOGRAMA\nHemoglobina 13.5 g/dL",
  "entities": [
    {"type": "patient_name", "mention_text": "Ana Silva"},
    {"type": "lab_name", "mention_text": "Laboratório Central"},
    {"type": "report_date", "mention_text": "03/12/2025"},
    {
      "type": "test_result",
      "properties": [
        {"type": "test_name", "mention_text": "Hemograma"},
        {"type": "collection_datetime", "mention_text": "03/12/2025 08:00"},
        {
          "type": "test_item",
          "properties": [
            {"type": "parameter_name", "mention_text": "Hemoglobina"},
            {"type": "result", "mention_text": "13.5"},
            {"type": "unit", "mention_text": "g/dL"},
            {"type": "reference_text", "mention_text": "12.0 a 16.0"}
          ]
        }
      ]
    }
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // Uploaded document plus the entity tree the extractor would return
    let uploads = root.join("uploads");
    fs::create_dir_all(&uploads).unwrap();
    fs::write(uploads.join("laudo.pdf"), b"%PDF-1.4 placeholder").unwrap();
    fs::write(uploads.join("laudo.pdf.entities.json"), LAUDO_ENTITIES).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/labflow.sqlite"

[extractor]
provider = "file"

[listing]
default_limit = 20
max_limit = 100
"#,
        root.display()
    );

    let config_path = config_dir.join("labflow.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_labflow(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = labflow_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run labflow binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn laudo_uri(config_path: &Path) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    format!("file://{}", root.join("uploads/laudo.pdf").display())
}

fn ingest(config_path: &Path, mime: &str) -> (String, String, bool) {
    let uri = laudo_uri(config_path);
    run_labflow(
        config_path,
        &[
            "ingest",
            "--patient",
            "patient-1",
            "--uri",
            &uri,
            "--mime",
            mime,
            "--uploaded-by",
            "user-1",
        ],
    )
}

fn ingested_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("ingested report "))
        .unwrap_or_else(|| panic!("no report id in output: {}", stdout))
        .trim()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_labflow(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/labflow.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, s1) = run_labflow(&config_path, &["init"]);
    let (_, _, s2) = run_labflow(&config_path, &["init"]);
    assert!(s1 && s2, "init should be idempotent");
}

#[test]
fn test_ingest_prints_report() {
    let (_tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);

    let (stdout, stderr, success) = ingest(&config_path, "application/pdf");
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("ingested report "));
    assert!(stdout.contains("patient_name:      Ana Silva"));
    assert!(stdout.contains("Hemoglobina: 13.5 g/dL"));
    assert!(stdout.contains("collected 2025-12-03 08:00"));
}

#[test]
fn test_duplicate_ingest_is_not_an_error() {
    let (_tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);

    let (_, stderr, success) = ingest(&config_path, "application/pdf");
    assert!(success, "first ingest failed: {}", stderr);

    let (stdout, stderr, success) = ingest(&config_path, "application/pdf");
    assert!(success, "duplicate ingest should exit 0: {}", stderr);
    assert_eq!(stdout.trim(), "duplicate: report already exists");
}

#[test]
fn test_ingest_rejects_unsupported_mime() {
    let (_tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);

    let (_, stderr, success) = ingest(&config_path, "text/plain");
    assert!(!success, "text/plain should be rejected");
    assert!(stderr.contains("text/plain"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_missing_entity_file_fails() {
    let (tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);
    fs::remove_file(tmp.path().join("uploads/laudo.pdf.entities.json")).unwrap();

    let (stdout, _, success) = ingest(&config_path, "application/pdf");
    assert!(!success);
    assert!(!stdout.contains("ingested report"));
}

#[test]
fn test_extraction_failure_hides_cause_from_user() {
    let (tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);
    fs::write(tmp.path().join("uploads/laudo.pdf.entities.json"), "{ bad json").unwrap();

    let (_, stderr, success) = ingest(&config_path, "application/pdf");
    assert!(!success);

    let error_line = stderr
        .lines()
        .find(|l| l.starts_with("Error:"))
        .unwrap_or_else(|| panic!("no error line in stderr: {}", stderr));
    assert_eq!(error_line, "Error: document processing failed");
    assert!(!stderr.contains("Caused by"), "stderr: {}", stderr);
}

#[test]
fn test_list_requires_known_patient() {
    let (_tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);

    let (_, _, success) = run_labflow(&config_path, &["list", "patient-1"]);
    assert!(!success, "listing an unknown patient should fail");
}

#[test]
fn test_read_commands_after_ingest() {
    let (_tmp, config_path) = setup_test_env();
    run_labflow(&config_path, &["init"]);

    let (stdout, _, success) = run_labflow(
        &config_path,
        &["patient", "add", "patient-1", "--name", "Ana Silva"],
    );
    assert!(success);
    assert!(stdout.contains("patient patient-1 (Ana Silva) registered"));

    let (stdout, stderr, success) = ingest(&config_path, "image/png");
    assert!(success, "ingest failed: {}", stderr);
    let id = ingested_id(&stdout);

    let (stdout, _, success) = run_labflow(&config_path, &["list", "patient-1"]);
    assert!(success);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("2025-12-03"));
    assert!(stdout.contains("Hemograma: Hemoglobina=13.5 g/dL"));

    let (stdout, _, success) = run_labflow(
        &config_path,
        &["timeline", "patient-1", "HEMOGLOBINA", "--json"],
    );
    assert!(success);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["value"], "13.5");
    assert_eq!(entries[0]["report_id"], id.as_str());

    let (stdout, _, success) = run_labflow(&config_path, &["get", &id, "--json"]);
    assert!(success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["patient_name"], "Ana Silva");
    assert_eq!(report["results"][0]["items"][0]["parameter_name"], "Hemoglobina");

    let (stdout, _, success) = run_labflow(&config_path, &["delete", &id]);
    assert!(success);
    assert!(stdout.contains(&format!("deleted report {}", id)));

    let (_, _, success) = run_labflow(&config_path, &["get", &id]);
    assert!(!success, "deleted report should not be found");

    // With the report gone the same upload is accepted again
    let (stdout, _, success) = ingest(&config_path, "application/pdf");
    assert!(success);
    assert!(stdout.contains("ingested report "));
}

#[test]
fn test_completions_without_config() {
    let binary = labflow_binary();
    let output = Command::new(&binary)
        .args(["--config", "/nonexistent/labflow.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("labflow"));
}
