use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

#[allow(deprecated)]
fn fieldmemo(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("fieldmemo").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("FIELDMEMO_CONFIG")
        .arg("--quiet")
        .arg("--config")
        .arg("config.json")
        .arg("--cache")
        .arg("cache.json");
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Value {
    let output = fieldmemo(workdir).args(args).output().expect("command run");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn setup() -> TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(
        root.join("config.json"),
        r#"{"schema_version": 1, "pipeline": {"pacing_min_ms": 0, "pacing_max_ms": 0}}"#,
    )
    .unwrap();
    fs::write(
        root.join("fields.json"),
        r##"[
            {"selector": "#email", "label": "Email", "type": "email"},
            {"selector": "#fname", "label": "First Name"},
            {"selector": "#skills", "label": "Skills", "type": "checkbox"},
            {"selector": "#notice", "label": "Notice Period", "type": "select",
             "sectionType": "work", "fieldIndex": "1"}
        ]"##,
    )
    .unwrap();
    fs::write(
        root.join("profile.json"),
        r#"{"email": "ada@example.com", "First Name": "Ada", "skills": ["Rust", "Go"],
            "notice_period": "2 weeks"}"#,
    )
    .unwrap();
    temp
}

#[test]
fn classify_prints_keys_and_classifications() {
    let temp = setup();
    let body = run_json(temp.path(), &["classify", "fields.json"]);
    assert_eq!(body["keys"]["#email"], "email");
    assert_eq!(body["keys"]["#fname"], "first_name");
    assert_eq!(body["keys"]["#notice"], "notice_period");
    assert!(!temp.path().join("cache.json").exists());
}

#[test]
fn resolve_learns_then_replays_from_cache() {
    let temp = setup();
    let first = run_json(
        temp.path(),
        &["resolve", "fields.json", "--profile", "profile.json"],
    );
    assert_eq!(first["stats"]["resolved"], 4);
    assert_eq!(first["stats"]["written_back"], 4);
    assert_eq!(first["stats"]["by_source"]["rule_engine"], 3);
    assert_eq!(first["stats"]["by_source"]["composite_handler"], 1);
    assert!(temp.path().join("cache.json").exists());

    let second = run_json(temp.path(), &["resolve", "fields.json"]);
    assert_eq!(second["stats"]["by_source"]["cache"], 4);
    assert_eq!(second["results"]["#skills"]["value"][1], "Go");
    assert_eq!(second["results"]["#notice"]["value"], "2 weeks");

    let stats = run_json(temp.path(), &["stats"]);
    assert_eq!(stats["atomic_single"], 3);
    assert_eq!(stats["atomic_multi"], 1);
}

#[test]
fn remember_then_lookup() {
    let temp = setup();
    let stored = run_json(
        temp.path(),
        &["remember", "--label", "Phone Number", "--value", "+351 912 000 000"],
    );
    assert_eq!(stored["outcome"], "stored");
    assert_eq!(stored["key"], "phone");

    let hit = run_json(temp.path(), &["lookup", "--label", "Mobile"]);
    assert_eq!(hit["value"], "+351 912 000 000");
    assert_eq!(hit["source"], "exact");

    let miss = run_json(temp.path(), &["lookup", "--label", "Favourite colour"]);
    assert!(miss.is_null());
}

#[test]
fn remember_section_rows() {
    let temp = setup();
    for (index, title) in [(0, "Engineer"), (1, "Lead")] {
        run_json(
            temp.path(),
            &[
                "remember",
                "--label",
                "Job Title",
                "--section",
                "work",
                "--index",
                &index.to_string(),
                "--value",
                title,
            ],
        );
    }
    let hit = run_json(
        temp.path(),
        &["lookup", "--label", "Job Title", "--section", "work", "--index", "1"],
    );
    assert_eq!(hit["value"], "Lead");
    assert_eq!(hit["source"], "section_row");
}

#[test]
fn sweep_and_schema_print_json() {
    let temp = setup();
    let report = run_json(temp.path(), &["sweep"]);
    assert_eq!(report["removed"], 0);

    let schema = run_json(temp.path(), &["schema"]);
    assert!(schema["properties"]["label"].is_object(), "{schema}");
    assert!(schema["properties"]["sectionType"].is_object(), "{schema}");
}

#[test]
fn invalid_config_is_reported() {
    let temp = setup();
    fs::write(
        temp.path().join("config.json"),
        r#"{"matcher": {"threshold": 3.0}}"#,
    )
    .unwrap();
    fieldmemo(temp.path())
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("matcher.threshold"));
}
