use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOK_WORKSPACE")
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("success").and_then(|v| v.as_bool()), Some(false));
    value.get("code").and_then(|v| v.as_str()).unwrap_or("")
}

fn create_learner(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    full_name: &str,
    class_level: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "learners.create",
        json!({ "fullName": full_name, "classLevel": class_level }),
    );
    created
        .get("learnerId")
        .and_then(|v| v.as_str())
        .expect("learnerId")
        .to_string()
}

fn score(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    learner_id: &str,
    term: &str,
    subject: &str,
    fields: serde_json::Value,
) {
    let mut params = json!({
        "learnerId": learner_id,
        "session": "2024/2025",
        "term": term,
        "subject": subject
    });
    if let (Some(dst), Some(src)) = (params.as_object_mut(), fields.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    let _ = request_ok(stdin, reader, id, "results.upsertSubject", params);
}

#[test]
fn class_extremes_report_highest_and_lowest_totals() {
    let workspace = temp_dir("gradebook-class-extremes");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let ada = create_learner(&mut stdin, &mut reader, "2", "Ada Obi", "SS1");
    let bola = create_learner(&mut stdin, &mut reader, "3", "Bola Ade", "SS1");
    let chidi = create_learner(&mut stdin, &mut reader, "4", "Chidi Eze", "SS1");
    // Enrolled but never scored this term.
    let _dayo = create_learner(&mut stdin, &mut reader, "5", "Dayo Ola", "SS1");

    score(
        &mut stdin,
        &mut reader,
        "6",
        &ada,
        "First Term",
        "Mathematics",
        json!({ "ca1": 15, "ca2": 15, "hf": 5, "project": 5, "exams": 55 }),
    );
    score(
        &mut stdin,
        &mut reader,
        "7",
        &bola,
        "First Term",
        "Mathematics",
        json!({ "ca1": 15, "ca2": 15, "exams": 50 }),
    );
    score(
        &mut stdin,
        &mut reader,
        "8",
        &chidi,
        "First Term",
        "Mathematics",
        json!({ "exams": 40 }),
    );
    score(
        &mut stdin,
        &mut reader,
        "9",
        &chidi,
        "First Term",
        "English",
        json!({ "ca1": 12, "exams": 10 }),
    );
    // Other terms must not count.
    score(
        &mut stdin,
        &mut reader,
        "10",
        &chidi,
        "Second Term",
        "English",
        json!({ "exams": 60 }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "summary.classExtremes",
        json!({ "classLevel": "SS1", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(summary["highest"]["total"].as_f64(), Some(95.0));
    assert_eq!(summary["highest"]["learnerId"], ada.as_str());
    assert_eq!(summary["highest"]["fullName"], "Ada Obi");
    assert_eq!(summary["lowest"]["total"].as_f64(), Some(62.0));
    assert_eq!(summary["lowest"]["learnerId"], chidi.as_str());
    assert_eq!(summary["learnerCount"], 3);

    // Raise Bola to tie with Ada: the earlier learner keeps the top spot.
    score(
        &mut stdin,
        &mut reader,
        "12",
        &bola,
        "First Term",
        "Mathematics",
        json!({ "hf": 5, "project": 5, "exams": 55 }),
    );
    let tied = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "summary.classExtremes",
        json!({ "classLevel": "SS1", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(tied["highest"]["learnerId"], ada.as_str());
    assert_eq!(tied["highest"]["total"].as_f64(), Some(95.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn class_extremes_not_found_reasons_are_distinct() {
    let workspace = temp_dir("gradebook-class-extremes-missing");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let no_learners = request(
        &mut stdin,
        &mut reader,
        "2",
        "summary.classExtremes",
        json!({ "classLevel": "SS3", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(error_code(&no_learners), "not_found");
    assert_eq!(no_learners["details"]["reason"], "no_learners");

    let eze = create_learner(&mut stdin, &mut reader, "3", "Eze Nna", "SS3");
    let no_results = request(
        &mut stdin,
        &mut reader,
        "4",
        "summary.classExtremes",
        json!({ "classLevel": "SS3", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(no_results["details"]["reason"], "no_results");

    score(
        &mut stdin,
        &mut reader,
        "5",
        &eze,
        "Second Term",
        "Physics",
        json!({ "exams": 30 }),
    );
    let no_term = request(
        &mut stdin,
        &mut reader,
        "6",
        "summary.classExtremes",
        json!({ "classLevel": "SS3", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(error_code(&no_term), "not_found");
    assert_eq!(no_term["details"]["reason"], "no_term_entries");

    // A zero total is still a found result.
    score(
        &mut stdin,
        &mut reader,
        "7",
        &eze,
        "First Term",
        "Physics",
        json!({ "exams": 0 }),
    );
    let zero = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "summary.classExtremes",
        json!({ "classLevel": "SS3", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(zero["highest"]["total"].as_f64(), Some(0.0));
    assert_eq!(zero["lowest"]["total"].as_f64(), Some(0.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn class_extremes_skip_inactive_learners() {
    let workspace = temp_dir("gradebook-class-extremes-inactive");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let ada = create_learner(&mut stdin, &mut reader, "2", "Ada Obi", "JSS3");
    let left = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "learners.create",
        json!({ "fullName": "Left School", "classLevel": "JSS3", "active": false }),
    );
    let left = left["learnerId"].as_str().expect("learnerId").to_string();

    score(
        &mut stdin,
        &mut reader,
        "4",
        &ada,
        "First Term",
        "Mathematics",
        json!({ "exams": 50 }),
    );
    score(
        &mut stdin,
        &mut reader,
        "5",
        &left,
        "First Term",
        "Mathematics",
        json!({ "exams": 60 }),
    );

    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "summary.classExtremes",
        json!({ "classLevel": "JSS3", "session": "2024/2025", "term": "First Term" }),
    );
    assert_eq!(summary["highest"]["learnerId"], ada.as_str());
    assert_eq!(summary["lowest"]["learnerId"], ada.as_str());
    assert_eq!(summary["learnerCount"], 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
