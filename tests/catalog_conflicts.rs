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
    let exe = env!("CARGO_BIN_EXE_registrard");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn registrard");
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
    serde_json::from_str(line.trim()).expect("parse response json")
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
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> String {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[test]
fn duplicate_department_is_a_conflict() {
    let workspace = temp_dir("registrar-dept-dup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "departments.create",
        json!({ "subject": "CS", "name": "Computer Science" }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "departments.create",
        json!({ "subject": "CS", "name": "Cognitive Science" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "conflict");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn overlong_subject_fails_validation_regardless_of_state() {
    let workspace = temp_dir("registrar-dept-long");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "departments.create",
        json!({ "subject": "TOOLONG", "name": "Too Long" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "bad_params");

    // Four characters is the longest accepted code.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "departments.create",
        json!({ "subject": "MATH", "name": "Mathematics" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn duplicate_course_number_in_department_is_a_conflict() {
    let workspace = temp_dir("registrar-course-dup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "departments.create",
        json!({ "subject": "CS", "name": "Computer Science" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "departments.create",
        json!({ "subject": "MATH", "name": "Mathematics" }),
    );

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({ "subject": "CS", "number": 5530, "name": "Database Systems" }),
    );
    assert_eq!(first.get("catalogId").and_then(|v| v.as_i64()), Some(1));

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "courses.create",
        json!({ "subject": "CS", "number": 5530, "name": "Databases Again" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "conflict");

    // Same number under another department is a different course; the
    // catalog counter keeps climbing.
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.create",
        json!({ "subject": "MATH", "number": 5530, "name": "Numerical Methods" }),
    );
    assert_eq!(second.get("catalogId").and_then(|v| v.as_i64()), Some(2));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn course_in_unknown_department_is_not_found() {
    let workspace = temp_dir("registrar-course-nodept");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "subject": "EE", "number": 1010, "name": "Circuits" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "not_found");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
