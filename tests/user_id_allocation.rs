use rusqlite::Connection;
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

fn create_user(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    role: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "users.create",
        json!({
            "role": role,
            "firstName": "Test",
            "lastName": "Person",
            "dob": "2000-01-01"
        }),
    );
    result
        .get("uid")
        .and_then(|v| v.as_str())
        .expect("uid")
        .to_string()
}

#[test]
fn first_user_in_an_empty_store_is_u0000001() {
    let workspace = temp_dir("registrar-ids-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let uid = create_user(&mut stdin, &mut reader, "2", "Student");
    assert_eq!(uid, "u0000001");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn next_id_is_max_plus_one_across_all_role_tables() {
    let workspace = temp_dir("registrar-ids-max");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Seed one person per table with gaps; the professors table holds the max.
    let conn = Connection::open(workspace.join("registrar.sqlite3")).expect("open db");
    conn.execute(
        "INSERT INTO students(uid, first_name, last_name, dob) VALUES('u0000003', 'S', 'S', '2000-01-01')",
        [],
    )
    .expect("seed student");
    conn.execute(
        "INSERT INTO professors(uid, first_name, last_name, dob) VALUES('u0000007', 'P', 'P', '1970-01-01')",
        [],
    )
    .expect("seed professor");
    conn.execute(
        "INSERT INTO administrators(uid, first_name, last_name, dob) VALUES('u0000002', 'A', 'A', '1980-01-01')",
        [],
    )
    .expect("seed admin");

    let uid = create_user(&mut stdin, &mut reader, "2", "Administrator");
    assert_eq!(uid, "u0000008");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sequential_creations_get_distinct_increasing_ids() {
    let workspace = temp_dir("registrar-ids-seq");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let roles = ["Student", "Professor", "Administrator", "Student", "Student"];
    let mut uids = Vec::new();
    for (i, role) in roles.iter().enumerate() {
        uids.push(create_user(
            &mut stdin,
            &mut reader,
            &format!("u{}", i),
            role,
        ));
    }

    let mut sorted = uids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), uids.len(), "ids must be pairwise distinct");
    for pair in uids.windows(2) {
        assert!(pair[0] < pair[1], "ids must increase in creation order");
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_stored_id_makes_allocation_fail_closed() {
    let workspace = temp_dir("registrar-ids-malformed");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let conn = Connection::open(workspace.join("registrar.sqlite3")).expect("open db");
    conn.execute(
        "INSERT INTO students(uid, first_name, last_name, dob) VALUES('x9999999', 'S', 'S', '2000-01-01')",
        [],
    )
    .expect("seed malformed uid");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({
            "role": "Student",
            "firstName": "Test",
            "lastName": "Person",
            "dob": "2000-01-01"
        }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(error_code(&resp), "data_integrity");

    // Nothing new was written.
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))
        .expect("count students");
    assert_eq!(count, 1);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
