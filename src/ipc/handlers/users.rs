use crate::conflict;
use crate::ids;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    opt_str_param, referential_policy, require_conn, str_param, HandlerErr, ReferentialPolicy,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Student,
    Professor,
    Administrator,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "Student" => Some(Self::Student),
            "Professor" => Some(Self::Professor),
            "Administrator" => Some(Self::Administrator),
            _ => None,
        }
    }
}

/// Resolves the department reference for a new student/professor. Lenient
/// policy drops a dangling reference; strict policy fails the creation.
fn resolve_department(
    conn: &Connection,
    department: Option<String>,
    policy: ReferentialPolicy,
) -> Result<Option<String>, HandlerErr> {
    let Some(subject) = department else {
        return Ok(None);
    };
    if conflict::department_exists(conn, &subject)? {
        return Ok(Some(subject));
    }
    match policy {
        ReferentialPolicy::Lenient => Ok(None),
        ReferentialPolicy::Strict => Err(HandlerErr::not_found(format!(
            "department not found: {}",
            subject
        ))),
    }
}

fn create_user(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let role_name = str_param(req, "role")?;
    let Some(role) = Role::parse(&role_name) else {
        return Err(HandlerErr::bad_params(
            "role must be Student, Professor, or Administrator",
        ));
    };
    let first_name = str_param(req, "firstName")?;
    let last_name = str_param(req, "lastName")?;
    let dob = str_param(req, "dob")?;
    if NaiveDate::parse_from_str(&dob, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params("dob must be YYYY-MM-DD"));
    }
    let department = opt_str_param(req, "department");
    let policy = referential_policy(conn)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let uid = ids::next_user_id(&tx)?;
    match role {
        Role::Student => {
            let major = resolve_department(&tx, department, policy)?;
            tx.execute(
                "INSERT INTO students(uid, first_name, last_name, dob, major)
                 VALUES(?, ?, ?, ?, ?)",
                rusqlite::params![uid, first_name, last_name, dob, major],
            )
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        }
        Role::Professor => {
            let works_in = resolve_department(&tx, department, policy)?;
            tx.execute(
                "INSERT INTO professors(uid, first_name, last_name, dob, works_in)
                 VALUES(?, ?, ?, ?, ?)",
                rusqlite::params![uid, first_name, last_name, dob, works_in],
            )
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        }
        Role::Administrator => {
            tx.execute(
                "INSERT INTO administrators(uid, first_name, last_name, dob)
                 VALUES(?, ?, ?, ?)",
                rusqlite::params![uid, first_name, last_name, dob],
            )
            .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "uid": uid }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match create_user(conn, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

/// Looks a user up across the three role tables: administrators first, then
/// students, then professors. Students and professors carry the name of
/// their major / employing department when one is set.
fn find_user(conn: &Connection, uid: &str) -> Result<Option<serde_json::Value>, HandlerErr> {
    let admin: Option<(String, String)> = conn
        .query_row(
            "SELECT first_name, last_name FROM administrators WHERE uid = ?",
            [uid],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((fname, lname)) = admin {
        return Ok(Some(json!({ "fname": fname, "lname": lname, "uid": uid })));
    }

    let student: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT s.first_name, s.last_name, d.name
             FROM students s
             LEFT JOIN departments d ON d.subject = s.major
             WHERE s.uid = ?",
            [uid],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    if let Some((fname, lname, department)) = student {
        return Ok(Some(json!({
            "fname": fname,
            "lname": lname,
            "uid": uid,
            "department": department
        })));
    }

    let professor: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT p.first_name, p.last_name, d.name
             FROM professors p
             LEFT JOIN departments d ON d.subject = p.works_in
             WHERE p.uid = ?",
            [uid],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    if let Some((fname, lname, department)) = professor {
        return Ok(Some(json!({
            "fname": fname,
            "lname": lname,
            "uid": uid,
            "department": department
        })));
    }

    Ok(None)
}

fn handle_users_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let uid = match str_param(req, "uid") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match find_user(conn, &uid) {
        Ok(Some(user)) => ok(&req.id, user),
        Ok(None) => err(&req.id, "not_found", "user not found", None),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        "users.get" => Some(handle_users_get(state, req)),
        _ => None,
    }
}
