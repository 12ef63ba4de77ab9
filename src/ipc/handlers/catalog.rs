use crate::conflict;
use crate::ids;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{i64_param, require_conn, str_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn create_department(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let name = str_param(req, "name")?;
    if subject.chars().count() > conflict::MAX_SUBJECT_LEN {
        return Err(HandlerErr::bad_params(format!(
            "subject code must be at most {} characters",
            conflict::MAX_SUBJECT_LEN
        )));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if conflict::department_exists(&tx, &subject)? {
        return Err(HandlerErr::conflict(format!(
            "department already exists: {}",
            subject
        )));
    }
    tx.execute(
        "INSERT INTO departments(subject, name) VALUES(?, ?)",
        rusqlite::params![subject, name],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "subject": subject }))
}

fn list_departments(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn.prepare("SELECT subject, name FROM departments ORDER BY subject")?;
    let departments = stmt
        .query_map([], |r| {
            let subject: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "subject": subject, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "departments": departments }))
}

/// Full catalog: departments that offer at least one course, with their
/// course lists nested.
fn get_catalog(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut dept_stmt = conn.prepare(
        "SELECT d.subject, d.name
         FROM departments d
         WHERE EXISTS (SELECT 1 FROM courses c WHERE c.department = d.subject)
         ORDER BY d.subject",
    )?;
    let departments: Vec<(String, String)> = dept_stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut course_stmt = conn.prepare(
        "SELECT number, name FROM courses WHERE department = ? ORDER BY number",
    )?;
    let mut catalog = Vec::with_capacity(departments.len());
    for (subject, dname) in departments {
        let courses = course_stmt
            .query_map([&subject], |r| {
                let number: i64 = r.get(0)?;
                let cname: String = r.get(1)?;
                Ok(json!({ "number": number, "cname": cname }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        catalog.push(json!({
            "subject": subject,
            "dname": dname,
            "courses": courses
        }));
    }
    Ok(json!({ "catalog": catalog }))
}

fn list_department_courses(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let mut stmt =
        conn.prepare("SELECT number, name FROM courses WHERE department = ? ORDER BY number")?;
    let courses = stmt
        .query_map([&subject], |r| {
            let number: i64 = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "number": number, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "courses": courses }))
}

fn list_department_professors(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let mut stmt = conn.prepare(
        "SELECT last_name, first_name, uid
         FROM professors
         WHERE works_in = ?
         ORDER BY last_name, first_name",
    )?;
    let professors = stmt
        .query_map([&subject], |r| {
            let lname: String = r.get(0)?;
            let fname: String = r.get(1)?;
            let uid: String = r.get(2)?;
            Ok(json!({ "lname": lname, "fname": fname, "uid": uid }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "professors": professors }))
}

fn create_course(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let name = str_param(req, "name")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if !conflict::department_exists(&tx, &subject)? {
        return Err(HandlerErr::not_found(format!(
            "department not found: {}",
            subject
        )));
    }
    if conflict::course_exists(&tx, &subject, number)? {
        return Err(HandlerErr::conflict(format!(
            "course already exists: {} {}",
            subject, number
        )));
    }

    let catalog_id = ids::next_course_id(&tx)?;
    tx.execute(
        "INSERT INTO courses(catalog_id, department, number, name) VALUES(?, ?, ?, ?)",
        rusqlite::params![catalog_id, subject, number, name],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "catalogId": catalog_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handled = |result: Result<serde_json::Value, HandlerErr>| match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };

    match req.method.as_str() {
        "departments.create"
        | "departments.list"
        | "departments.courses"
        | "departments.professors"
        | "catalog.get"
        | "courses.create" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    Some(match req.method.as_str() {
        "departments.create" => handled(create_department(conn, req)),
        "departments.list" => handled(list_departments(conn)),
        "departments.courses" => handled(list_department_courses(conn, req)),
        "departments.professors" => handled(list_department_professors(conn, req)),
        "catalog.get" => handled(get_catalog(conn)),
        "courses.create" => handled(create_course(conn, req)),
        _ => err(&req.id, "not_implemented", "unreachable", None),
    })
}
