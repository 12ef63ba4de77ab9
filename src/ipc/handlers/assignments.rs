use crate::conflict;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    category_id_for, class_id_for, f64_param, i64_param, opt_str_param, require_conn, str_param,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn resolve_class(conn: &Connection, req: &Request) -> Result<i64, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let season = str_param(req, "season")?;
    let year = i64_param(req, "year")?;
    class_id_for(conn, &subject, number, &season, year)?
        .ok_or_else(|| HandlerErr::not_found("class offering not found"))
}

fn due_param(req: &Request) -> Result<String, HandlerErr> {
    let raw = str_param(req, "due")?;
    let parsed = NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| HandlerErr::bad_params("due must be YYYY-MM-DD HH:MM:SS"))?;
    Ok(parsed.format(DATETIME_FORMAT).to_string())
}

fn create_assignment(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let category = str_param(req, "category")?;
    let name = str_param(req, "name")?;
    let points = f64_param(req, "points")?;
    let due = due_param(req)?;
    let contents = str_param(req, "contents")?;
    if points < 0.0 {
        return Err(HandlerErr::bad_params("points must not be negative"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let class_id = resolve_class(&tx, req)?;
    let Some(category_id) = category_id_for(&tx, class_id, &category)? else {
        return Err(HandlerErr::not_found(format!(
            "category not found: {}",
            category
        )));
    };
    if conflict::assignment_exists(&tx, &category_id, &name)? {
        return Err(HandlerErr::conflict(format!(
            "assignment already exists: {}",
            name
        )));
    }

    let assignment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO assignments(id, category_id, name, max_points, due, contents)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![assignment_id, category_id, name, points, due, contents],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "assignmentId": assignment_id }))
}

/// Assignments in one class, optionally restricted to a category. Each row
/// carries its submission count.
fn list_assignments(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = resolve_class(conn, req)?;
    let category = opt_str_param(req, "category");

    let mut stmt = conn.prepare(
        "SELECT a.name, c.name, a.due,
                (SELECT COUNT(*) FROM submissions s WHERE s.assignment_id = a.id)
         FROM assignments a
         JOIN categories c ON c.id = a.category_id
         WHERE c.class_id = ?1 AND (?2 IS NULL OR c.name = ?2)
         ORDER BY c.name, a.due",
    )?;
    let assignments = stmt
        .query_map(rusqlite::params![class_id, category], |r| {
            let aname: String = r.get(0)?;
            let cname: String = r.get(1)?;
            let due: String = r.get(2)?;
            let submissions: i64 = r.get(3)?;
            Ok(json!({
                "aname": aname,
                "cname": cname,
                "due": due,
                "submissions": submissions
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "assignments": assignments }))
}

fn assignment_contents(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = resolve_class(conn, req)?;
    let category = str_param(req, "category")?;
    let name = str_param(req, "name")?;

    let contents: Option<String> = {
        use rusqlite::OptionalExtension;
        conn.query_row(
            "SELECT a.contents
             FROM assignments a
             JOIN categories c ON c.id = a.category_id
             WHERE c.class_id = ? AND c.name = ? AND a.name = ?",
            rusqlite::params![class_id, category, name],
            |r| r.get(0),
        )
        .optional()?
    };
    match contents {
        Some(contents) => Ok(json!({ "contents": contents })),
        None => Err(HandlerErr::not_found("assignment not found")),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" | "assignments.list" | "assignments.contents" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    let result = match req.method.as_str() {
        "assignments.create" => create_assignment(conn, req),
        "assignments.list" => list_assignments(conn, req),
        "assignments.contents" => assignment_contents(conn, req),
        _ => return Some(err(&req.id, "not_implemented", "unreachable", None)),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
