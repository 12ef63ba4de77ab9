use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    class_id_for, i64_param, require_conn, str_param, student_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn resolve_class(conn: &Connection, req: &Request) -> Result<i64, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let season = str_param(req, "season")?;
    let year = i64_param(req, "year")?;
    class_id_for(conn, &subject, number, &season, year)?
        .ok_or_else(|| HandlerErr::not_found("class offering not found"))
}

fn already_enrolled(conn: &Connection, class_id: i64, uid: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE class_id = ? AND student_uid = ?",
            rusqlite::params![class_id, uid],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Registers a student in an offering. The grade starts as the "--" sentinel
/// and stays there until the first score is recorded.
fn enroll(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let class_id = resolve_class(&tx, req)?;
    if !student_exists(&tx, &uid)? {
        return Err(HandlerErr::not_found(format!("student not found: {}", uid)));
    }
    if already_enrolled(&tx, class_id, &uid)? {
        return Err(HandlerErr::conflict("student already enrolled"));
    }

    tx.execute(
        "INSERT INTO enrollments(class_id, student_uid, grade) VALUES(?, ?, ?)",
        rusqlite::params![class_id, uid, grade::UNGRADED],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "grade": grade::UNGRADED }))
}

/// Classes one student is enrolled in, with current grades.
fn list_student_classes(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let mut stmt = conn.prepare(
        "SELECT c.department, c.number, c.name, cl.season, cl.year, e.grade
         FROM enrollments e
         JOIN classes cl ON cl.class_id = e.class_id
         JOIN courses c ON c.catalog_id = cl.listing
         WHERE e.student_uid = ?
         ORDER BY cl.year, cl.season, c.department, c.number",
    )?;
    let classes = stmt
        .query_map([&uid], |r| {
            let subject: String = r.get(0)?;
            let number: i64 = r.get(1)?;
            let name: String = r.get(2)?;
            let season: String = r.get(3)?;
            let year: i64 = r.get(4)?;
            let grade: String = r.get(5)?;
            Ok(json!({
                "subject": subject,
                "number": number,
                "name": name,
                "season": season,
                "year": year,
                "grade": grade
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "classes": classes }))
}

/// Assignments of a class the student is enrolled in, with the student's
/// score where a submission exists (null otherwise).
fn list_student_assignments(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let class_id = resolve_class(conn, req)?;
    if !already_enrolled(conn, class_id, &uid)? {
        return Err(HandlerErr::not_found("enrollment not found"));
    }

    let mut stmt = conn.prepare(
        "SELECT a.name, c.name, a.due, s.score
         FROM assignments a
         JOIN categories c ON c.id = a.category_id
         LEFT JOIN submissions s ON s.assignment_id = a.id AND s.student_uid = ?
         WHERE c.class_id = ?
         ORDER BY c.name, a.due",
    )?;
    let assignments = stmt
        .query_map(rusqlite::params![uid, class_id], |r| {
            let aname: String = r.get(0)?;
            let cname: String = r.get(1)?;
            let due: String = r.get(2)?;
            let score: Option<f64> = r.get(3)?;
            Ok(json!({
                "aname": aname,
                "cname": cname,
                "due": due,
                "score": score
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "assignments": assignments }))
}

/// Grade-point average over graded classes; "--" enrollments are excluded,
/// and a student with no graded classes has a GPA of 0.0.
fn student_gpa(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    if !student_exists(conn, &uid)? {
        return Err(HandlerErr::not_found(format!("student not found: {}", uid)));
    }

    let mut stmt = conn.prepare("SELECT grade FROM enrollments WHERE student_uid = ?")?;
    let grades: Vec<String> = stmt
        .query_map([&uid], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let points: Vec<f64> = grades
        .iter()
        .filter_map(|g| grade::grade_points(g))
        .collect();
    let gpa = if points.is_empty() {
        0.0
    } else {
        points.iter().sum::<f64>() / points.len() as f64
    };
    Ok(json!({ "gpa": gpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollments.create" | "student.classes" | "student.assignments" | "student.gpa" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    let result = match req.method.as_str() {
        "enrollments.create" => enroll(conn, req),
        "student.classes" => list_student_classes(conn, req),
        "student.assignments" => list_student_assignments(conn, req),
        "student.gpa" => student_gpa(conn, req),
        _ => return Some(err(&req.id, "not_implemented", "unreachable", None)),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
