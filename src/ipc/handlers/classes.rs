use crate::conflict;
use crate::ids;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    class_id_for, course_catalog_id, i64_param, professor_exists, require_conn, str_param,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveTime;
use rusqlite::Connection;
use serde_json::json;

const TIME_FORMAT: &str = "%H:%M:%S";

fn time_param(req: &Request, name: &str) -> Result<String, HandlerErr> {
    let raw = str_param(req, name)?;
    let parsed = NaiveTime::parse_from_str(&raw, TIME_FORMAT)
        .map_err(|_| HandlerErr::bad_params(format!("{} must be HH:MM:SS", name)))?;
    // Normalize so stored times compare lexically.
    Ok(parsed.format(TIME_FORMAT).to_string())
}

fn create_class(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let season = str_param(req, "season")?;
    let year = i64_param(req, "year")?;
    let location = str_param(req, "location")?;
    let start = time_param(req, "start")?;
    let end = time_param(req, "end")?;
    let instructor = str_param(req, "instructor")?;
    if start >= end {
        return Err(HandlerErr::bad_params("start must be before end"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let Some(catalog_id) = course_catalog_id(&tx, &subject, number)? else {
        return Err(HandlerErr::not_found(format!(
            "course not found: {} {}",
            subject, number
        )));
    };
    if !professor_exists(&tx, &instructor)? {
        return Err(HandlerErr::not_found(format!(
            "professor not found: {}",
            instructor
        )));
    }
    if conflict::class_exists(&tx, catalog_id, &season, year)? {
        return Err(HandlerErr::conflict(format!(
            "course already offered in {} {}",
            season, year
        )));
    }
    if conflict::class_location_overlaps(&tx, &season, year, &location, &start, &end)? {
        return Err(HandlerErr::conflict(format!(
            "location occupied during that time: {}",
            location
        )));
    }

    let class_id = ids::next_class_id(&tx)?;
    tx.execute(
        "INSERT INTO classes(class_id, listing, season, year, location, start_time, end_time, taught_by)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![class_id, catalog_id, season, year, location, start, end, instructor],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "classId": class_id }))
}

/// All offerings of one course, with the teaching professor's name.
fn list_offerings(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;

    let mut stmt = conn.prepare(
        "SELECT cl.season, cl.year, cl.location, cl.start_time, cl.end_time,
                p.first_name, p.last_name
         FROM classes cl
         JOIN courses c ON c.catalog_id = cl.listing
         JOIN professors p ON p.uid = cl.taught_by
         WHERE c.department = ? AND c.number = ?
         ORDER BY cl.year, cl.season",
    )?;
    let offerings = stmt
        .query_map(rusqlite::params![subject, number], |r| {
            let season: String = r.get(0)?;
            let year: i64 = r.get(1)?;
            let location: String = r.get(2)?;
            let start: String = r.get(3)?;
            let end: String = r.get(4)?;
            let fname: String = r.get(5)?;
            let lname: String = r.get(6)?;
            Ok(json!({
                "season": season,
                "year": year,
                "location": location,
                "start": start,
                "end": end,
                "fname": fname,
                "lname": lname
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "offerings": offerings }))
}

/// Roster of one offering with each student's current grade.
fn list_class_students(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let season = str_param(req, "season")?;
    let year = i64_param(req, "year")?;

    let Some(class_id) = class_id_for(conn, &subject, number, &season, year)? else {
        return Err(HandlerErr::not_found("class offering not found"));
    };

    let mut stmt = conn.prepare(
        "SELECT s.first_name, s.last_name, s.uid, s.dob, e.grade
         FROM enrollments e
         JOIN students s ON s.uid = e.student_uid
         WHERE e.class_id = ?
         ORDER BY s.last_name, s.first_name",
    )?;
    let students = stmt
        .query_map([class_id], |r| {
            let fname: String = r.get(0)?;
            let lname: String = r.get(1)?;
            let uid: String = r.get(2)?;
            let dob: String = r.get(3)?;
            let grade: String = r.get(4)?;
            Ok(json!({
                "fname": fname,
                "lname": lname,
                "uid": uid,
                "dob": dob,
                "grade": grade
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "students": students }))
}

/// Classes taught by one professor.
fn list_professor_classes(
    conn: &Connection,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let mut stmt = conn.prepare(
        "SELECT c.department, c.number, c.name, cl.season, cl.year
         FROM classes cl
         JOIN courses c ON c.catalog_id = cl.listing
         WHERE cl.taught_by = ?
         ORDER BY cl.year, cl.season, c.department, c.number",
    )?;
    let classes = stmt
        .query_map([&uid], |r| {
            let subject: String = r.get(0)?;
            let number: i64 = r.get(1)?;
            let name: String = r.get(2)?;
            let season: String = r.get(3)?;
            let year: i64 = r.get(4)?;
            Ok(json!({
                "subject": subject,
                "number": number,
                "name": name,
                "season": season,
                "year": year
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" | "classes.offerings" | "classes.students" | "professor.classes" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    let result = match req.method.as_str() {
        "classes.create" => create_class(conn, req),
        "classes.offerings" => list_offerings(conn, req),
        "classes.students" => list_class_students(conn, req),
        "professor.classes" => list_professor_classes(conn, req),
        _ => return Some(err(&req.id, "not_implemented", "unreachable", None)),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
