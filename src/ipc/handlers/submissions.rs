use crate::grade;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::assignments::DATETIME_FORMAT;
use crate::ipc::helpers::{
    assignment_id_for, class_id_for, f64_param, i64_param, require_conn, str_param, student_exists,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn resolve_class(conn: &Connection, req: &Request) -> Result<i64, HandlerErr> {
    let subject = str_param(req, "subject")?;
    let number = i64_param(req, "number")?;
    let season = str_param(req, "season")?;
    let year = i64_param(req, "year")?;
    class_id_for(conn, &subject, number, &season, year)?
        .ok_or_else(|| HandlerErr::not_found("class offering not found"))
}

fn resolve_assignment(
    conn: &Connection,
    req: &Request,
    class_id: i64,
) -> Result<String, HandlerErr> {
    let category = str_param(req, "category")?;
    let name = str_param(req, "asgname")?;
    assignment_id_for(conn, class_id, &category, &name)?
        .ok_or_else(|| HandlerErr::not_found("assignment not found"))
}

/// First submission inserts with score 0; resubmission replaces contents and
/// timestamp but keeps the previously recorded score.
fn submit(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let contents = str_param(req, "contents")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let class_id = resolve_class(&tx, req)?;
    let assignment_id = resolve_assignment(&tx, req, class_id)?;
    if !student_exists(&tx, &uid)? {
        return Err(HandlerErr::not_found(format!("student not found: {}", uid)));
    }

    let submitted_at = chrono::Local::now().format(DATETIME_FORMAT).to_string();
    let submission_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO submissions(id, assignment_id, student_uid, contents, submitted_at, score)
         VALUES(?, ?, ?, ?, ?, 0)
         ON CONFLICT(assignment_id, student_uid) DO UPDATE SET
           contents = excluded.contents,
           submitted_at = excluded.submitted_at",
        rusqlite::params![submission_id, assignment_id, uid, contents, submitted_at],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "submittedAt": submitted_at }))
}

/// Submission contents for one (assignment, student); empty string when the
/// student has not submitted.
fn submission_text(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let class_id = resolve_class(conn, req)?;
    let assignment_id = resolve_assignment(conn, req, class_id)?;

    let contents: Option<String> = conn
        .query_row(
            "SELECT contents FROM submissions WHERE assignment_id = ? AND student_uid = ?",
            rusqlite::params![assignment_id, uid],
            |r| r.get(0),
        )
        .optional()?;
    Ok(json!({ "contents": contents.unwrap_or_default() }))
}

fn list_submissions(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = resolve_class(conn, req)?;
    let assignment_id = resolve_assignment(conn, req, class_id)?;

    let mut stmt = conn.prepare(
        "SELECT st.first_name, st.last_name, st.uid, s.submitted_at, s.score
         FROM submissions s
         JOIN students st ON st.uid = s.student_uid
         WHERE s.assignment_id = ?
         ORDER BY st.last_name, st.first_name",
    )?;
    let submissions = stmt
        .query_map([&assignment_id], |r| {
            let fname: String = r.get(0)?;
            let lname: String = r.get(1)?;
            let uid: String = r.get(2)?;
            let time: String = r.get(3)?;
            let score: f64 = r.get(4)?;
            Ok(json!({
                "fname": fname,
                "lname": lname,
                "uid": uid,
                "time": time,
                "score": score
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "submissions": submissions }))
}

/// Scores one submission and recomputes the student's letter grade for the
/// class in the same transaction, so the stored grade never lags the score.
fn grade_submission(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let uid = str_param(req, "uid")?;
    let score = f64_param(req, "score")?;
    if score < 0.0 {
        return Err(HandlerErr::bad_params("score must not be negative"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let class_id = resolve_class(&tx, req)?;
    let assignment_id = resolve_assignment(&tx, req, class_id)?;

    let changed = tx
        .execute(
            "UPDATE submissions SET score = ? WHERE assignment_id = ? AND student_uid = ?",
            rusqlite::params![score, assignment_id, uid],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("submission not found"));
    }

    let letter = grade::refresh_enrollment_grade(&tx, class_id, &uid)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "grade": letter }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.submit" | "submissions.text" | "submissions.list" | "submissions.grade" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    let result = match req.method.as_str() {
        "submissions.submit" => submit(conn, req),
        "submissions.text" => submission_text(conn, req),
        "submissions.list" => list_submissions(conn, req),
        "submissions.grade" => grade_submission(conn, req),
        _ => return Some(err(&req.id, "not_implemented", "unreachable", None)),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
