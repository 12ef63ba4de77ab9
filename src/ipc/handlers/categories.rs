use crate::conflict;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{class_id_for, f64_param, i64_param, require_conn, str_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
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

fn create_category(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let name = str_param(req, "name")?;
    let weight = f64_param(req, "weight")?;
    if weight < 0.0 {
        return Err(HandlerErr::bad_params("weight must not be negative"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let class_id = resolve_class(&tx, req)?;
    if conflict::category_exists(&tx, class_id, &name)? {
        return Err(HandlerErr::conflict(format!(
            "category already exists: {}",
            name
        )));
    }

    let category_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO categories(id, class_id, name, weight) VALUES(?, ?, ?, ?)",
        rusqlite::params![category_id, class_id, name, weight],
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "categoryId": category_id }))
}

fn list_categories(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = resolve_class(conn, req)?;
    let mut stmt =
        conn.prepare("SELECT name, weight FROM categories WHERE class_id = ? ORDER BY name")?;
    let categories = stmt
        .query_map([class_id], |r| {
            let name: String = r.get(0)?;
            let weight: f64 = r.get(1)?;
            Ok(json!({ "name": name, "weight": weight }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(json!({ "categories": categories }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "categories.create" | "categories.list" => {}
        _ => return None,
    }

    let conn = match require_conn(state) {
        Ok(c) => c,
        Err(e) => return Some(e.response(&req.id)),
    };

    let result = match req.method.as_str() {
        "categories.create" => create_category(conn, req),
        "categories.list" => list_categories(conn, req),
        _ => return Some(err(&req.id, "not_implemented", "unreachable", None)),
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
