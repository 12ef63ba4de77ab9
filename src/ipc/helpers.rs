use crate::db;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

impl From<crate::ids::IdError> for HandlerErr {
    fn from(e: crate::ids::IdError) -> Self {
        HandlerErr::new(e.code, e.message)
    }
}

impl From<crate::grade::GradeError> for HandlerErr {
    fn from(e: crate::grade::GradeError) -> Self {
        HandlerErr::new(e.code, e.message)
    }
}

pub fn require_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn str_param(req: &Request, name: &str) -> Result<String, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", name)))
}

pub fn opt_str_param(req: &Request, name: &str) -> Option<String> {
    req.params
        .get(name)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn i64_param(req: &Request, name: &str) -> Result<i64, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", name)))
}

pub fn f64_param(req: &Request, name: &str) -> Result<f64, HandlerErr> {
    req.params
        .get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", name)))
}

/// Catalog id of the (department, number) course.
pub fn course_catalog_id(
    conn: &Connection,
    subject: &str,
    number: i64,
) -> Result<Option<i64>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT catalog_id FROM courses WHERE department = ? AND number = ?",
            rusqlite::params![subject, number],
            |r| r.get(0),
        )
        .optional()?)
}

/// Class id of the offering of (department, number) in (season, year).
pub fn class_id_for(
    conn: &Connection,
    subject: &str,
    number: i64,
    season: &str,
    year: i64,
) -> Result<Option<i64>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT cl.class_id
             FROM classes cl
             JOIN courses c ON c.catalog_id = cl.listing
             WHERE c.department = ? AND c.number = ? AND cl.season = ? AND cl.year = ?",
            rusqlite::params![subject, number, season, year],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn category_id_for(
    conn: &Connection,
    class_id: i64,
    name: &str,
) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT id FROM categories WHERE class_id = ? AND name = ?",
            rusqlite::params![class_id, name],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn assignment_id_for(
    conn: &Connection,
    class_id: i64,
    category: &str,
    name: &str,
) -> Result<Option<String>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT a.id
             FROM assignments a
             JOIN categories c ON c.id = a.category_id
             WHERE c.class_id = ? AND c.name = ? AND a.name = ?",
            rusqlite::params![class_id, category, name],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn student_exists(conn: &Connection, uid: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM students WHERE uid = ?", [uid], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn professor_exists(conn: &Connection, uid: &str) -> Result<bool, HandlerErr> {
    Ok(conn
        .query_row("SELECT 1 FROM professors WHERE uid = ?", [uid], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

/// Settings key holding the referential policy section.
pub const REFERENTIAL_KEY: &str = "registrar.referential";

/// What to do when a new student/professor names a department that does not
/// exist: drop the reference (the historical behavior) or fail the creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialPolicy {
    Lenient,
    Strict,
}

impl ReferentialPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lenient" => Some(Self::Lenient),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }
}

pub fn referential_policy(conn: &Connection) -> Result<ReferentialPolicy, HandlerErr> {
    let saved = db::settings_get_json(conn, REFERENTIAL_KEY)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let policy = saved
        .as_ref()
        .and_then(|v| v.get("policy"))
        .and_then(|v| v.as_str())
        .and_then(ReferentialPolicy::parse)
        .unwrap_or(ReferentialPolicy::Lenient);
    Ok(policy)
}

pub fn referential_defaults(policy: ReferentialPolicy) -> serde_json::Value {
    json!({ "policy": policy.as_str() })
}
