use rusqlite::{Connection, OptionalExtension};

/// User ids are a 'u' followed by exactly this many decimal digits.
const USER_ID_DIGITS: usize = 7;

#[derive(Debug, Clone)]
pub struct IdError {
    pub code: &'static str,
    pub message: String,
}

impl From<rusqlite::Error> for IdError {
    fn from(e: rusqlite::Error) -> Self {
        IdError {
            code: "db_query_failed",
            message: e.to_string(),
        }
    }
}

/// Numeric value of a stored user id. A stored id that does not parse is a
/// data-integrity failure: the allocator refuses to guess rather than risk
/// reissuing or colliding.
fn user_id_value(uid: &str) -> Result<i64, IdError> {
    let malformed = || IdError {
        code: "data_integrity",
        message: format!("malformed user id in store: {:?}", uid),
    };
    let suffix = uid.strip_prefix('u').ok_or_else(malformed)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    suffix.parse::<i64>().map_err(|_| malformed())
}

fn highest_uid(conn: &Connection, table: &str) -> Result<Option<String>, IdError> {
    // Zero-padded ids sort lexically in numeric order.
    let sql = format!("SELECT uid FROM {} ORDER BY uid DESC LIMIT 1", table);
    Ok(conn.query_row(&sql, [], |r| r.get(0)).optional()?)
}

/// Next user id across students, professors, and administrators: one shared
/// numeric space, strictly increasing. An empty table counts as -1 so an
/// empty store yields u0000001.
pub fn next_user_id(conn: &Connection) -> Result<String, IdError> {
    let mut highest: i64 = -1;
    for table in ["students", "professors", "administrators"] {
        if let Some(uid) = highest_uid(conn, table)? {
            highest = highest.max(user_id_value(&uid)?);
        }
    }
    let next = if highest < 0 { 1 } else { highest + 1 };
    Ok(format!("u{:0width$}", next, width = USER_ID_DIGITS))
}

fn next_counter(conn: &Connection, sql: &str) -> Result<i64, IdError> {
    let highest: Option<i64> = conn.query_row(sql, [], |r| r.get(0)).optional()?;
    Ok(highest.unwrap_or(0) + 1)
}

/// Next course catalog id; 1 when the catalog is empty.
pub fn next_course_id(conn: &Connection) -> Result<i64, IdError> {
    next_counter(
        conn,
        "SELECT catalog_id FROM courses ORDER BY catalog_id DESC LIMIT 1",
    )
}

/// Next class offering id; independent of the course counter.
pub fn next_class_id(conn: &Connection) -> Result<i64, IdError> {
    next_counter(
        conn,
        "SELECT class_id FROM classes ORDER BY class_id DESC LIMIT 1",
    )
}
