//! Existence and scheduling predicates queried before every creation.
//! All comparisons are exact: no trimming, no case folding.

use rusqlite::{Connection, OptionalExtension};

/// Longest subject code a department may use.
pub const MAX_SUBJECT_LEN: usize = 4;

fn exists(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<bool> {
    conn.query_row(sql, params, |r| r.get::<_, i64>(0))
        .optional()
        .map(|v| v.is_some())
}

pub fn department_exists(conn: &Connection, subject: &str) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM departments WHERE subject = ?",
        [subject],
    )
}

pub fn course_exists(conn: &Connection, subject: &str, number: i64) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM courses WHERE department = ? AND number = ?",
        rusqlite::params![subject, number],
    )
}

/// A course is offered at most once per (season, year).
pub fn class_exists(
    conn: &Connection,
    catalog_id: i64,
    season: &str,
    year: i64,
) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM classes WHERE listing = ? AND season = ? AND year = ?",
        rusqlite::params![catalog_id, season, year],
    )
}

/// True when another offering in the same semester occupies `location` for
/// any part of [start, end). Times are HH:MM:SS strings, which compare
/// lexically in chronological order.
pub fn class_location_overlaps(
    conn: &Connection,
    season: &str,
    year: i64,
    location: &str,
    start: &str,
    end: &str,
) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM classes
         WHERE season = ? AND year = ? AND location = ?
           AND start_time < ? AND ? < end_time
         LIMIT 1",
        rusqlite::params![season, year, location, end, start],
    )
}

pub fn category_exists(conn: &Connection, class_id: i64, name: &str) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM categories WHERE class_id = ? AND name = ?",
        rusqlite::params![class_id, name],
    )
}

pub fn assignment_exists(
    conn: &Connection,
    category_id: &str,
    name: &str,
) -> rusqlite::Result<bool> {
    exists(
        conn,
        "SELECT 1 FROM assignments WHERE category_id = ? AND name = ?",
        rusqlite::params![category_id, name],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute("PRAGMA foreign_keys = ON", []).expect("pragma");
        db::init_schema(&conn).expect("init schema");
        conn
    }

    fn seed_offering(conn: &Connection) {
        conn.execute("INSERT INTO departments(subject, name) VALUES('CS', 'Computer Science')", [])
            .expect("dept");
        conn.execute(
            "INSERT INTO professors(uid, first_name, last_name, dob, works_in)
             VALUES('u0000001', 'Grace', 'Hopper', '1906-12-09', 'CS')",
            [],
        )
        .expect("prof");
        conn.execute(
            "INSERT INTO courses(catalog_id, department, number, name)
             VALUES(1, 'CS', 5530, 'Database Systems')",
            [],
        )
        .expect("course");
        conn.execute(
            "INSERT INTO classes(class_id, listing, season, year, location, start_time, end_time, taught_by)
             VALUES(1, 1, 'Fall', 2024, 'WEB L104', '10:45:00', '12:05:00', 'u0000001')",
            [],
        )
        .expect("class");
    }

    #[test]
    fn checks_are_exact_match_only() {
        let conn = test_conn();
        seed_offering(&conn);

        assert!(department_exists(&conn, "CS").expect("query"));
        assert!(!department_exists(&conn, "cs").expect("query"));
        assert!(!department_exists(&conn, "CS ").expect("query"));

        assert!(course_exists(&conn, "CS", 5530).expect("query"));
        assert!(!course_exists(&conn, "CS", 5531).expect("query"));

        assert!(class_exists(&conn, 1, "Fall", 2024).expect("query"));
        assert!(!class_exists(&conn, 1, "fall", 2024).expect("query"));
        assert!(!class_exists(&conn, 1, "Fall", 2025).expect("query"));
    }

    #[test]
    fn location_overlap_is_half_open() {
        let conn = test_conn();
        seed_offering(&conn);

        // Same room, same semester, intersecting range.
        assert!(class_location_overlaps(&conn, "Fall", 2024, "WEB L104", "11:00:00", "11:30:00")
            .expect("query"));
        // Back-to-back is allowed: [9:00, 10:45) then [10:45, 12:05).
        assert!(!class_location_overlaps(&conn, "Fall", 2024, "WEB L104", "09:00:00", "10:45:00")
            .expect("query"));
        assert!(!class_location_overlaps(&conn, "Fall", 2024, "WEB L104", "12:05:00", "13:00:00")
            .expect("query"));
        // Different room or semester never conflicts.
        assert!(!class_location_overlaps(&conn, "Fall", 2024, "WEB L126", "11:00:00", "11:30:00")
            .expect("query"));
        assert!(!class_location_overlaps(&conn, "Spring", 2025, "WEB L104", "11:00:00", "11:30:00")
            .expect("query"));
    }
}
