use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("registrar.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates the registrar schema. Idempotent; also used by unit tests against
/// in-memory connections.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            subject TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            dob TEXT NOT NULL,
            major TEXT,
            FOREIGN KEY(major) REFERENCES departments(subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_major ON students(major)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS professors(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            dob TEXT NOT NULL,
            works_in TEXT,
            FOREIGN KEY(works_in) REFERENCES departments(subject)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_professors_works_in ON professors(works_in)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS administrators(
            uid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            dob TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            catalog_id INTEGER PRIMARY KEY,
            department TEXT NOT NULL,
            number INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(department) REFERENCES departments(subject),
            UNIQUE(department, number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            class_id INTEGER PRIMARY KEY,
            listing INTEGER NOT NULL,
            season TEXT NOT NULL,
            year INTEGER NOT NULL,
            location TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            taught_by TEXT NOT NULL,
            FOREIGN KEY(listing) REFERENCES courses(catalog_id),
            FOREIGN KEY(taught_by) REFERENCES professors(uid),
            UNIQUE(listing, season, year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_listing ON classes(listing)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_semester ON classes(season, year)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_taught_by ON classes(taught_by)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            class_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            weight REAL NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(class_id),
            UNIQUE(class_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_categories_class ON categories(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_points REAL NOT NULL,
            due TEXT NOT NULL,
            contents TEXT NOT NULL,
            FOREIGN KEY(category_id) REFERENCES categories(id),
            UNIQUE(category_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_category ON assignments(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_uid TEXT NOT NULL,
            contents TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_uid) REFERENCES students(uid),
            UNIQUE(assignment_id, student_uid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_assignment ON submissions(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_student ON submissions(student_uid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            class_id INTEGER NOT NULL,
            student_uid TEXT NOT NULL,
            grade TEXT NOT NULL DEFAULT '--',
            PRIMARY KEY(class_id, student_uid),
            FOREIGN KEY(class_id) REFERENCES classes(class_id),
            FOREIGN KEY(student_uid) REFERENCES students(uid)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_uid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &raw),
    )?;
    Ok(())
}
