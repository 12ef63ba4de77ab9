use rusqlite::Connection;

/// Grade stored at enrollment time, before any score has ever been assigned.
/// The aggregator never produces this value; a graded class with no points
/// earned reads "E", not "--".
pub const UNGRADED: &str = "--";

#[derive(Debug, Clone)]
pub struct GradeError {
    pub code: &'static str,
    pub message: String,
}

impl GradeError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for GradeError {
    fn from(e: rusqlite::Error) -> Self {
        GradeError::new("db_query_failed", e.to_string())
    }
}

#[derive(Debug, Clone)]
struct CategoryTotals {
    weight: f64,
    assignment_count: i64,
    max_points: f64,
    earned: f64,
}

/// A student's percentage in a class: per-category earned/max scaled by
/// category weight, normalized by 100/total-weight. Categories with no
/// assignments drop out of both sums. Submitted scores count; assignments
/// with no submission contribute max points only.
pub fn class_percentage(
    conn: &Connection,
    class_id: i64,
    student_uid: &str,
) -> Result<f64, GradeError> {
    let mut stmt = conn.prepare(
        "SELECT
           c.weight,
           (SELECT COUNT(*) FROM assignments a WHERE a.category_id = c.id),
           (SELECT COALESCE(SUM(a.max_points), 0) FROM assignments a WHERE a.category_id = c.id),
           (SELECT COALESCE(SUM(s.score), 0)
              FROM submissions s
              JOIN assignments a ON a.id = s.assignment_id
             WHERE a.category_id = c.id AND s.student_uid = ?)
         FROM categories c
         WHERE c.class_id = ?",
    )?;
    let categories: Vec<CategoryTotals> = stmt
        .query_map(rusqlite::params![student_uid, class_id], |r| {
            Ok(CategoryTotals {
                weight: r.get(0)?,
                assignment_count: r.get(1)?,
                max_points: r.get(2)?,
                earned: r.get(3)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut total_weighted = 0.0_f64;
    let mut total_weight = 0.0_f64;
    for cat in &categories {
        if cat.assignment_count == 0 {
            continue;
        }
        let pct = if cat.max_points > 0.0 {
            cat.earned / cat.max_points
        } else {
            0.0
        };
        total_weighted += pct * cat.weight;
        total_weight += cat.weight;
    }

    let scaling = if total_weight > 0.0 {
        100.0 / total_weight
    } else {
        0.0
    };
    Ok(total_weighted * scaling)
}

/// Letter for a class percentage, inclusive lower bounds.
pub fn letter_for(percentage: f64) -> &'static str {
    if percentage >= 93.0 {
        "A"
    } else if percentage >= 90.0 {
        "A-"
    } else if percentage >= 87.0 {
        "B+"
    } else if percentage >= 83.0 {
        "B"
    } else if percentage >= 80.0 {
        "B-"
    } else if percentage >= 77.0 {
        "C+"
    } else if percentage >= 73.0 {
        "C"
    } else if percentage >= 70.0 {
        "C-"
    } else if percentage >= 67.0 {
        "D+"
    } else if percentage >= 63.0 {
        "D"
    } else if percentage >= 60.0 {
        "D-"
    } else {
        "E"
    }
}

/// 4-point value of a letter grade; None for the pre-grading sentinel, so
/// ungraded classes drop out of GPA averages.
pub fn grade_points(letter: &str) -> Option<f64> {
    match letter {
        "A" => Some(4.0),
        "A-" => Some(3.7),
        "B+" => Some(3.3),
        "B" => Some(3.0),
        "B-" => Some(2.7),
        "C+" => Some(2.3),
        "C" => Some(2.0),
        "C-" => Some(1.7),
        "D+" => Some(1.3),
        "D" => Some(1.0),
        "D-" => Some(0.7),
        "E" => Some(0.0),
        _ => None,
    }
}

/// Recomputes and stores the letter grade for one enrollment. Run inside the
/// same transaction as the score mutation that triggered it.
pub fn refresh_enrollment_grade(
    conn: &Connection,
    class_id: i64,
    student_uid: &str,
) -> Result<String, GradeError> {
    let letter = letter_for(class_percentage(conn, class_id, student_uid)?);
    let changed = conn
        .execute(
            "UPDATE enrollments SET grade = ? WHERE class_id = ? AND student_uid = ?",
            rusqlite::params![letter, class_id, student_uid],
        )
        .map_err(|e| GradeError::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(GradeError::new("not_found", "enrollment not found"));
    }
    Ok(letter.to_string())
}
