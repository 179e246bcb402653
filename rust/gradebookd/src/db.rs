use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learners(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            class_level TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learners_class_sort ON learners(class_level, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_subjects(
            learner_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            subject TEXT NOT NULL,
            code TEXT,
            ca1 REAL,
            ca2 REAL,
            hf REAL,
            project REAL,
            exams REAL,
            total REAL NOT NULL,
            grade TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(learner_id) REFERENCES learners(id),
            UNIQUE(learner_id, session, term, subject)
        )",
        [],
    )?;
    ensure_result_subjects_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_subjects_learner_session
         ON result_subjects(learner_id, session)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS term_calendars(
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            term_opens TEXT NOT NULL,
            term_ends TEXT NOT NULL,
            PRIMARY KEY(session, term)
        )",
        [],
    )?;

    // `day` is always a calendar-day key (YYYY-MM-DD) so upserts match by date,
    // never by timestamp.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_days(
            id TEXT PRIMARY KEY,
            class_level TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            day TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(class_level, session, term, day)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_marks(
            day_id TEXT NOT NULL,
            learner_id TEXT NOT NULL,
            status TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(day_id, learner_id),
            FOREIGN KEY(day_id) REFERENCES attendance_days(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_days_scope
         ON attendance_days(class_level, session, term, day)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_marks_learner ON attendance_marks(learner_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS remarks(
            learner_id TEXT NOT NULL,
            session TEXT NOT NULL,
            term TEXT NOT NULL,
            role TEXT NOT NULL,
            remark TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(learner_id, session, term, role),
            FOREIGN KEY(learner_id) REFERENCES learners(id)
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_result_subjects_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "result_subjects", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE result_subjects ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn open_db_is_idempotent_and_adds_columns() {
        let dir = std::env::temp_dir().join(format!(
            "gradebook-db-{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let conn = open_db(&dir).expect("first open");
        assert!(table_has_column(&conn, "result_subjects", "updated_at").expect("pragma"));
        drop(conn);
        let conn = open_db(&dir).expect("second open");
        assert!(table_has_column(&conn, "attendance_days", "day").expect("pragma"));
        assert!(!table_has_column(&conn, "learners", "password").expect("pragma"));
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }
}
