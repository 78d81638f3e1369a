use rusqlite::Connection;
use std::path::Path;

pub fn open_db(data_dir: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("rollbook.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL UNIQUE,
            staff_id TEXT UNIQUE,
            department TEXT,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'staff',
            reset_token_hash TEXT,
            reset_token_expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Databases created before the password-reset flow lack the token columns.
    ensure_users_reset_columns(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            section TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_department_section
         ON students(department, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            UNIQUE(department, name)
        )",
        [],
    )?;

    // One row per attendance or marks submission. description = '' means the
    // canonical descriptionless submission for that day; the UNIQUE constraint
    // makes the create-vs-merge decision race-proof.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS submissions(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            date TEXT NOT NULL,
            department TEXT NOT NULL,
            section TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE(kind, date, department, section, description)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submissions_kind_date ON submissions(kind, date)",
        [],
    )?;

    // student_id is deliberately not a foreign key: deleting a student must
    // leave historical records in place.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            id TEXT PRIMARY KEY,
            submission_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT,
            mark REAL,
            position INTEGER NOT NULL,
            UNIQUE(submission_id, student_id),
            FOREIGN KEY(submission_id) REFERENCES submissions(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_submission ON records(submission_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_student ON records(student_id)",
        [],
    )?;

    Ok(())
}

/// Lets bulk inserts turn a UNIQUE failure into a per-row rejection instead
/// of aborting the whole batch.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn ensure_users_reset_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "users", "reset_token_hash")? {
        conn.execute("ALTER TABLE users ADD COLUMN reset_token_hash TEXT", [])?;
    }
    if !table_has_column(conn, "users", "reset_token_expires_at")? {
        conn.execute(
            "ALTER TABLE users ADD COLUMN reset_token_expires_at TEXT",
            [],
        )?;
    }
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
