use std::io::Read;

use chrono::NaiveDate;
use rusqlite::Connection;

use rollbookd::export;
use rollbookd::reconcile::{
    self, AttendanceStatus, RecordKind, RecordValue, SubmitInput,
};

fn mem_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    rollbookd::db::init_schema(&conn).expect("schema");
    conn
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn seed_class(conn: &Connection) {
    for (student_id, name) in [("S1", "Alice"), ("S2", "Bob, Jr.")] {
        conn.execute(
            "INSERT INTO students(id, student_id, name, department, section)
             VALUES(?, ?, ?, 'CS', 'A')",
            (format!("id-{student_id}"), student_id, name),
        )
        .expect("seed student");
    }
}

fn submit(conn: &Connection, kind: RecordKind, description: Option<&str>) -> String {
    let records = match kind {
        RecordKind::Attendance => vec![
            (
                "S1".to_string(),
                RecordValue::Status(AttendanceStatus::Present),
            ),
            (
                "S2".to_string(),
                RecordValue::Status(AttendanceStatus::Absent),
            ),
        ],
        RecordKind::Marks => vec![
            ("S1".to_string(), RecordValue::Mark(7.5)),
            ("S2".to_string(), RecordValue::Mark(4.0)),
        ],
    };
    let input = SubmitInput {
        kind,
        date: day("2024-03-01"),
        department: "CS".to_string(),
        section: "A".to_string(),
        description: description.map(str::to_string),
        records,
        merge: false,
    };
    reconcile::submit(conn, &input).expect("submit").submission_id
}

#[test]
fn csv_blocks_carry_description_header_and_quoting() {
    let conn = mem_conn();
    seed_class(&conn);
    submit(&conn, RecordKind::Attendance, Some("Lab, part 1"));

    let docs =
        reconcile::list_submissions(&conn, RecordKind::Attendance, day("2024-03-01"), None, None)
            .expect("list");
    let csv = export::submissions_csv(&docs, RecordKind::Attendance);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "\"Description: Lab, part 1\"");
    assert_eq!(lines[1], "StudentID,Name,Status");
    assert_eq!(lines[2], "S1,Alice,present");
    assert_eq!(lines[3], "S2,\"Bob, Jr.\",absent", "comma in name forces quoting");
}

#[test]
fn csv_rows_keep_position_order_and_blank_orphan_names() {
    let conn = mem_conn();
    seed_class(&conn);
    submit(&conn, RecordKind::Attendance, None);
    conn.execute("DELETE FROM students WHERE student_id = 'S1'", [])
        .expect("orphan S1");

    let docs =
        reconcile::list_submissions(&conn, RecordKind::Attendance, day("2024-03-01"), None, None)
            .expect("list");
    let csv = export::submissions_csv(&docs, RecordKind::Attendance);
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "StudentID,Name,Status");
    assert_eq!(lines[1], "S1,,present", "orphaned row keeps id, blank name");
    assert_eq!(lines[2], "S2,\"Bob, Jr.\",absent");
}

#[test]
fn marks_csv_uses_mark_column() {
    let conn = mem_conn();
    seed_class(&conn);
    submit(&conn, RecordKind::Marks, Some("Quiz 1"));

    let docs = reconcile::list_submissions(&conn, RecordKind::Marks, day("2024-03-01"), None, None)
        .expect("list");
    let csv = export::submissions_csv(&docs, RecordKind::Marks);

    assert!(csv.contains("StudentID,Name,Mark"));
    assert!(csv.contains("S1,Alice,7.5"));
}

#[test]
fn artifact_tracks_mutations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exports = dir.path().join("exports");
    let conn = mem_conn();
    seed_class(&conn);
    let submission_id = submit(&conn, RecordKind::Attendance, None);

    let path =
        export::regenerate_artifact(&conn, &exports, RecordKind::Attendance, day("2024-03-01"))
            .expect("write artifact");
    assert_eq!(
        path,
        export::artifact_path(&exports, RecordKind::Attendance, day("2024-03-01"))
    );
    let before = std::fs::read_to_string(&path).expect("read artifact");
    assert!(before.contains("S1,Alice,present"));

    conn.execute(
        "UPDATE records SET status = 'absent' WHERE submission_id = ? AND student_id = 'S1'",
        [&submission_id],
    )
    .expect("flip S1");
    export::regenerate_artifact(&conn, &exports, RecordKind::Attendance, day("2024-03-01"))
        .expect("rewrite artifact");
    let after = std::fs::read_to_string(&path).expect("reread artifact");
    assert!(after.contains("S1,Alice,absent"));
    assert!(!after.contains("S1,Alice,present"));
}

#[test]
fn xlsx_is_a_real_workbook_with_inline_values() {
    let conn = mem_conn();
    seed_class(&conn);
    submit(&conn, RecordKind::Marks, Some("Quiz 1"));

    let docs = reconcile::list_submissions(&conn, RecordKind::Marks, day("2024-03-01"), None, None)
        .expect("list");
    let bytes = export::submissions_xlsx(&docs, RecordKind::Marks).expect("workbook");
    assert_eq!(&bytes[..4], b"PK\x03\x04", "zip container magic");

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("open zip");
    for name in [
        "[Content_Types].xml",
        "_rels/.rels",
        "xl/workbook.xml",
        "xl/_rels/workbook.xml.rels",
        "xl/worksheets/sheet1.xml",
    ] {
        assert!(archive.by_name(name).is_ok(), "missing {name}");
    }

    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .expect("sheet entry")
        .read_to_string(&mut sheet)
        .expect("read sheet");
    assert!(sheet.contains("Description: Quiz 1"));
    assert!(sheet.contains(">S1</t>"), "student id as inline string");
    assert!(sheet.contains("<v>7.5</v>"), "mark as a number cell");

    let mut workbook = String::new();
    archive
        .by_name("xl/workbook.xml")
        .expect("workbook entry")
        .read_to_string(&mut workbook)
        .expect("read workbook");
    assert!(workbook.contains("name=\"Marks\""));
}
