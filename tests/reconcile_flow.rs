use chrono::NaiveDate;
use rusqlite::Connection;

use rollbookd::error::Error;
use rollbookd::reconcile::{
    self, AttendanceStatus, RecordKind, RecordValue, ResetAction, ResetOutcome, SubmitInput,
    SubmitStatus,
};

fn mem_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    rollbookd::db::init_schema(&conn).expect("schema");
    conn
}

fn seed_students(conn: &Connection) {
    let rows = [
        ("S1", "Alice", "CS", "A"),
        ("S2", "Bob", "CS", "A"),
        ("S3", "Cara", "CS", "A"),
    ];
    for (student_id, name, department, section) in rows {
        conn.execute(
            "INSERT INTO students(id, student_id, name, department, section)
             VALUES(?, ?, ?, ?, ?)",
            (format!("id-{student_id}"), student_id, name, department, section),
        )
        .expect("seed student");
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn present() -> RecordValue {
    RecordValue::Status(AttendanceStatus::Present)
}

fn absent() -> RecordValue {
    RecordValue::Status(AttendanceStatus::Absent)
}

fn attendance_input(
    date: &str,
    description: Option<&str>,
    merge: bool,
    records: Vec<(&str, RecordValue)>,
) -> SubmitInput {
    SubmitInput {
        kind: RecordKind::Attendance,
        date: day(date),
        department: "CS".to_string(),
        section: "A".to_string(),
        description: description.map(str::to_string),
        records: records
            .into_iter()
            .map(|(id, v)| (id.to_string(), v))
            .collect(),
        merge,
    }
}

fn record_values(conn: &Connection, submission_id: &str) -> Vec<(String, Option<String>, i64)> {
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status, position FROM records
             WHERE submission_id = ? ORDER BY position",
        )
        .expect("prepare");
    stmt.query_map([submission_id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })
    .expect("query")
    .collect::<Result<Vec<_>, _>>()
    .expect("rows")
}

#[test]
fn descriptionless_resubmit_merges_into_same_doc() {
    let conn = mem_conn();
    seed_students(&conn);

    let input = attendance_input("2024-03-01", None, false, vec![("S1", present()), ("S2", absent())]);
    let first = reconcile::submit(&conn, &input).expect("first submit");
    assert_eq!(first.status, SubmitStatus::Created);

    let second = reconcile::submit(&conn, &input).expect("second submit");
    assert_eq!(second.status, SubmitStatus::Merged);
    assert_eq!(second.submission_id, first.submission_id);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(count, 1);
    assert_eq!(record_values(&conn, &first.submission_id).len(), 2);
}

#[test]
fn described_resubmit_conflicts_until_merge_is_confirmed() {
    let conn = mem_conn();
    seed_students(&conn);

    let create = attendance_input("2024-03-01", Some("Lab session"), false, vec![("S1", present())]);
    let created = reconcile::submit(&conn, &create).expect("create");

    let retry = attendance_input("2024-03-01", Some("Lab session"), false, vec![("S1", absent())]);
    match reconcile::submit(&conn, &retry) {
        Err(Error::Conflict { existing_id, .. }) => {
            assert_eq!(existing_id.as_deref(), Some(created.submission_id.as_str()));
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    // Conflict must not overwrite anything.
    let rows = record_values(&conn, &created.submission_id);
    assert_eq!(rows[0].1.as_deref(), Some("present"));

    let confirmed = attendance_input("2024-03-01", Some("Lab session"), true, vec![("S1", absent())]);
    let merged = reconcile::submit(&conn, &confirmed).expect("merge");
    assert_eq!(merged.status, SubmitStatus::Merged);
    assert_eq!(merged.submission_id, created.submission_id);
    let rows = record_values(&conn, &created.submission_id);
    assert_eq!(rows[0].1.as_deref(), Some("absent"));
}

#[test]
fn merge_overwrites_in_place_and_appends_new_students() {
    let conn = mem_conn();
    seed_students(&conn);

    let first = attendance_input("2024-03-01", None, false, vec![("S1", present()), ("S2", absent())]);
    let outcome = reconcile::submit(&conn, &first).expect("first");

    let second = attendance_input("2024-03-01", None, false, vec![("S2", present()), ("S3", present())]);
    reconcile::submit(&conn, &second).expect("second");

    let rows = record_values(&conn, &outcome.submission_id);
    let ids: Vec<&str> = rows.iter().map(|(id, _, _)| id.as_str()).collect();
    assert_eq!(ids, ["S1", "S2", "S3"]);
    assert_eq!(rows[1].1.as_deref(), Some("present"), "S2 overwritten in place");
    assert_eq!(
        rows.iter().map(|(_, _, p)| *p).collect::<Vec<_>>(),
        [0, 1, 2],
        "positions stay dense and ordered"
    );
}

#[test]
fn submit_rejects_blank_identity_and_empty_records() {
    let conn = mem_conn();
    seed_students(&conn);

    let mut input = attendance_input("2024-03-01", None, false, vec![("S1", present())]);
    input.section = "  ".to_string();
    assert!(matches!(
        reconcile::submit(&conn, &input),
        Err(Error::Validation(_))
    ));

    let empty = attendance_input("2024-03-01", None, false, vec![]);
    assert!(matches!(
        reconcile::submit(&conn, &empty),
        Err(Error::Validation(_))
    ));

    let blank_student = attendance_input("2024-03-01", None, false, vec![("  ", present())]);
    assert!(matches!(
        reconcile::submit(&conn, &blank_student),
        Err(Error::Validation(_))
    ));
}

#[test]
fn update_record_changes_value_and_survives_bad_ids() {
    let conn = mem_conn();
    seed_students(&conn);

    let input = attendance_input("2024-03-01", None, false, vec![("S1", present())]);
    let outcome = reconcile::submit(&conn, &input).expect("submit");
    let record_id = record_id_for(&conn, &outcome.submission_id, "S1");

    let change = reconcile::update_record(
        &conn,
        RecordKind::Attendance,
        &outcome.submission_id,
        &record_id,
        &absent(),
    )
    .expect("update");
    assert_eq!(change.date, day("2024-03-01"));
    assert_eq!(change.record.status, Some(AttendanceStatus::Absent));

    let missing_submission = reconcile::update_record(
        &conn,
        RecordKind::Attendance,
        "nope",
        &record_id,
        &absent(),
    );
    assert!(matches!(missing_submission, Err(Error::NotFound(_))));

    let missing_record = reconcile::update_record(
        &conn,
        RecordKind::Attendance,
        &outcome.submission_id,
        "nope",
        &absent(),
    );
    assert!(matches!(missing_record, Err(Error::NotFound(_))));

    // A marks-side lookup must not see attendance submissions.
    let wrong_kind = reconcile::update_record(
        &conn,
        RecordKind::Marks,
        &outcome.submission_id,
        &record_id,
        &RecordValue::Mark(5.0),
    );
    assert!(matches!(wrong_kind, Err(Error::NotFound(_))));
}

#[test]
fn delete_record_keeps_the_submission_shell() {
    let conn = mem_conn();
    seed_students(&conn);

    let input = attendance_input("2024-03-01", None, false, vec![("S1", present())]);
    let outcome = reconcile::submit(&conn, &input).expect("submit");
    let record_id = record_id_for(&conn, &outcome.submission_id, "S1");

    let date = reconcile::delete_record(
        &conn,
        RecordKind::Attendance,
        &outcome.submission_id,
        &record_id,
    )
    .expect("delete");
    assert_eq!(date, day("2024-03-01"));
    assert!(record_values(&conn, &outcome.submission_id).is_empty());

    let shells: i64 = conn
        .query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(shells, 1, "empty submission still listed");

    let again = reconcile::delete_record(
        &conn,
        RecordKind::Attendance,
        &outcome.submission_id,
        &record_id,
    );
    assert!(matches!(again, Err(Error::NotFound(_))));
}

#[test]
fn reset_removes_and_reopen_clears_but_keeps_identity() {
    let conn = mem_conn();
    seed_students(&conn);

    let plain = attendance_input("2024-03-01", None, false, vec![("S1", present())]);
    reconcile::submit(&conn, &plain).expect("plain");
    let described = attendance_input("2024-03-01", Some("Makeup"), false, vec![("S2", absent())]);
    let described_outcome = reconcile::submit(&conn, &described).expect("described");

    // Reopen keeps both shells, empties their records.
    let reopened = reconcile::reset(
        &conn,
        RecordKind::Attendance,
        day("2024-03-01"),
        None,
        None,
        ResetAction::Reopen,
    )
    .expect("reopen");
    assert_eq!(reopened, ResetOutcome::Reopened(2));
    let shells: i64 = conn
        .query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(shells, 2);
    let desc: String = conn
        .query_row(
            "SELECT description FROM submissions WHERE id = ?",
            [&described_outcome.submission_id],
            |r| r.get(0),
        )
        .expect("description survives");
    assert_eq!(desc, "Makeup");
    let records: i64 = conn
        .query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))
        .expect("records");
    assert_eq!(records, 0);

    // Resubmitting after reopen lands in the same shell.
    let refill = attendance_input("2024-03-01", Some("Makeup"), true, vec![("S2", present())]);
    let refilled = reconcile::submit(&conn, &refill).expect("refill");
    assert_eq!(refilled.submission_id, described_outcome.submission_id);
    assert_eq!(refilled.status, SubmitStatus::Merged);

    // Reset drops everything for the date.
    let deleted = reconcile::reset(
        &conn,
        RecordKind::Attendance,
        day("2024-03-01"),
        None,
        None,
        ResetAction::Reset,
    )
    .expect("reset");
    assert_eq!(deleted, ResetOutcome::Deleted(2));
    let shells: i64 = conn
        .query_row("SELECT COUNT(*) FROM submissions", [], |r| r.get(0))
        .expect("count");
    assert_eq!(shells, 0);
}

#[test]
fn reset_of_empty_day_is_ok_but_reopen_is_not_found() {
    let conn = mem_conn();
    seed_students(&conn);

    let deleted = reconcile::reset(
        &conn,
        RecordKind::Attendance,
        day("2024-07-01"),
        None,
        None,
        ResetAction::Reset,
    )
    .expect("reset on empty day");
    assert_eq!(deleted, ResetOutcome::Deleted(0));

    let reopened = reconcile::reset(
        &conn,
        RecordKind::Attendance,
        day("2024-07-01"),
        None,
        None,
        ResetAction::Reopen,
    );
    assert!(matches!(reopened, Err(Error::NotFound(_))));
}

#[test]
fn reset_filter_only_touches_matching_class() {
    let conn = mem_conn();
    seed_students(&conn);
    conn.execute(
        "INSERT INTO students(id, student_id, name, department, section)
         VALUES('id-S9', 'S9', 'Zoe', 'EE', 'B')",
        [],
    )
    .expect("seed EE student");

    reconcile::submit(
        &conn,
        &attendance_input("2024-03-01", None, false, vec![("S1", present())]),
    )
    .expect("CS/A");
    let mut ee = attendance_input("2024-03-01", None, false, vec![("S9", present())]);
    ee.department = "EE".to_string();
    ee.section = "B".to_string();
    reconcile::submit(&conn, &ee).expect("EE/B");

    let deleted = reconcile::reset(
        &conn,
        RecordKind::Attendance,
        day("2024-03-01"),
        Some("CS"),
        Some("A"),
        ResetAction::Reset,
    )
    .expect("filtered reset");
    assert_eq!(deleted, ResetOutcome::Deleted(1));

    let survivors: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM submissions WHERE department = 'EE'",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(survivors, 1);
}

#[test]
fn list_shows_newest_first_and_blank_names_for_orphans() {
    let conn = mem_conn();
    seed_students(&conn);

    reconcile::submit(
        &conn,
        &attendance_input("2024-03-01", None, false, vec![("S1", present())]),
    )
    .expect("first");
    reconcile::submit(
        &conn,
        &attendance_input("2024-03-01", Some("Makeup"), false, vec![("S2", absent())]),
    )
    .expect("second");

    conn.execute("DELETE FROM students WHERE student_id = 'S2'", [])
        .expect("orphan S2");

    let docs =
        reconcile::list_submissions(&conn, RecordKind::Attendance, day("2024-03-01"), None, None)
            .expect("list");
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].description.as_deref(), Some("Makeup"));
    assert_eq!(docs[0].records[0].student_id, "S2");
    assert_eq!(docs[0].records[0].name, None, "deleted student keeps the row");
    assert_eq!(docs[1].description, None);

    let filtered = reconcile::list_submissions(
        &conn,
        RecordKind::Attendance,
        day("2024-03-01"),
        Some("CS"),
        Some("Z"),
    )
    .expect("filtered list");
    assert!(filtered.is_empty());
}

fn record_id_for(conn: &Connection, submission_id: &str, student_id: &str) -> String {
    conn.query_row(
        "SELECT id FROM records WHERE submission_id = ? AND student_id = ?",
        (submission_id, student_id),
        |row| row.get(0),
    )
    .expect("record id")
}
