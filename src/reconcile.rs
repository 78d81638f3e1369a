use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Attendance,
    Marks,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attendance => "attendance",
            Self::Marks => "marks",
        }
    }

    /// Column header for the value field in exports.
    pub fn value_label(self) -> &'static str {
        match self {
            Self::Attendance => "Status",
            Self::Marks => "Mark",
        }
    }

    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::Attendance => "Attendance",
            Self::Marks => "Marks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

/// One student's value inside a submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    Status(AttendanceStatus),
    Mark(f64),
}

#[derive(Debug)]
pub struct SubmitInput {
    pub kind: RecordKind,
    pub date: NaiveDate,
    pub department: String,
    pub section: String,
    /// Trimmed, non-empty when present.
    pub description: Option<String>,
    pub records: Vec<(String, RecordValue)>,
    pub merge: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Created,
    Merged,
}

impl SubmitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Merged => "merged",
        }
    }
}

#[derive(Debug)]
pub struct SubmitOutcome {
    pub submission_id: String,
    pub status: SubmitStatus,
}

/// Decide create vs merge vs conflict for an incoming submission.
///
/// A submission is identified by (kind, date, department, section,
/// description), with the empty description naming the single canonical
/// descriptionless submission for that class and day. Submitting against an
/// existing described submission without `merge` is rejected so callers must
/// confirm before values get overwritten. The lookup and the writes share one
/// transaction, and the submissions table carries a UNIQUE constraint over
/// the identity tuple, so two racing submits cannot both create.
pub fn submit(conn: &Connection, input: &SubmitInput) -> Result<SubmitOutcome, Error> {
    let department = input.department.trim();
    let section = input.section.trim();
    if department.is_empty() || section.is_empty() {
        return Err(Error::validation("department and section are required"));
    }
    if input.records.is_empty() {
        return Err(Error::validation("records must be a non-empty array"));
    }
    let date = input.date.to_string();
    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    let tx = conn.unchecked_transaction()?;
    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM submissions
             WHERE kind = ? AND date = ? AND department = ? AND section = ? AND description = ?",
            (input.kind.as_str(), &date, department, section, description),
            |row| row.get(0),
        )
        .optional()?;

    let outcome = match existing {
        Some(id) if !description.is_empty() && !input.merge => {
            return Err(Error::submission_conflict(
                "A submission with this description already exists for this class and date",
                id,
            ));
        }
        Some(id) => {
            merge_records(&tx, &id, &input.records)?;
            SubmitOutcome {
                submission_id: id,
                status: SubmitStatus::Merged,
            }
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO submissions(id, kind, date, department, section, description, created_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    input.kind.as_str(),
                    &date,
                    department,
                    section,
                    description,
                    dates::now_rfc3339(),
                ),
            )?;
            merge_records(&tx, &id, &input.records)?;
            SubmitOutcome {
                submission_id: id,
                status: SubmitStatus::Created,
            }
        }
    };
    tx.commit()?;
    Ok(outcome)
}

/// Last-write-wins per student: existing records keep their position, new
/// students are appended after the current tail.
fn merge_records(
    conn: &Connection,
    submission_id: &str,
    records: &[(String, RecordValue)],
) -> Result<(), Error> {
    let mut next_position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM records WHERE submission_id = ?",
        [submission_id],
        |row| row.get(0),
    )?;

    for (student_id, value) in records {
        let student_id = student_id.trim();
        if student_id.is_empty() {
            return Err(Error::validation("each record needs a studentId"));
        }
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM records WHERE submission_id = ? AND student_id = ?",
                (submission_id, student_id),
                |row| row.get(0),
            )
            .optional()?;
        match existing {
            Some(record_id) => match value {
                RecordValue::Status(status) => {
                    conn.execute(
                        "UPDATE records SET status = ? WHERE id = ?",
                        (status.as_str(), &record_id),
                    )?;
                }
                RecordValue::Mark(mark) => {
                    conn.execute("UPDATE records SET mark = ? WHERE id = ?", (mark, &record_id))?;
                }
            },
            None => {
                let record_id = Uuid::new_v4().to_string();
                match value {
                    RecordValue::Status(status) => {
                        conn.execute(
                            "INSERT INTO records(id, submission_id, student_id, status, position)
                             VALUES(?, ?, ?, ?, ?)",
                            (&record_id, submission_id, student_id, status.as_str(), next_position),
                        )?;
                    }
                    RecordValue::Mark(mark) => {
                        conn.execute(
                            "INSERT INTO records(id, submission_id, student_id, mark, position)
                             VALUES(?, ?, ?, ?, ?)",
                            (&record_id, submission_id, student_id, mark, next_position),
                        )?;
                    }
                }
                next_position += 1;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRow {
    pub id: String,
    pub student_id: String,
    /// None when the student was deleted after the record was written.
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AttendanceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDoc {
    pub id: String,
    pub date: String,
    pub department: String,
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    pub records: Vec<RecordRow>,
}

pub fn list_submissions(
    conn: &Connection,
    kind: RecordKind,
    date: NaiveDate,
    department: Option<&str>,
    section: Option<&str>,
) -> Result<Vec<SubmissionDoc>, Error> {
    let date = date.to_string();
    let kind_str = kind.as_str();
    let mut sql = String::from(
        "SELECT id, date, department, section, description, created_at
         FROM submissions WHERE kind = ? AND date = ?",
    );
    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&kind_str, &date];
    if let Some(ref dep) = department {
        sql.push_str(" AND department = ?");
        params.push(dep);
    }
    if let Some(ref sec) = section {
        sql.push_str(" AND section = ?");
        params.push(sec);
    }
    sql.push_str(" ORDER BY created_at DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let shells = stmt
        .query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rec_stmt = conn.prepare(
        "SELECT r.id, r.student_id, st.name, r.status, r.mark
         FROM records r
         LEFT JOIN students st ON st.student_id = r.student_id
         WHERE r.submission_id = ?
         ORDER BY r.position",
    )?;

    let mut docs = Vec::with_capacity(shells.len());
    for (id, date, department, section, description, created_at) in shells {
        let records = rec_stmt
            .query_map([&id], |row| {
                Ok(RecordRow {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    name: row.get(2)?,
                    status: row
                        .get::<_, Option<String>>(3)?
                        .and_then(|s| AttendanceStatus::parse(&s)),
                    mark: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        docs.push(SubmissionDoc {
            id,
            date,
            department,
            section,
            description: if description.is_empty() {
                None
            } else {
                Some(description)
            },
            created_at,
            records,
        });
    }
    Ok(docs)
}

fn submission_date(
    conn: &Connection,
    kind: RecordKind,
    submission_id: &str,
) -> Result<NaiveDate, Error> {
    let date: Option<String> = conn
        .query_row(
            "SELECT date FROM submissions WHERE id = ? AND kind = ?",
            (submission_id, kind.as_str()),
            |row| row.get(0),
        )
        .optional()?;
    let date = date.ok_or_else(|| Error::not_found("Submission not found"))?;
    NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|_| Error::internal(format!("corrupt submission date: {date}")))
}

#[derive(Debug)]
pub struct RecordChange {
    /// Day whose export artifact must be rewritten.
    pub date: NaiveDate,
    pub record: RecordRow,
}

pub fn update_record(
    conn: &Connection,
    kind: RecordKind,
    submission_id: &str,
    record_id: &str,
    value: &RecordValue,
) -> Result<RecordChange, Error> {
    let date = submission_date(conn, kind, submission_id)?;
    let updated = match value {
        RecordValue::Status(status) => conn.execute(
            "UPDATE records SET status = ? WHERE id = ? AND submission_id = ?",
            (status.as_str(), record_id, submission_id),
        )?,
        RecordValue::Mark(mark) => conn.execute(
            "UPDATE records SET mark = ? WHERE id = ? AND submission_id = ?",
            (mark, record_id, submission_id),
        )?,
    };
    if updated == 0 {
        return Err(Error::not_found("Record not found"));
    }
    let record = conn.query_row(
        "SELECT r.id, r.student_id, st.name, r.status, r.mark
         FROM records r
         LEFT JOIN students st ON st.student_id = r.student_id
         WHERE r.id = ?",
        [record_id],
        |row| {
            Ok(RecordRow {
                id: row.get(0)?,
                student_id: row.get(1)?,
                name: row.get(2)?,
                status: row
                    .get::<_, Option<String>>(3)?
                    .and_then(|s| AttendanceStatus::parse(&s)),
                mark: row.get(4)?,
            })
        },
    )?;
    Ok(RecordChange { date, record })
}

/// Removes one record. The submission shell stays even when its last record
/// goes away.
pub fn delete_record(
    conn: &Connection,
    kind: RecordKind,
    submission_id: &str,
    record_id: &str,
) -> Result<NaiveDate, Error> {
    let date = submission_date(conn, kind, submission_id)?;
    let deleted = conn.execute(
        "DELETE FROM records WHERE id = ? AND submission_id = ?",
        (record_id, submission_id),
    )?;
    if deleted == 0 {
        return Err(Error::not_found("Record not found"));
    }
    Ok(date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    Reset,
    Reopen,
}

impl ResetAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reset" => Some(Self::Reset),
            "reopen" => Some(Self::Reopen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Deleted(usize),
    Reopened(usize),
}

/// `Reset` drops matching submissions outright; `Reopen` empties their
/// records but keeps the shells (including descriptions) in place.
pub fn reset(
    conn: &Connection,
    kind: RecordKind,
    date: NaiveDate,
    department: Option<&str>,
    section: Option<&str>,
    action: ResetAction,
) -> Result<ResetOutcome, Error> {
    let date = date.to_string();
    let kind_str = kind.as_str();
    let mut sql = String::from("SELECT id FROM submissions WHERE kind = ? AND date = ?");
    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&kind_str, &date];
    if let Some(ref dep) = department {
        sql.push_str(" AND department = ?");
        params.push(dep);
    }
    if let Some(ref sec) = section {
        sql.push_str(" AND section = ?");
        params.push(sec);
    }

    let tx = conn.unchecked_transaction()?;
    let ids = {
        let mut stmt = tx.prepare(&sql)?;
        let ids = stmt
            .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    match action {
        ResetAction::Reset => {
            for id in &ids {
                tx.execute("DELETE FROM records WHERE submission_id = ?", [id])?;
                tx.execute("DELETE FROM submissions WHERE id = ?", [id])?;
            }
            tx.commit()?;
            Ok(ResetOutcome::Deleted(ids.len()))
        }
        ResetAction::Reopen => {
            if ids.is_empty() {
                return Err(Error::not_found(
                    "No submissions match this date and filter",
                ));
            }
            for id in &ids {
                tx.execute("DELETE FROM records WHERE submission_id = ?", [id])?;
            }
            tx.commit()?;
            Ok(ResetOutcome::Reopened(ids.len()))
        }
    }
}
