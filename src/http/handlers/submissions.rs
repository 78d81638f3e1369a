//! Shared request handling for the two submission kinds. The attendance and
//! marks modules bind `RecordKind` and delegate here; everything below runs
//! synchronously under the connection lock.

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{clean, required};
use crate::auth::Claims;
use crate::dates;
use crate::error::Error;
use crate::export;
use crate::http::middleware::require_admin;
use crate::http::AppState;
use crate::reconcile::{
    self, AttendanceStatus, RecordKind, RecordValue, ResetAction, ResetOutcome, SubmitInput,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub date: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub merge: bool,
    pub records: Option<Vec<IncomingRecord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRecord {
    pub student_id: Option<String>,
    pub status: Option<String>,
    pub mark: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub date: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub status: Option<String>,
    pub mark: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub date: Option<String>,
    pub action: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub date: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub format: Option<String>,
}

fn parse_value(
    kind: RecordKind,
    status: &Option<String>,
    mark: Option<f64>,
) -> Result<RecordValue, Error> {
    match kind {
        RecordKind::Attendance => {
            let status = required(status, "status")?;
            let status = AttendanceStatus::parse(status)
                .ok_or_else(|| Error::validation("status must be 'present' or 'absent'"))?;
            Ok(RecordValue::Status(status))
        }
        RecordKind::Marks => {
            let mark = mark.ok_or_else(|| Error::validation("mark must be a number"))?;
            Ok(RecordValue::Mark(mark))
        }
    }
}

fn saved_message(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Attendance => "Attendance saved",
        RecordKind::Marks => "Marks saved",
    }
}

pub fn submit(kind: RecordKind, state: &AppState, body: SubmitRequest) -> Result<Response, Error> {
    let date = dates::normalize_date(required(&body.date, "date")?)?;
    let department = required(&body.department, "department")?.to_string();
    let section = required(&body.section, "section")?.to_string();
    let description = clean(&body.description).map(str::to_string);

    let mut records = Vec::new();
    for rec in body.records.unwrap_or_default() {
        let student_id = required(&rec.student_id, "studentId")?.to_string();
        let value = parse_value(kind, &rec.status, rec.mark)?;
        records.push((student_id, value));
    }

    let input = SubmitInput {
        kind,
        date,
        department,
        section,
        description,
        records,
        merge: body.merge,
    };
    let db = state.db();
    let outcome = reconcile::submit(&db, &input)?;
    export::regenerate_artifact(&db, &state.config.exports_dir(), kind, date)?;
    info!(
        "{} submission {} for {}/{} on {}",
        kind.as_str(),
        outcome.status.as_str(),
        input.department,
        input.section,
        date
    );
    Ok(Json(json!({
        "message": saved_message(kind),
        "submissionId": outcome.submission_id,
        "status": outcome.status.as_str(),
        "file": format!("/api/{}/export?date={}", kind.as_str(), date),
    }))
    .into_response())
}

pub fn list(kind: RecordKind, state: &AppState, query: ListQuery) -> Result<Response, Error> {
    let date = dates::normalize_date(required(&query.date, "date")?)?;
    let db = state.db();
    let docs = reconcile::list_submissions(
        &db,
        kind,
        date,
        clean(&query.department),
        clean(&query.section),
    )?;
    Ok(Json(docs).into_response())
}

pub fn update_record(
    kind: RecordKind,
    state: &AppState,
    submission_id: &str,
    record_id: &str,
    body: UpdateRecordRequest,
) -> Result<Response, Error> {
    let value = parse_value(kind, &body.status, body.mark)?;
    let db = state.db();
    let change = reconcile::update_record(&db, kind, submission_id, record_id, &value)?;
    export::regenerate_artifact(&db, &state.config.exports_dir(), kind, change.date)?;
    Ok(Json(json!({ "message": "Record updated", "record": change.record })).into_response())
}

pub fn delete_record(
    kind: RecordKind,
    state: &AppState,
    submission_id: &str,
    record_id: &str,
) -> Result<Response, Error> {
    let db = state.db();
    let date = reconcile::delete_record(&db, kind, submission_id, record_id)?;
    export::regenerate_artifact(&db, &state.config.exports_dir(), kind, date)?;
    Ok(Json(json!({ "message": "Record deleted" })).into_response())
}

pub fn reset(
    kind: RecordKind,
    state: &AppState,
    claims: &Claims,
    body: ResetRequest,
) -> Result<Response, Error> {
    require_admin(claims)?;
    let date = dates::normalize_date(required(&body.date, "date")?)?;
    let action = required(&body.action, "action")?;
    let action = ResetAction::parse(action)
        .ok_or_else(|| Error::validation("action must be 'reset' or 'reopen'"))?;
    let db = state.db();
    let outcome = reconcile::reset(
        &db,
        kind,
        date,
        clean(&body.department),
        clean(&body.section),
        action,
    )?;
    export::regenerate_artifact(&db, &state.config.exports_dir(), kind, date)?;
    let payload = match outcome {
        ResetOutcome::Deleted(n) => {
            info!("deleted {n} {} submissions on {date}", kind.as_str());
            json!({ "message": "Submissions deleted", "deleted": n })
        }
        ResetOutcome::Reopened(n) => {
            info!("reopened {n} {} submissions on {date}", kind.as_str());
            json!({ "message": "Submissions reopened", "updated": n })
        }
    };
    Ok(Json(payload).into_response())
}

pub fn export(kind: RecordKind, state: &AppState, query: ExportQuery) -> Result<Response, Error> {
    let date = dates::normalize_date(required(&query.date, "date")?)?;
    let format = query.format.as_deref().map(str::trim).unwrap_or("csv");
    let department = clean(&query.department);
    let section = clean(&query.section);
    let filtered = department.is_some() || section.is_some();

    match format {
        "csv" => {
            let filename = format!("{}-{}.csv", kind.as_str(), date);
            let csv = if filtered {
                let db = state.db();
                let docs = reconcile::list_submissions(&db, kind, date, department, section)?;
                export::submissions_csv(&docs, kind)
            } else {
                // The unfiltered view is what mutations keep cached on disk.
                let path = export::artifact_path(&state.config.exports_dir(), kind, date);
                if path.exists() {
                    std::fs::read_to_string(&path)?
                } else {
                    let db = state.db();
                    let path =
                        export::regenerate_artifact(&db, &state.config.exports_dir(), kind, date)?;
                    std::fs::read_to_string(&path)?
                }
            };
            Ok(download(csv.into_bytes(), "text/csv", &filename))
        }
        "xlsx" => {
            let filename = format!("{}-{}.xlsx", kind.as_str(), date);
            let db = state.db();
            let docs = reconcile::list_submissions(&db, kind, date, department, section)?;
            let bytes = export::submissions_xlsx(&docs, kind)?;
            Ok(download(
                bytes,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                &filename,
            ))
        }
        _ => Err(Error::validation("format must be 'csv' or 'xlsx'")),
    }
}

pub fn download(bytes: Vec<u8>, content_type: &str, filename: &str) -> Response {
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
