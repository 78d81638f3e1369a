use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::{Extension, Json};

use super::submissions::{
    self, ExportQuery, ListQuery, ResetRequest, SubmitRequest, UpdateRecordRequest,
};
use crate::auth::Claims;
use crate::error::Error;
use crate::http::AppState;
use crate::reconcile::RecordKind;

pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitRequest>,
) -> Result<Response, Error> {
    submissions::submit(RecordKind::Attendance, &state, body)
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, Error> {
    submissions::list(RecordKind::Attendance, &state, query)
}

pub async fn update_record(
    State(state): State<AppState>,
    Path((submission_id, record_id)): Path<(String, String)>,
    Json(body): Json<UpdateRecordRequest>,
) -> Result<Response, Error> {
    submissions::update_record(RecordKind::Attendance, &state, &submission_id, &record_id, body)
}

pub async fn delete_record(
    State(state): State<AppState>,
    Path((submission_id, record_id)): Path<(String, String)>,
) -> Result<Response, Error> {
    submissions::delete_record(RecordKind::Attendance, &state, &submission_id, &record_id)
}

pub async fn reset(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<ResetRequest>,
) -> Result<Response, Error> {
    submissions::reset(RecordKind::Attendance, &state, &claims, body)
}

pub async fn export(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, Error> {
    submissions::export(RecordKind::Attendance, &state, query)
}
