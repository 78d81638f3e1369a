use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::required;
use crate::error::Error;
use crate::http::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDto {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub department: String,
    pub section: String,
}

fn row_to_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentDto> {
    Ok(StudentDto {
        id: row.get(0)?,
        student_id: row.get(1)?,
        name: row.get(2)?,
        department: row.get(3)?,
        section: row.get(4)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    pub department: Option<String>,
    pub section: Option<String>,
}

/// Class roster for the marking screens; both filters are mandatory so a
/// typo'd query never returns the whole school.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<RosterQuery>,
) -> Result<Response, Error> {
    let department = required(&query.department, "department")?;
    let section = required(&query.section, "section")?;
    let db = state.db();
    let mut stmt = db.prepare(
        "SELECT id, student_id, name, department, section FROM students
         WHERE department = ? AND section = ?
         ORDER BY name, student_id",
    )?;
    let students = stmt
        .query_map((department, section), |row| row_to_student(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(students).into_response())
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Response, Error> {
    let db = state.db();
    let student = db
        .query_row(
            "SELECT id, student_id, name, department, section FROM students WHERE student_id = ?",
            [&student_id],
            |row| row_to_student(row),
        )
        .optional()?
        .ok_or_else(|| Error::not_found("Student not found"))?;
    Ok(Json(student).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    Json(body): Json<UpdateStudentRequest>,
) -> Result<Response, Error> {
    let name = required(&body.name, "name")?;
    let department = required(&body.department, "department")?;
    let section = required(&body.section, "section")?;
    let db = state.db();
    let updated = db.execute(
        "UPDATE students SET name = ?, department = ?, section = ? WHERE student_id = ?",
        (name, department, section, &student_id),
    )?;
    if updated == 0 {
        return Err(Error::not_found("Student not found"));
    }
    let student = db.query_row(
        "SELECT id, student_id, name, department, section FROM students WHERE student_id = ?",
        [&student_id],
        |row| row_to_student(row),
    )?;
    Ok(Json(json!({ "message": "Student updated", "student": student })).into_response())
}
