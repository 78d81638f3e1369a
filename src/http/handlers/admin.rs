use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{clean, required};
use crate::auth::Claims;
use crate::db;
use crate::error::Error;
use crate::http::middleware::require_admin;
use crate::http::AppState;
use crate::report;

#[derive(Debug, Deserialize)]
pub struct DepartmentRequest {
    pub name: Option<String>,
}

pub async fn create_department(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<DepartmentRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let name = required(&body.name, "name")?;
    let db = state.db();
    let taken: Option<String> = db
        .query_row("SELECT id FROM departments WHERE name = ?", [name], |row| {
            row.get(0)
        })
        .optional()?;
    if taken.is_some() {
        return Err(Error::validation("Department already exists"));
    }
    let id = Uuid::new_v4().to_string();
    db.execute(
        "INSERT INTO departments(id, name) VALUES(?, ?)",
        (&id, name),
    )?;
    info!("created department {name}");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Department created",
            "department": { "id": id, "name": name },
        })),
    )
        .into_response())
}

pub async fn list_departments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    let mut stmt = db.prepare("SELECT id, name FROM departments ORDER BY name")?;
    let departments = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(departments).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkDepartmentsRequest {
    #[serde(alias = "classes")]
    pub names: Option<Vec<String>>,
}

/// Each name stands on its own: bad rows are reported back per index, good
/// rows still land.
pub async fn bulk_departments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<BulkDepartmentsRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let names = body.names.unwrap_or_default();
    if names.is_empty() {
        return Err(Error::validation("names must be a non-empty array"));
    }
    let db = state.db();
    let mut inserted = 0usize;
    let mut failed = Vec::new();
    for (index, name) in names.iter().enumerate() {
        let name = name.trim();
        if name.is_empty() {
            failed.push(BulkFailure {
                index,
                student_id: None,
                name: None,
                error: "name is required".to_string(),
            });
            continue;
        }
        let result = db.execute(
            "INSERT INTO departments(id, name) VALUES(?, ?)",
            (Uuid::new_v4().to_string(), name),
        );
        match result {
            Ok(_) => inserted += 1,
            Err(e) if db::is_unique_violation(&e) => failed.push(BulkFailure {
                index,
                student_id: None,
                name: Some(name.to_string()),
                error: "Department already exists".to_string(),
            }),
            Err(e) => return Err(e.into()),
        }
    }
    info!("bulk departments: {inserted} inserted, {} rejected", failed.len());
    Ok(Json(json!({
        "message": "Bulk insert complete",
        "inserted": inserted,
        "failed": failed,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SectionRequest {
    pub name: Option<String>,
    pub department: Option<String>,
}

pub async fn create_section(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<SectionRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let name = required(&body.name, "name")?;
    let department = required(&body.department, "department")?;
    let db = state.db();
    let taken: Option<String> = db
        .query_row(
            "SELECT id FROM sections WHERE department = ? AND name = ?",
            (department, name),
            |row| row.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(Error::validation(
            "Section already exists for this department",
        ));
    }
    let id = Uuid::new_v4().to_string();
    db.execute(
        "INSERT INTO sections(id, name, department) VALUES(?, ?, ?)",
        (&id, name, department),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Section created",
            "section": { "id": id, "name": name, "department": department },
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct SectionsQuery {
    pub department: Option<String>,
}

pub async fn list_sections(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SectionsQuery>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": row.get::<_, String>(0)?,
            "name": row.get::<_, String>(1)?,
            "department": row.get::<_, String>(2)?,
        }))
    };
    let sections = match clean(&query.department) {
        Some(department) => {
            let mut stmt = db.prepare(
                "SELECT id, name, department FROM sections
                 WHERE department = ? ORDER BY department, name",
            )?;
            let rows = stmt
                .query_map([department], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = db.prepare(
                "SELECT id, name, department FROM sections ORDER BY department, name",
            )?;
            let rows = stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(Json(sections).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequest {
    pub student_id: Option<String>,
    pub name: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
}

pub async fn create_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<StudentRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let student_id = required(&body.student_id, "studentId")?;
    let name = required(&body.name, "name")?;
    let department = required(&body.department, "department")?;
    let section = required(&body.section, "section")?;
    let db = state.db();
    let taken: Option<String> = db
        .query_row(
            "SELECT id FROM students WHERE student_id = ?",
            [student_id],
            |row| row.get(0),
        )
        .optional()?;
    if taken.is_some() {
        return Err(Error::validation("Student with this ID already exists"));
    }
    let id = Uuid::new_v4().to_string();
    db.execute(
        "INSERT INTO students(id, student_id, name, department, section) VALUES(?, ?, ?, ?, ?)",
        (&id, student_id, name, department, section),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Student created",
            "student": {
                "id": id,
                "studentId": student_id,
                "name": name,
                "department": department,
                "section": section,
            },
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct BulkStudentsRequest {
    pub students: Option<Vec<StudentRequest>>,
}

pub async fn bulk_students(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<BulkStudentsRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let students = body.students.unwrap_or_default();
    if students.is_empty() {
        return Err(Error::validation("students must be a non-empty array"));
    }
    let db = state.db();
    let mut inserted = 0usize;
    let mut failed = Vec::new();
    for (index, student) in students.iter().enumerate() {
        let student_id = clean(&student.student_id);
        let name = clean(&student.name);
        let department = clean(&student.department);
        let section = clean(&student.section);
        let (student_id, name, department, section) =
            match (student_id, name, department, section) {
                (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
                _ => {
                    failed.push(BulkFailure {
                        index,
                        student_id: student_id.map(str::to_string),
                        name: name.map(str::to_string),
                        error: "missing required fields".to_string(),
                    });
                    continue;
                }
            };
        let result = db.execute(
            "INSERT INTO students(id, student_id, name, department, section)
             VALUES(?, ?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), student_id, name, department, section),
        );
        match result {
            Ok(_) => inserted += 1,
            Err(e) if db::is_unique_violation(&e) => failed.push(BulkFailure {
                index,
                student_id: Some(student_id.to_string()),
                name: Some(name.to_string()),
                error: "Student ID already exists".to_string(),
            }),
            Err(e) => return Err(e.into()),
        }
    }
    info!("bulk students: {inserted} inserted, {} rejected", failed.len());
    Ok(Json(json!({
        "message": "Bulk insert complete",
        "inserted": inserted,
        "failed": failed,
    }))
    .into_response())
}

pub async fn update_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(body): Json<StudentRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let student_id = required(&body.student_id, "studentId")?;
    let name = required(&body.name, "name")?;
    let department = required(&body.department, "department")?;
    let section = required(&body.section, "section")?;
    let db = state.db();
    let updated = db.execute(
        "UPDATE students SET student_id = ?, name = ?, department = ?, section = ? WHERE id = ?",
        (student_id, name, department, section, &id),
    );
    match updated {
        Ok(0) => Err(Error::not_found("Student not found")),
        Ok(_) => Ok(Json(json!({
            "message": "Student updated",
            "student": {
                "id": id,
                "studentId": student_id,
                "name": name,
                "department": department,
                "section": section,
            },
        }))
        .into_response()),
        Err(e) if db::is_unique_violation(&e) => {
            Err(Error::validation("Student with this ID already exists"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    let deleted = db.execute("DELETE FROM students WHERE id = ?", [&id])?;
    if deleted == 0 {
        return Err(Error::not_found("Student not found"));
    }
    Ok(Json(json!({ "message": "Student deleted" })).into_response())
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    Ok(Json(report::admin_stats(&db)?).into_response())
}
