use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{clean, normalize_email, required};
use crate::auth::{self, Claims, Role};
use crate::dates;
use crate::error::Error;
use crate::http::middleware::require_admin;
use crate::http::AppState;

const STAFF_COLUMNS: &str = "id, name, email, staff_id, department, role, created_at";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffDto {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub role: Role,
    pub created_at: String,
}

fn row_to_staff(row: &rusqlite::Row<'_>) -> rusqlite::Result<StaffDto> {
    let role: String = row.get(5)?;
    Ok(StaffDto {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        staff_id: row.get(3)?,
        department: row.get(4)?,
        role: Role::parse(&role).unwrap_or(Role::Staff),
        created_at: row.get(6)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct StaffListQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Substring pattern with LIKE metacharacters neutralized, so a search for
/// "100%" matches the literal text instead of everything.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StaffListQuery>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let db = state.db();
    let (total, data) = match clean(&query.q) {
        Some(q) => {
            let like = like_pattern(q);
            let total: i64 = db.query_row(
                "SELECT COUNT(*) FROM users
                 WHERE name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'
                    OR COALESCE(staff_id, '') LIKE ?1 ESCAPE '\\'
                    OR COALESCE(department, '') LIKE ?1 ESCAPE '\\'",
                [&like],
                |row| row.get(0),
            )?;
            let mut stmt = db.prepare(&format!(
                "SELECT {STAFF_COLUMNS} FROM users
                 WHERE name LIKE ?1 ESCAPE '\\' OR email LIKE ?1 ESCAPE '\\'
                    OR COALESCE(staff_id, '') LIKE ?1 ESCAPE '\\'
                    OR COALESCE(department, '') LIKE ?1 ESCAPE '\\'
                 ORDER BY name, email LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map((&like, limit, offset), |row| row_to_staff(row))?
                .collect::<Result<Vec<_>, _>>()?;
            (total, rows)
        }
        None => {
            let total: i64 = db.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let mut stmt = db.prepare(&format!(
                "SELECT {STAFF_COLUMNS} FROM users ORDER BY name, email LIMIT ? OFFSET ?"
            ))?;
            let rows = stmt
                .query_map((limit, offset), |row| row_to_staff(row))?
                .collect::<Result<Vec<_>, _>>()?;
            (total, rows)
        }
    };
    let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
    Ok(Json(json!({ "data": data, "total": total, "page": page, "pages": pages })).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStaffRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub staff_id: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<CreateStaffRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let name = required(&body.name, "name")?;
    let email = normalize_email(required(&body.email, "email")?);
    let password = required(&body.password, "password")?;
    let staff_id = clean(&body.staff_id);
    let department = clean(&body.department);
    let role = match clean(&body.role) {
        Some(r) => Role::parse(r)
            .ok_or_else(|| Error::validation("role must be 'admin' or 'staff'"))?,
        None => Role::Staff,
    };

    let db = state.db();
    let taken: Option<String> = db
        .query_row("SELECT id FROM users WHERE email = ?", [&email], |row| {
            row.get(0)
        })
        .optional()?;
    if taken.is_some() {
        return Err(Error::conflict("Email already in use"));
    }
    if let Some(staff_id) = staff_id {
        let taken: Option<String> = db
            .query_row("SELECT id FROM users WHERE staff_id = ?", [staff_id], |row| {
                row.get(0)
            })
            .optional()?;
        if taken.is_some() {
            return Err(Error::conflict("Staff ID already in use"));
        }
    }

    let id = Uuid::new_v4().to_string();
    let now = dates::now_rfc3339();
    db.execute(
        "INSERT INTO users(id, name, email, staff_id, department, password_hash, role, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            name,
            &email,
            staff_id,
            department,
            auth::hash_password(password)?,
            role.as_str(),
            &now,
            &now,
        ),
    )?;
    info!("created staff account {email}");

    let staff = StaffDto {
        id,
        name: name.to_string(),
        email,
        staff_id: staff_id.map(str::to_string),
        department: department.map(str::to_string),
        role,
        created_at: now,
    };
    Ok(Json(json!({ "message": "Staff member created", "staff": staff })).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStaffRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub staff_id: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
}

/// Blank or absent fields keep their current value; a new password is
/// re-hashed, everything else lands in one UPDATE.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(body): Json<UpdateStaffRequest>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    let current = db
        .query_row(
            &format!("SELECT {STAFF_COLUMNS} FROM users WHERE id = ?"),
            [&id],
            |row| row_to_staff(row),
        )
        .optional()?
        .ok_or_else(|| Error::not_found("Staff member not found"))?;

    let name = clean(&body.name)
        .map(str::to_string)
        .unwrap_or(current.name);
    let email = match clean(&body.email) {
        Some(e) => {
            let e = normalize_email(e);
            if e != current.email {
                let taken: Option<String> = db
                    .query_row(
                        "SELECT id FROM users WHERE email = ? AND id != ?",
                        (&e, &id),
                        |row| row.get(0),
                    )
                    .optional()?;
                if taken.is_some() {
                    return Err(Error::conflict("Email already in use"));
                }
            }
            e
        }
        None => current.email,
    };
    let staff_id = match clean(&body.staff_id) {
        Some(s) => {
            if current.staff_id.as_deref() != Some(s) {
                let taken: Option<String> = db
                    .query_row(
                        "SELECT id FROM users WHERE staff_id = ? AND id != ?",
                        (s, &id),
                        |row| row.get(0),
                    )
                    .optional()?;
                if taken.is_some() {
                    return Err(Error::conflict("Staff ID already in use"));
                }
            }
            Some(s.to_string())
        }
        None => current.staff_id,
    };
    let department = clean(&body.department)
        .map(str::to_string)
        .or(current.department);
    let role = match clean(&body.role) {
        Some(r) => Role::parse(r)
            .ok_or_else(|| Error::validation("role must be 'admin' or 'staff'"))?,
        None => current.role,
    };
    let password_hash = match clean(&body.password) {
        Some(p) => Some(auth::hash_password(p)?),
        None => None,
    };

    let now = dates::now_rfc3339();
    if let Some(hash) = &password_hash {
        db.execute(
            "UPDATE users SET name = ?, email = ?, staff_id = ?, department = ?, role = ?,
                              password_hash = ?, updated_at = ?
             WHERE id = ?",
            (&name, &email, &staff_id, &department, role.as_str(), hash, &now, &id),
        )?;
    } else {
        db.execute(
            "UPDATE users SET name = ?, email = ?, staff_id = ?, department = ?, role = ?,
                              updated_at = ?
             WHERE id = ?",
            (&name, &email, &staff_id, &department, role.as_str(), &now, &id),
        )?;
    }

    let staff = db.query_row(
        &format!("SELECT {STAFF_COLUMNS} FROM users WHERE id = ?"),
        [&id],
        |row| row_to_staff(row),
    )?;
    Ok(Json(json!({ "message": "Staff member updated", "staff": staff })).into_response())
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let db = state.db();
    let deleted = db.execute("DELETE FROM users WHERE id = ?", [&id])?;
    if deleted == 0 {
        return Err(Error::not_found("Staff member not found"));
    }
    info!("deleted staff account {id}");
    Ok(Json(json!({ "message": "Staff member deleted" })).into_response())
}
