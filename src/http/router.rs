use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use rusqlite::Connection;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{admin, attendance, auth, marks, reports, staff, students};
use super::middleware::auth_middleware;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", get(auth::verify))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/setup/create-user", post(auth::create_first_user))
        .route("/attendance", post(attendance::submit).get(attendance::list))
        .route("/attendance/export", get(attendance::export))
        .route("/attendance/reset", post(attendance::reset))
        .route(
            "/attendance/:submission_id/records/:record_id",
            put(attendance::update_record).delete(attendance::delete_record),
        )
        .route("/marks", post(marks::submit).get(marks::list))
        .route("/marks/export", get(marks::export))
        .route("/marks/reset", post(marks::reset))
        .route(
            "/marks/:submission_id/records/:record_id",
            put(marks::update_record).delete(marks::delete_record),
        )
        .route("/students", get(students::list))
        .route(
            "/students/:student_id",
            get(students::get_one).put(students::update),
        )
        .route("/staff", get(staff::list).post(staff::create))
        .route("/staff/:id", put(staff::update).delete(staff::remove))
        .route(
            "/admin/departments",
            get(admin::list_departments).post(admin::create_department),
        )
        .route("/admin/departments/bulk", post(admin::bulk_departments))
        .route(
            "/admin/sections",
            get(admin::list_sections).post(admin::create_section),
        )
        .route("/admin/students", post(admin::create_student))
        .route("/admin/students/bulk", post(admin::bulk_students))
        .route(
            "/admin/students/:id",
            put(admin::update_student).delete(admin::delete_student),
        )
        .route("/admin/stats", get(admin::stats))
        .route("/admin/reports/monthly", get(reports::monthly))
        .route("/admin/charts/attendance", get(reports::attendance_chart))
        .route("/admin/charts/marks", get(reports::marks_chart));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(cors_layer())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}
