use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use super::clean;
use super::submissions::download;
use crate::auth::Claims;
use crate::dates;
use crate::error::Error;
use crate::export::{self, Cell};
use crate::http::middleware::require_admin;
use crate::http::AppState;
use crate::reconcile::RecordKind;
use crate::report::{self, ReportParams, ReportRows, ReportView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub view: Option<String>,
    pub metric: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub format: Option<String>,
}

fn resolve_range(query: &MonthlyQuery) -> Result<(NaiveDate, NaiveDate), Error> {
    if let (Some(start), Some(end)) = (clean(&query.start_date), clean(&query.end_date)) {
        return Ok((dates::normalize_date(start)?, dates::normalize_date(end)?));
    }
    match (query.month, query.year) {
        (Some(month), Some(year)) => dates::month_bounds(year, month),
        _ => Err(Error::validation(
            "Provide month and year, or startDate and endDate",
        )),
    }
}

fn parse_metric(metric: &Option<String>) -> Result<RecordKind, Error> {
    match clean(metric) {
        None | Some("attendance") => Ok(RecordKind::Attendance),
        Some("marks") => Ok(RecordKind::Marks),
        Some(_) => Err(Error::validation("metric must be 'attendance' or 'marks'")),
    }
}

pub async fn monthly(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MonthlyQuery>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let (start, end) = resolve_range(&query)?;
    let kind = parse_metric(&query.metric)?;
    let view = match clean(&query.view) {
        Some(v) => ReportView::parse(v)
            .ok_or_else(|| Error::validation("view must be 'student' or 'class'"))?,
        None => ReportView::Student,
    };
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);

    let params = ReportParams {
        kind,
        start,
        end,
        department: clean(&query.department).map(str::to_string),
        section: clean(&query.section).map(str::to_string),
        view,
    };
    let db = state.db();
    let rows = report::monthly_report(&db, &params)?;
    drop(db);

    match clean(&query.format) {
        None => Ok(match rows {
            ReportRows::Attendance(rows) => {
                Json(report::paginate(&rows, page, limit)).into_response()
            }
            ReportRows::Marks(rows) => Json(report::paginate(&rows, page, limit)).into_response(),
        }),
        Some("csv") => {
            let (header, data) = report_cells(&rows, view);
            let filename = format!("monthly-{}-report-{start}-to-{end}.csv", view.as_str());
            Ok(download(
                export::rows_to_csv(&header, &data).into_bytes(),
                "text/csv",
                &filename,
            ))
        }
        Some("xlsx") => {
            let (header, data) = report_cells(&rows, view);
            let filename = format!("monthly-{}-report-{start}-to-{end}.xlsx", view.as_str());
            let mut all = Vec::with_capacity(data.len() + 1);
            all.push(header.iter().map(|h| Cell::text(*h)).collect());
            all.extend(data);
            Ok(download(
                export::write_workbook("Report", &all)?,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                &filename,
            ))
        }
        Some(_) => Err(Error::validation("format must be 'csv' or 'xlsx'")),
    }
}

/// Export rows share the JSON response's sort order; percents and averages
/// render with two decimals so spreadsheets don't show float noise.
fn report_cells(rows: &ReportRows, view: ReportView) -> (Vec<&'static str>, Vec<Vec<Cell>>) {
    let student_view = matches!(view, ReportView::Student);
    let mut header: Vec<&'static str> = Vec::new();
    if student_view {
        header.extend(["StudentID", "Name"]);
    }
    match rows {
        ReportRows::Attendance(rows) => {
            header.extend([
                "Department",
                "Section",
                "Sessions",
                "Presents",
                "Absents",
                "Percent",
            ]);
            let data = rows
                .iter()
                .map(|r| {
                    let mut cells = Vec::with_capacity(header.len());
                    if student_view {
                        cells.push(Cell::text(r.student_id.clone().unwrap_or_default()));
                        cells.push(Cell::text(r.name.clone().unwrap_or_default()));
                    }
                    cells.push(Cell::text(r.department.clone()));
                    cells.push(Cell::text(r.section.clone()));
                    cells.push(Cell::Number(r.total as f64));
                    cells.push(Cell::Number(r.presents as f64));
                    cells.push(Cell::Number(r.absents as f64));
                    cells.push(Cell::text(format!("{:.2}", r.percent)));
                    cells
                })
                .collect();
            (header, data)
        }
        ReportRows::Marks(rows) => {
            header.extend(["Department", "Section", "Count", "Average"]);
            let data = rows
                .iter()
                .map(|r| {
                    let mut cells = Vec::with_capacity(header.len());
                    if student_view {
                        cells.push(Cell::text(r.student_id.clone().unwrap_or_default()));
                        cells.push(Cell::text(r.name.clone().unwrap_or_default()));
                    }
                    cells.push(Cell::text(r.department.clone()));
                    cells.push(Cell::text(r.section.clone()));
                    cells.push(Cell::Number(r.total as f64));
                    cells.push(Cell::text(format!("{:.2}", r.average)));
                    cells
                })
                .collect();
            (header, data)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub limit: Option<i64>,
}

/// Defaults to the current month when no range is given.
pub async fn attendance_chart(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let (start, end) = match (clean(&query.start_date), clean(&query.end_date)) {
        (Some(s), Some(e)) => (dates::normalize_date(s)?, dates::normalize_date(e)?),
        _ => dates::current_month_range(),
    };
    let limit = query.limit.unwrap_or(10);
    let db = state.db();
    let rows = report::attendance_chart(
        &db,
        start,
        end,
        clean(&query.department),
        clean(&query.section),
        limit,
    )?;
    Ok(Json(rows).into_response())
}

/// All-time unless both dates are given.
pub async fn marks_chart(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ChartQuery>,
) -> Result<Response, Error> {
    require_admin(&claims)?;
    let range = match (clean(&query.start_date), clean(&query.end_date)) {
        (Some(s), Some(e)) => Some((dates::normalize_date(s)?, dates::normalize_date(e)?)),
        _ => None,
    };
    let limit = query.limit.unwrap_or(10);
    let db = state.db();
    let rows = report::marks_chart(
        &db,
        range,
        clean(&query.department),
        clean(&query.section),
        limit,
    )?;
    Ok(Json(rows).into_response())
}
