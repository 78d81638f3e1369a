use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::dates;
use crate::error::Error;
use crate::reconcile::RecordKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    Student,
    Class,
}

impl ReportView {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Self::Student),
            "class" => Some(Self::Class),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Class => "class",
        }
    }
}

/// Guarded ratio: groups with no sessions report 0, never NaN.
pub fn percent(presents: i64, total: i64) -> f64 {
    if total <= 0 {
        0.0
    } else {
        presents as f64 / total as f64 * 100.0
    }
}

pub fn average(sum: f64, count: i64) -> f64 {
    if count <= 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceReportRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub department: String,
    pub section: String,
    pub presents: i64,
    pub absents: i64,
    pub total: i64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksReportRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub department: String,
    pub section: String,
    pub total: i64,
    pub average: f64,
}

#[derive(Debug)]
pub enum ReportRows {
    Attendance(Vec<AttendanceReportRow>),
    Marks(Vec<MarksReportRow>),
}

impl ReportRows {
    pub fn len(&self) -> usize {
        match self {
            Self::Attendance(rows) => rows.len(),
            Self::Marks(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ReportParams {
    pub kind: RecordKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub department: Option<String>,
    pub section: Option<String>,
    pub view: ReportView,
}

/// Full sorted row set for the range; pagination and export rendering happen
/// on top of this. Records whose student no longer exists drop out here —
/// orphans only surface in the raw submission export.
pub fn monthly_report(conn: &Connection, params: &ReportParams) -> Result<ReportRows, Error> {
    match params.kind {
        RecordKind::Attendance => Ok(ReportRows::Attendance(attendance_report(conn, params)?)),
        RecordKind::Marks => Ok(ReportRows::Marks(marks_report(conn, params)?)),
    }
}

fn attendance_report(
    conn: &Connection,
    params: &ReportParams,
) -> Result<Vec<AttendanceReportRow>, Error> {
    let (group_cols, order) = match params.view {
        ReportView::Student => (
            "st.student_id, st.name, st.department, st.section",
            "st.name, st.student_id",
        ),
        ReportView::Class => ("st.department, st.section", "st.department, st.section"),
    };
    let select_student = matches!(params.view, ReportView::Student);
    let start = params.start.to_string();
    let end = params.end.to_string();

    let mut sql = format!(
        "SELECT {group_cols},
                COUNT(*) AS total,
                SUM(CASE WHEN r.status = 'present' THEN 1 ELSE 0 END) AS presents
         FROM submissions s
         JOIN records r ON r.submission_id = s.id
         JOIN students st ON st.student_id = r.student_id
         WHERE s.kind = 'attendance' AND s.date >= ? AND s.date <= ?"
    );
    let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&start, &end];
    if let Some(ref dep) = params.department {
        sql.push_str(" AND st.department = ?");
        bind.push(dep);
    }
    if let Some(ref sec) = params.section {
        sql.push_str(" AND st.section = ?");
        bind.push(sec);
    }
    sql.push_str(&format!(" GROUP BY {group_cols} ORDER BY {order}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(bind.as_slice(), |row| {
            if select_student {
                let total: i64 = row.get(4)?;
                let presents: i64 = row.get::<_, Option<i64>>(5)?.unwrap_or(0);
                Ok(AttendanceReportRow {
                    student_id: Some(row.get(0)?),
                    name: Some(row.get(1)?),
                    department: row.get(2)?,
                    section: row.get(3)?,
                    presents,
                    absents: total - presents,
                    total,
                    percent: percent(presents, total),
                })
            } else {
                let total: i64 = row.get(2)?;
                let presents: i64 = row.get::<_, Option<i64>>(3)?.unwrap_or(0);
                Ok(AttendanceReportRow {
                    student_id: None,
                    name: None,
                    department: row.get(0)?,
                    section: row.get(1)?,
                    presents,
                    absents: total - presents,
                    total,
                    percent: percent(presents, total),
                })
            }
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn marks_report(conn: &Connection, params: &ReportParams) -> Result<Vec<MarksReportRow>, Error> {
    let (group_cols, order) = match params.view {
        ReportView::Student => (
            "st.student_id, st.name, st.department, st.section",
            "st.name, st.student_id",
        ),
        ReportView::Class => ("st.department, st.section", "st.department, st.section"),
    };
    let select_student = matches!(params.view, ReportView::Student);
    let start = params.start.to_string();
    let end = params.end.to_string();

    let mut sql = format!(
        "SELECT {group_cols},
                COUNT(*) AS total,
                SUM(COALESCE(r.mark, 0)) AS mark_sum
         FROM submissions s
         JOIN records r ON r.submission_id = s.id
         JOIN students st ON st.student_id = r.student_id
         WHERE s.kind = 'marks' AND s.date >= ? AND s.date <= ?"
    );
    let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&start, &end];
    if let Some(ref dep) = params.department {
        sql.push_str(" AND st.department = ?");
        bind.push(dep);
    }
    if let Some(ref sec) = params.section {
        sql.push_str(" AND st.section = ?");
        bind.push(sec);
    }
    sql.push_str(&format!(" GROUP BY {group_cols} ORDER BY {order}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(bind.as_slice(), |row| {
            if select_student {
                let total: i64 = row.get(4)?;
                let sum: f64 = row.get::<_, Option<f64>>(5)?.unwrap_or(0.0);
                Ok(MarksReportRow {
                    student_id: Some(row.get(0)?),
                    name: Some(row.get(1)?),
                    department: row.get(2)?,
                    section: row.get(3)?,
                    total,
                    average: average(sum, total),
                })
            } else {
                let total: i64 = row.get(2)?;
                let sum: f64 = row.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
                Ok(MarksReportRow {
                    student_id: None,
                    name: None,
                    department: row.get(0)?,
                    section: row.get(1)?,
                    total,
                    average: average(sum, total),
                })
            }
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: i64,
    pub pages: usize,
}

/// 1-indexed; size clamped to [1, 1000]. Pages past the end yield empty data
/// with the real total so clients can render correct pagination controls.
pub fn paginate<T: Clone>(rows: &[T], page: i64, page_size: i64) -> Paged<T> {
    let size = page_size.clamp(1, 1000) as usize;
    let page = page.max(1);
    let total = rows.len();
    let pages = (total + size - 1) / size;
    let start = (page as usize - 1).saturating_mul(size);
    let data = if start >= total {
        Vec::new()
    } else {
        rows[start..(start + size).min(total)].to_vec()
    };
    Paged {
        data,
        total,
        page,
        pages,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceChartRow {
    pub student_id: String,
    pub name: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksChartRow {
    pub student_id: String,
    pub name: String,
    pub avg_mark: f64,
}

/// Leaderboard rows, best percent first. Department/section filter on the
/// student's roster entry.
pub fn attendance_chart(
    conn: &Connection,
    start: NaiveDate,
    end: NaiveDate,
    department: Option<&str>,
    section: Option<&str>,
    limit: i64,
) -> Result<Vec<AttendanceChartRow>, Error> {
    let start = start.to_string();
    let end = end.to_string();
    let limit = limit.max(1);

    let mut sql = String::from(
        "SELECT st.student_id, st.name,
                COUNT(*) AS total,
                SUM(CASE WHEN r.status = 'present' THEN 1 ELSE 0 END) AS presents,
                100.0 * SUM(CASE WHEN r.status = 'present' THEN 1 ELSE 0 END) / COUNT(*) AS pct
         FROM submissions s
         JOIN records r ON r.submission_id = s.id
         JOIN students st ON st.student_id = r.student_id
         WHERE s.kind = 'attendance' AND s.date >= ? AND s.date <= ?",
    );
    let mut bind: Vec<&dyn rusqlite::ToSql> = vec![&start, &end];
    if let Some(ref dep) = department {
        sql.push_str(" AND st.department = ?");
        bind.push(dep);
    }
    if let Some(ref sec) = section {
        sql.push_str(" AND st.section = ?");
        bind.push(sec);
    }
    sql.push_str(" GROUP BY st.student_id, st.name ORDER BY pct DESC, st.name ASC LIMIT ?");
    bind.push(&limit);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(bind.as_slice(), |row| {
            let total: i64 = row.get(2)?;
            let presents: i64 = row.get::<_, Option<i64>>(3)?.unwrap_or(0);
            Ok(AttendanceChartRow {
                student_id: row.get(0)?,
                name: row.get(1)?,
                percent: percent(presents, total),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks leaderboard. Here the filter applies to the submission's own
/// department/section, matching how marks are entered per class.
pub fn marks_chart(
    conn: &Connection,
    range: Option<(NaiveDate, NaiveDate)>,
    department: Option<&str>,
    section: Option<&str>,
    limit: i64,
) -> Result<Vec<MarksChartRow>, Error> {
    let limit = limit.max(1);
    let range_strs = range.map(|(s, e)| (s.to_string(), e.to_string()));

    let mut sql = String::from(
        "SELECT st.student_id, st.name,
                COUNT(*) AS total,
                SUM(COALESCE(r.mark, 0)) AS mark_sum,
                SUM(COALESCE(r.mark, 0)) / COUNT(*) AS avg_mark
         FROM submissions s
         JOIN records r ON r.submission_id = s.id
         JOIN students st ON st.student_id = r.student_id
         WHERE s.kind = 'marks'",
    );
    let mut bind: Vec<&dyn rusqlite::ToSql> = Vec::new();
    if let Some((ref start, ref end)) = range_strs {
        sql.push_str(" AND s.date >= ? AND s.date <= ?");
        bind.push(start);
        bind.push(end);
    }
    if let Some(ref dep) = department {
        sql.push_str(" AND s.department = ?");
        bind.push(dep);
    }
    if let Some(ref sec) = section {
        sql.push_str(" AND s.section = ?");
        bind.push(sec);
    }
    sql.push_str(" GROUP BY st.student_id, st.name ORDER BY avg_mark DESC, st.name ASC LIMIT ?");
    bind.push(&limit);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(bind.as_slice(), |row| {
            let total: i64 = row.get(2)?;
            let sum: f64 = row.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
            Ok(MarksChartRow {
                student_id: row.get(0)?,
                name: row.get(1)?,
                avg_mark: average(sum, total),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub staff_count: i64,
    pub student_count: i64,
    pub sessions_today: i64,
    pub presents_today: i64,
}

/// Dashboard counters. Today's numbers sum across every submission dated
/// today, not just the first one found.
pub fn admin_stats(conn: &Connection) -> Result<Stats, Error> {
    let staff_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM users WHERE role = 'staff'", [], |r| {
            r.get(0)
        })?;
    let student_count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    let today = dates::today().to_string();
    // LEFT JOIN so reopened shells still count as sessions.
    let (sessions_today, presents_today) = conn.query_row(
        "SELECT COUNT(DISTINCT s.id), SUM(CASE WHEN r.status = 'present' THEN 1 ELSE 0 END)
         FROM submissions s
         LEFT JOIN records r ON r.submission_id = s.id
         WHERE s.kind = 'attendance' AND s.date = ?",
        [&today],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<i64>>(1)?.unwrap_or(0),
            ))
        },
    )?;
    Ok(Stats {
        staff_count,
        student_count,
        sessions_today,
        presents_today,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_guards_empty_groups() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(3, 0), 0.0);
        assert_eq!(percent(1, 2), 50.0);
        assert!(percent(0, 0).is_finite());
    }

    #[test]
    fn average_guards_empty_groups() {
        assert_eq!(average(0.0, 0), 0.0);
        assert_eq!(average(7.0, 2), 3.5);
    }

    #[test]
    fn pagination_clamps_and_survives_overrun() {
        let rows: Vec<i32> = (1..=3).collect();
        let paged = paginate(&rows, 999, 50);
        assert!(paged.data.is_empty());
        assert_eq!(paged.total, 3);
        assert_eq!(paged.pages, 1);

        let paged = paginate(&rows, 2, 2);
        assert_eq!(paged.data, vec![3]);
        assert_eq!(paged.pages, 2);

        let paged = paginate(&rows, 0, 0);
        assert_eq!(paged.data, vec![1]);
        assert_eq!(paged.page, 1);

        let paged = paginate::<i32>(&[], 1, 10);
        assert_eq!(paged.pages, 0);
        assert_eq!(paged.total, 0);
    }
}
