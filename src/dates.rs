use crate::error::Error;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Reduce any accepted date form to a calendar day. Timestamps keep the day
/// of their own offset, so two submissions on the same local day are equal
/// regardless of the time they were posted.
pub fn normalize_date(raw: &str) -> Result<NaiveDate, Error> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.date());
    }
    Err(Error::validation(format!("Invalid date: {raw}")))
}

pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), Error> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::validation("Invalid month/year"))?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let end = next_month
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| Error::validation("Invalid month/year"))?;
    Ok((start, end))
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn current_month_range() -> (NaiveDate, NaiveDate) {
    let now = today();
    let start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or(now);
    (start, now)
}

/// Fixed-precision RFC 3339 so stored timestamps sort lexicographically.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_days_and_timestamps() {
        assert_eq!(
            normalize_date("2024-03-01").unwrap().to_string(),
            "2024-03-01"
        );
        assert_eq!(
            normalize_date("2024-03-01T23:59:59+05:30").unwrap().to_string(),
            "2024-03-01"
        );
        assert_eq!(
            normalize_date("2024-03-01T10:30:00").unwrap().to_string(),
            "2024-03-01"
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(normalize_date("yesterday").is_err());
        assert!(normalize_date("2024-13-01").is_err());
    }

    #[test]
    fn month_bounds_handle_leap_and_year_end() {
        let (start, end) = month_bounds(2024, 2).unwrap();
        assert_eq!(start.to_string(), "2024-02-01");
        assert_eq!(end.to_string(), "2024-02-29");

        let (start, end) = month_bounds(2023, 12).unwrap();
        assert_eq!(start.to_string(), "2023-12-01");
        assert_eq!(end.to_string(), "2023-12-31");
    }
}
